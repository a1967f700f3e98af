//! [`SqliteStore`], the SQLite implementation of [`CredentialStore`] and
//! [`AuditSink`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use tappass_core::{
  attempt::{AccessAttempt, AttemptQuery},
  credential::{Credential, DigitalId, NewCredential},
  store::{AuditSink, CredentialStore},
};

use crate::{
  encode::{RawAttempt, RawCredential, encode_dt, encode_uuid},
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// Credentials and the access log backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. Calls are
/// serialised on the connection's worker thread, so each append is atomic
/// with respect to every other.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run raw SQL against the connection. Only used by tests that need to
  /// bypass the typed API.
  #[cfg(test)]
  pub(crate) async fn execute_raw(&self, sql: &'static str) -> Result<usize> {
    Ok(self.conn.call(move |conn| Ok(conn.execute(sql, [])?)).await?)
  }
}

/// Fetch a single credential row by one indexed column.
fn query_credential(
  conn: &rusqlite::Connection,
  column: &'static str,
  value: &str,
) -> rusqlite::Result<Option<RawCredential>> {
  conn
    .query_row(
      &format!("SELECT {} FROM credentials WHERE {column} = ?1", RawCredential::COLUMNS),
      rusqlite::params![value],
      RawCredential::from_row,
    )
    .optional()
}

// ─── CredentialStore impl ────────────────────────────────────────────────────

impl CredentialStore for SqliteStore {
  type Error = Error;

  async fn find_by_digital_id(&self, digital_id: &DigitalId) -> Result<Option<Credential>> {
    let id_str = digital_id.as_str().to_owned();

    let raw = self
      .conn
      .call(move |conn| Ok(query_credential(conn, "digital_id", &id_str)?))
      .await?;

    raw.map(RawCredential::into_credential).transpose()
  }

  async fn find_by_user_id(&self, user_id: Uuid) -> Result<Option<Credential>> {
    let id_str = encode_uuid(user_id);

    let raw = self
      .conn
      .call(move |conn| Ok(query_credential(conn, "user_id", &id_str)?))
      .await?;

    raw.map(RawCredential::into_credential).transpose()
  }

  async fn list_credentials(&self, active_only: bool) -> Result<Vec<Credential>> {
    let raws: Vec<RawCredential> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM credentials
           WHERE (?1 = 0 OR is_active = 1)
           ORDER BY full_name, digital_id",
          RawCredential::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![active_only], RawCredential::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCredential::into_credential).collect()
  }

  async fn register(&self, input: NewCredential) -> Result<Credential> {
    let input = input.validate()?;
    let credential = Credential {
      user_id:      input.user_id,
      digital_id:   input.digital_id.unwrap_or_else(DigitalId::generate),
      full_name:    input.full_name,
      role:         input.role,
      access_level: input.access_level,
      department:   input.department,
      phone:        input.phone,
      is_active:    true,
      created_at:   Utc::now(),
    };

    let id_str       = credential.digital_id.as_str().to_owned();
    let user_str     = encode_uuid(credential.user_id);
    let name         = credential.full_name.clone();
    let role         = credential.role.as_str().to_owned();
    let access_level = credential.access_level.as_str().to_owned();
    let department   = credential.department.clone();
    let phone        = credential.phone.clone();
    let at_str       = encode_dt(credential.created_at);

    let inserted = self
      .conn
      .call(move |conn| {
        let taken = conn
          .query_row(
            "SELECT 1 FROM credentials WHERE digital_id = ?1",
            rusqlite::params![id_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if taken {
          return Ok(false);
        }
        conn.execute(
          "INSERT INTO credentials (
             digital_id, user_id, full_name, role, access_level,
             department, phone, is_active, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8)",
          rusqlite::params![
            id_str,
            user_str,
            name,
            role,
            access_level,
            department,
            phone,
            at_str,
          ],
        )?;
        Ok(true)
      })
      .await?;

    if !inserted {
      return Err(Error::DuplicateDigitalId(credential.digital_id.to_string()));
    }
    tracing::info!(digital_id = %credential.digital_id, "credential registered");
    Ok(credential)
  }

  async fn set_active(&self, digital_id: &DigitalId, active: bool) -> Result<Option<Credential>> {
    let id_str = digital_id.as_str().to_owned();

    let raw = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE credentials SET is_active = ?2 WHERE digital_id = ?1",
          rusqlite::params![id_str, active],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        Ok(query_credential(conn, "digital_id", &id_str)?)
      })
      .await?;

    if raw.is_some() {
      tracing::info!(%digital_id, active, "credential status changed");
    }
    raw.map(RawCredential::into_credential).transpose()
  }
}

// ─── AuditSink impl ──────────────────────────────────────────────────────────

impl AuditSink for SqliteStore {
  type Error = Error;

  async fn record(&self, attempt: &AccessAttempt) -> Result<()> {
    let attempt_id_str   = encode_uuid(attempt.attempt_id);
    let digital_id       = attempt.digital_id.as_str().to_owned();
    let reader_id        = attempt.reader_id.clone();
    let operator_str     = encode_uuid(attempt.reader_operator_id);
    let granted          = attempt.granted;
    let reason           = attempt.reason.as_str().to_owned();
    let location         = attempt.location.clone();
    let timestamp_str    = encode_dt(attempt.timestamp);
    let computed_granted = attempt.computed_granted;
    let computed_reason  = attempt.computed_reason.map(|r| r.as_str().to_owned());
    let operator_note    = attempt.operator_note.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO access_attempts (
             attempt_id, digital_id, reader_id, reader_operator_id,
             granted, reason_code, location, timestamp,
             computed_granted, computed_reason, operator_note
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
           ON CONFLICT (attempt_id) DO NOTHING",
          rusqlite::params![
            attempt_id_str,
            digital_id,
            reader_id,
            operator_str,
            granted,
            reason,
            location,
            timestamp_str,
            computed_granted,
            computed_reason,
            operator_note,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn list_attempts(&self, query: &AttemptQuery) -> Result<Vec<AccessAttempt>> {
    let digital_id = query.digital_id.as_ref().map(|d| d.as_str().to_owned());
    let reader_id  = query.reader_id.clone();
    let granted    = query.granted;
    let after      = query.after.map(encode_dt);
    let before     = query.before.map(encode_dt);
    let limit_val  = i64::try_from(query.limit.unwrap_or(100)).unwrap_or(i64::MAX);
    let offset_val = i64::try_from(query.offset.unwrap_or(0)).unwrap_or(i64::MAX);

    let raws: Vec<RawAttempt> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM access_attempts
           WHERE (?1 IS NULL OR digital_id = ?1)
             AND (?2 IS NULL OR reader_id = ?2)
             AND (?3 IS NULL OR granted = ?3)
             AND (?4 IS NULL OR timestamp >= ?4)
             AND (?5 IS NULL OR timestamp < ?5)
           ORDER BY timestamp DESC, attempt_id
           LIMIT ?6 OFFSET ?7",
          RawAttempt::COLUMNS
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![
              digital_id,
              reader_id,
              granted,
              after,
              before,
              limit_val,
              offset_val,
            ],
            RawAttempt::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAttempt::into_attempt).collect()
  }
}
