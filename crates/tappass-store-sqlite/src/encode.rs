//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings with nanosecond
//! precision, so lexical order is chronological order. UUIDs are stored as
//! hyphenated lowercase strings.

use chrono::{DateTime, SecondsFormat, Utc};
use tappass_core::{
  attempt::AccessAttempt,
  credential::{Credential, DigitalId},
  decision::ReasonCode,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Nanos, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── ReasonCode ───────────────────────────────────────────────────────────────

pub fn decode_reason(s: &str) -> Result<ReasonCode> {
  s.parse().map_err(|_| Error::Corrupt { column: "reason_code", value: s.to_owned() })
}

// ─── Raw rows ─────────────────────────────────────────────────────────────────

/// A credential row as read from SQLite, before decoding.
pub struct RawCredential {
  pub digital_id:   String,
  pub user_id:      String,
  pub full_name:    String,
  pub role:         String,
  pub access_level: String,
  pub department:   Option<String>,
  pub phone:        Option<String>,
  pub is_active:    bool,
  pub created_at:   String,
}

impl RawCredential {
  pub const COLUMNS: &'static str = "digital_id, user_id, full_name, role, access_level, \
                                     department, phone, is_active, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      digital_id:   row.get(0)?,
      user_id:      row.get(1)?,
      full_name:    row.get(2)?,
      role:         row.get(3)?,
      access_level: row.get(4)?,
      department:   row.get(5)?,
      phone:        row.get(6)?,
      is_active:    row.get(7)?,
      created_at:   row.get(8)?,
    })
  }

  /// Role and access level never fail to decode; unknown text becomes the
  /// `Unrecognized` arm.
  pub fn into_credential(self) -> Result<Credential> {
    Ok(Credential {
      user_id:      decode_uuid(&self.user_id)?,
      digital_id:   DigitalId::parse(&self.digital_id)?,
      full_name:    self.full_name,
      role:         self.role.into(),
      access_level: self.access_level.into(),
      department:   self.department,
      phone:        self.phone,
      is_active:    self.is_active,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

/// An access attempt row as read from SQLite, before decoding.
pub struct RawAttempt {
  pub attempt_id:         String,
  pub digital_id:         String,
  pub reader_id:          String,
  pub reader_operator_id: String,
  pub granted:            bool,
  pub reason_code:        String,
  pub location:           String,
  pub timestamp:          String,
  pub computed_granted:   Option<bool>,
  pub computed_reason:    Option<String>,
  pub operator_note:      Option<String>,
}

impl RawAttempt {
  pub const COLUMNS: &'static str = "attempt_id, digital_id, reader_id, reader_operator_id, \
                                     granted, reason_code, location, timestamp, \
                                     computed_granted, computed_reason, operator_note";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      attempt_id:         row.get(0)?,
      digital_id:         row.get(1)?,
      reader_id:          row.get(2)?,
      reader_operator_id: row.get(3)?,
      granted:            row.get(4)?,
      reason_code:        row.get(5)?,
      location:           row.get(6)?,
      timestamp:          row.get(7)?,
      computed_granted:   row.get(8)?,
      computed_reason:    row.get(9)?,
      operator_note:      row.get(10)?,
    })
  }

  pub fn into_attempt(self) -> Result<AccessAttempt> {
    Ok(AccessAttempt {
      attempt_id:         decode_uuid(&self.attempt_id)?,
      digital_id:         DigitalId::parse(&self.digital_id)?,
      reader_id:          self.reader_id,
      reader_operator_id: decode_uuid(&self.reader_operator_id)?,
      granted:            self.granted,
      reason:             decode_reason(&self.reason_code)?,
      location:           self.location,
      timestamp:          decode_dt(&self.timestamp)?,
      computed_granted:   self.computed_granted,
      computed_reason:    self.computed_reason.as_deref().map(decode_reason).transpose()?,
      operator_note:      self.operator_note,
    })
  }
}
