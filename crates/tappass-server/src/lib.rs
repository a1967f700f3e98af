//! HTTP server wiring for TapPass.
//!
//! Turns a [`ServerConfig`] into one scan controller per configured reader
//! and serves the JSON API under `/api` behind HTTP Basic auth.

pub mod auth;
pub mod error;

pub use error::Error;

use std::{collections::HashSet, path::PathBuf, sync::Arc, time::Duration};

use axum::{Router, middleware, routing::get};
use serde::Deserialize;
use tappass_api::{ApiState, Reader};
use tappass_core::{
  attempt::ReaderContext,
  audit::{AuditLogger, AuditSettings},
  clock::FacilityClock,
  policy::AccessPolicy,
  session::AccessSessionController,
  store::{AuditSink, CredentialStore},
};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use auth::{AuthConfig, require_auth};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `TAPPASS_*` environment variables.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:                        String,
  pub port:                        u16,
  pub store_path:                  PathBuf,
  pub auth_username:               String,
  pub auth_password_hash:          String,
  /// Facility wall-clock offset from UTC, in minutes east.
  #[serde(default)]
  pub facility_utc_offset_minutes: i32,
  #[serde(default = "default_timeout_ms")]
  pub lookup_timeout_ms:           u64,
  #[serde(default = "default_timeout_ms")]
  pub audit_timeout_ms:            u64,
  /// Clamped to one retry.
  #[serde(default = "default_audit_retries")]
  pub audit_retries:               u8,
  #[serde(default)]
  pub readers:                     Vec<ReaderConfig>,
}

fn default_timeout_ms() -> u64 { 5_000 }

fn default_audit_retries() -> u8 { 1 }

/// One physical reader station.
#[derive(Deserialize, Clone)]
pub struct ReaderConfig {
  pub id:          String,
  /// The operator account attributed with every decision at this station.
  pub operator_id: Uuid,
  #[serde(default)]
  pub location:    String,
}

impl ServerConfig {
  pub fn auth(&self) -> AuthConfig {
    AuthConfig {
      username:      self.auth_username.clone(),
      password_hash: self.auth_password_hash.clone(),
    }
  }

  pub fn policy(&self) -> Result<AccessPolicy, Error> {
    let facility = FacilityClock::from_offset_minutes(self.facility_utc_offset_minutes)?;
    Ok(AccessPolicy::new(facility))
  }

  pub fn audit_settings(&self) -> AuditSettings {
    AuditSettings {
      timeout: Duration::from_millis(self.audit_timeout_ms),
      retries: self.audit_retries,
    }
  }

  /// Build one controller per `[[readers]]` entry, all sharing `store`.
  pub fn build_readers<S>(&self, store: &Arc<S>) -> Result<Vec<Reader<S>>, Error>
  where
    S: CredentialStore + AuditSink,
  {
    let policy = self.policy()?;
    let audit = AuditLogger::new(Arc::clone(store), self.audit_settings());
    let mut seen = HashSet::new();

    self
      .readers
      .iter()
      .map(|r| {
        let id = r.id.trim();
        if id.is_empty() {
          return Err(Error::Config("reader id must not be empty".into()));
        }
        if !seen.insert(id.to_owned()) {
          return Err(Error::Config(format!("reader {id} is configured twice")));
        }
        let context = ReaderContext::new(id, r.operator_id, &r.location);
        Ok(
          AccessSessionController::new(context, Arc::clone(store), audit.clone(), policy.clone())
            .with_lookup_timeout(Duration::from_millis(self.lookup_timeout_ms)),
        )
      })
      .collect()
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the full HTTP [`Router`]: the authenticated API under `/api` and an
/// unauthenticated `/health` probe.
pub fn router<S>(api: ApiState<S>, auth: Arc<AuthConfig>) -> Router
where
  S: CredentialStore + AuditSink + 'static,
{
  Router::new()
    .nest("/api", tappass_api::api_router(api))
    .layer(middleware::from_fn_with_state(auth, require_auth))
    .route("/health", get(|| async { "ok" }))
    .layer(TraceLayer::new_for_http())
}

// ─── Integration tests ────────────────────────────────────────────────────────
