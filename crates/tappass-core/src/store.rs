//! The `CredentialStore` and `AuditSink` traits.
//!
//! Both are implemented by storage backends (e.g. `tappass-store-sqlite`).
//! The scan controller and the HTTP layer depend on these abstractions, not
//! on any concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  attempt::{AccessAttempt, AttemptQuery},
  credential::{Credential, DigitalId, NewCredential},
};

/// Abstraction over the credential registry.
///
/// Lookups are read-mostly and must tolerate concurrent callers. All methods
/// return `Send` futures so the trait can be used in multi-threaded async
/// runtimes (e.g. tokio with `axum`).
pub trait CredentialStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Lookups ───────────────────────────────────────────────────────────

  /// Resolve a scanned identifier. Returns `None` if no credential matches.
  fn find_by_digital_id<'a>(
    &'a self,
    digital_id: &'a DigitalId,
  ) -> impl Future<Output = Result<Option<Credential>, Self::Error>> + Send + 'a;

  /// Resolve the badge owned by a user account.
  fn find_by_user_id(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Option<Credential>, Self::Error>> + Send + '_;

  /// List all credentials, optionally only the active ones.
  fn list_credentials(
    &self,
    active_only: bool,
  ) -> impl Future<Output = Result<Vec<Credential>, Self::Error>> + Send + '_;

  // ── Registry writes ───────────────────────────────────────────────────

  /// Persist a new credential. `created_at` is set by the store.
  ///
  /// Returns an error if the digital ID is already taken.
  fn register(
    &self,
    input: NewCredential,
  ) -> impl Future<Output = Result<Credential, Self::Error>> + Send + '_;

  /// Activate or deactivate a credential. Returns `None` if not found.
  fn set_active<'a>(
    &'a self,
    digital_id: &'a DigitalId,
    active: bool,
  ) -> impl Future<Output = Result<Option<Credential>, Self::Error>> + Send + 'a;
}

/// Abstraction over the append-only access log.
///
/// Each `record` call is atomic with respect to every other: two concurrent
/// appends never interleave into one corrupt record.
pub trait AuditSink: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Append one attempt.
  ///
  /// Recording an `attempt_id` that is already present succeeds without
  /// writing a second record.
  fn record<'a>(
    &'a self,
    attempt: &'a AccessAttempt,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Return recorded attempts matching `query`, newest first.
  fn list_attempts<'a>(
    &'a self,
    query: &'a AttemptQuery,
  ) -> impl Future<Output = Result<Vec<AccessAttempt>, Self::Error>> + Send + 'a;
}
