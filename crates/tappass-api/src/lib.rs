//! JSON REST API for TapPass.
//!
//! Exposes an axum [`Router`] backed by any store that implements both
//! [`CredentialStore`] and [`AuditSink`], plus the set of reader controllers
//! the caller has configured. Auth, TLS, and transport concerns are the
//! caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", tappass_api::api_router(state.clone()))
//! ```

pub mod attempts;
pub mod credentials;
pub mod error;
pub mod readers;


use std::{collections::BTreeMap, sync::Arc};

use axum::{
  Router,
  routing::{get, post},
};
use tappass_core::{
  session::AccessSessionController,
  store::{AuditSink, CredentialStore},
};

pub use error::ApiError;

/// A reader controller whose lookups and audit appends share one store.
pub type Reader<S> = AccessSessionController<S, S>;

/// Shared state threaded through all handlers.
pub struct ApiState<S> {
  pub store:   Arc<S>,
  /// Controllers keyed by reader id.
  pub readers: Arc<BTreeMap<String, Arc<Reader<S>>>>,
}

impl<S> ApiState<S> {
  pub fn new(store: Arc<S>, readers: impl IntoIterator<Item = Reader<S>>) -> Self
  where
    S: CredentialStore + AuditSink,
  {
    let readers = readers
      .into_iter()
      .map(|r| (r.reader().reader_id.clone(), Arc::new(r)))
      .collect();
    Self { store, readers: Arc::new(readers) }
  }

  pub fn reader(&self, reader_id: &str) -> Result<&Arc<Reader<S>>, ApiError> {
    self
      .readers
      .get(reader_id)
      .ok_or_else(|| ApiError::NotFound(format!("reader {reader_id} not found")))
  }
}

impl<S> Clone for ApiState<S> {
  fn clone(&self) -> Self {
    Self { store: Arc::clone(&self.store), readers: Arc::clone(&self.readers) }
  }
}

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: ApiState<S>) -> Router<()>
where
  S: CredentialStore + AuditSink + 'static,
{
  Router::new()
    // Credentials
    .route(
      "/credentials",
      get(credentials::list::<S>).post(credentials::create::<S>),
    )
    .route("/credentials/{digital_id}", get(credentials::get_one::<S>))
    .route("/credentials/{digital_id}/activate", post(credentials::activate::<S>))
    .route("/credentials/{digital_id}/deactivate", post(credentials::deactivate::<S>))
    .route("/users/{user_id}/credential", get(credentials::by_user::<S>))
    .route("/verify/{digital_id}", get(credentials::verify::<S>))
    // Readers
    .route("/readers", get(readers::list::<S>))
    .route(
      "/readers/{reader}/scans",
      post(readers::begin::<S>).delete(readers::cancel::<S>),
    )
    .route("/readers/{reader}/scans/{cycle_id}", post(readers::finalize::<S>))
    // Access log
    .route("/access-attempts", get(attempts::list::<S>))
    .with_state(state)
}
