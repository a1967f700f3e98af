//! Handler for `GET /access-attempts`.
//!
//! Query params map directly to [`AttemptQuery`] fields. Results are newest
//! first.

use axum::{
  Json,
  extract::{Query, State},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tappass_core::{
  attempt::{AccessAttempt, AttemptQuery},
  credential::DigitalId,
  store::{AuditSink, CredentialStore},
};

use crate::{ApiState, error::ApiError};

/// Page size when the caller gives none.
pub const DEFAULT_LIMIT: usize = 50;

#[derive(Debug, Deserialize, Default)]
pub struct AttemptParams {
  pub digital_id: Option<String>,
  pub reader_id:  Option<String>,
  pub granted:    Option<bool>,
  pub after:      Option<DateTime<Utc>>,
  pub before:     Option<DateTime<Utc>>,
  pub limit:      Option<usize>,
  pub offset:     Option<usize>,
}

/// `GET /access-attempts[?digital_id=...][&reader_id=...][&granted=...][&after=...][&before=...][&limit=...][&offset=...]`
pub async fn list<S>(
  State(state): State<ApiState<S>>,
  Query(params): Query<AttemptParams>,
) -> Result<Json<Vec<AccessAttempt>>, ApiError>
where
  S: CredentialStore + AuditSink + 'static,
{
  let query = AttemptQuery {
    digital_id: params.digital_id.as_deref().map(DigitalId::parse).transpose()?,
    reader_id:  params.reader_id,
    granted:    params.granted,
    after:      params.after,
    before:     params.before,
    limit:      Some(params.limit.unwrap_or(DEFAULT_LIMIT)),
    offset:     params.offset,
  };

  let attempts = state
    .store
    .list_attempts(&query)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(attempts))
}
