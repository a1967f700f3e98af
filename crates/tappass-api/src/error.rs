//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every error body is `{"error": <operator message>, "kind": <tag>}`. A
//! recording failure also carries the attempt that was not persisted.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use tappass_core::attempt::AccessAttempt;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("rejected: {0}")]
  Rejected(String),

  #[error("timed out: {0}")]
  Timeout(String),

  #[error("{message}")]
  LogFailed {
    message: String,
    attempt: Box<AccessAttempt>,
  },

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Conflict(_) => StatusCode::CONFLICT,
      ApiError::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
      ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
      ApiError::LogFailed { .. } => StatusCode::SERVICE_UNAVAILABLE,
      ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  /// Stable machine-readable tag for the error body.
  pub fn kind(&self) -> &'static str {
    match self {
      ApiError::NotFound(_) => "not_found",
      ApiError::BadRequest(_) => "bad_request",
      ApiError::Conflict(_) => "conflict",
      ApiError::Rejected(_) => "rejected",
      ApiError::Timeout(_) => "timeout",
      ApiError::LogFailed { .. } => "log_failed",
      ApiError::Store(_) => "store",
    }
  }
}

impl From<tappass_core::Error> for ApiError {
  fn from(e: tappass_core::Error) -> Self {
    use tappass_core::Error as E;

    let message = e.operator_message();
    match e {
      E::NotFound(_) => ApiError::NotFound(message),
      E::EmptyDigitalId | E::InvalidCredential(_) | E::InvalidOffset(_) => {
        ApiError::BadRequest(message)
      }
      E::Busy(_) | E::NoPendingDecision | E::Cancelled => ApiError::Conflict(message),
      E::OverrideRejected(_) => ApiError::Rejected(message),
      E::LookupTimeout(_) => ApiError::Timeout(message),
      E::LogFailed { attempt, .. } => ApiError::LogFailed { message, attempt },
      other => ApiError::Store(Box::new(other)),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    let kind = self.kind();
    let body = match &self {
      ApiError::NotFound(m)
      | ApiError::BadRequest(m)
      | ApiError::Conflict(m)
      | ApiError::Rejected(m)
      | ApiError::Timeout(m) => json!({ "error": m, "kind": kind }),
      ApiError::LogFailed { message, attempt } => {
        json!({ "error": message, "kind": kind, "attempt": attempt })
      }
      ApiError::Store(e) => json!({ "error": e.to_string(), "kind": kind }),
    };
    (status, Json(body)).into_response()
  }
}
