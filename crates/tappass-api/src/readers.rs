//! Handlers for driving reader scan cycles.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/readers` | Configured readers and their current phase |
//! | `POST`   | `/readers/:reader/scans` | Body: `{"digital_id":"..."}`; returns the pending decision |
//! | `POST`   | `/readers/:reader/scans/:cycle_id` | Body: [`OperatorAction`]; records the decision |
//! | `DELETE` | `/readers/:reader/scans` | Abandon the current cycle |
//!
//! Only one cycle may be in flight per reader. A second scan is answered with
//! 409 until the first is finalized or cancelled.

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tappass_core::{
  session::{OperatorAction, PendingDecision, ScanPhase, ScanResult},
  store::{AuditSink, CredentialStore},
};
use uuid::Uuid;

use crate::{ApiState, error::ApiError};

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ReaderView {
  pub reader_id:   String,
  pub operator_id: Uuid,
  pub location:    String,
  pub phase:       ScanPhase,
  pub pending:     Option<PendingDecision>,
}

/// `GET /readers`
pub async fn list<S>(State(state): State<ApiState<S>>) -> Json<Vec<ReaderView>>
where
  S: CredentialStore + AuditSink + 'static,
{
  let mut views = Vec::with_capacity(state.readers.len());
  for controller in state.readers.values() {
    let reader = controller.reader();
    views.push(ReaderView {
      reader_id:   reader.reader_id.clone(),
      operator_id: reader.operator_id,
      location:    reader.location.clone(),
      phase:       controller.phase().await,
      pending:     controller.pending().await,
    });
  }
  Json(views)
}

// ─── Begin ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ScanBody {
  /// As read from the NFC tag or typed by the operator.
  pub digital_id: String,
}

/// `POST /readers/:reader/scans`
pub async fn begin<S>(
  State(state): State<ApiState<S>>,
  Path(reader_id): Path<String>,
  Json(body): Json<ScanBody>,
) -> Result<Json<PendingDecision>, ApiError>
where
  S: CredentialStore + AuditSink + 'static,
{
  let controller = state.reader(&reader_id)?;
  Ok(Json(controller.begin_scan(&body.digital_id).await?))
}

// ─── Finalize ─────────────────────────────────────────────────────────────────

/// `POST /readers/:reader/scans/:cycle_id` with a body such as
/// `{"action":"manual_deny","reason":"photo mismatch"}`.
pub async fn finalize<S>(
  State(state): State<ApiState<S>>,
  Path((reader_id, cycle_id)): Path<(String, Uuid)>,
  Json(action): Json<OperatorAction>,
) -> Result<Json<ScanResult>, ApiError>
where
  S: CredentialStore + AuditSink + 'static,
{
  let controller = state.reader(&reader_id)?;
  Ok(Json(controller.finalize(cycle_id, action).await?))
}

// ─── Cancel ───────────────────────────────────────────────────────────────────

/// `DELETE /readers/:reader/scans`
pub async fn cancel<S>(
  State(state): State<ApiState<S>>,
  Path(reader_id): Path<String>,
) -> Result<StatusCode, ApiError>
where
  S: CredentialStore + AuditSink + 'static,
{
  state.reader(&reader_id)?.cancel().await?;
  Ok(StatusCode::NO_CONTENT)
}
