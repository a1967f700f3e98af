//! Handlers for the credential registry.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/credentials` | Optional `?active_only=true` |
//! | `POST` | `/credentials` | Body: [`NewCredential`]; returns 201 + stored credential |
//! | `GET`  | `/credentials/:digital_id` | 404 if not found |
//! | `POST` | `/credentials/:digital_id/activate` | Returns the updated credential |
//! | `POST` | `/credentials/:digital_id/deactivate` | Returns the updated credential |
//! | `GET`  | `/users/:user_id/credential` | The badge owned by a user account |
//! | `GET`  | `/verify/:digital_id` | Public [`BadgeCard`] view |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use tappass_core::{
  credential::{BadgeCard, Credential, DigitalId, NewCredential},
  store::{AuditSink, CredentialStore},
};
use uuid::Uuid;

use crate::{ApiState, error::ApiError};

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  #[serde(default)]
  pub active_only: bool,
}

/// `GET /credentials[?active_only=true]`
pub async fn list<S>(
  State(state): State<ApiState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Credential>>, ApiError>
where
  S: CredentialStore + AuditSink + 'static,
{
  let credentials = state
    .store
    .list_credentials(params.active_only)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(credentials))
}

// ─── Register ─────────────────────────────────────────────────────────────────

/// `POST /credentials`: returns 201 + the stored [`Credential`].
///
/// A taken digital ID is rejected with 409.
pub async fn create<S>(
  State(state): State<ApiState<S>>,
  Json(mut body): Json<NewCredential>,
) -> Result<impl IntoResponse, ApiError>
where
  S: CredentialStore + AuditSink + 'static,
{
  body.digital_id = body
    .digital_id
    .map(|id| DigitalId::parse(id.as_str()))
    .transpose()?;
  let input = body.validate()?;

  if let Some(id) = &input.digital_id {
    let existing = state
      .store
      .find_by_digital_id(id)
      .await
      .map_err(|e| ApiError::Store(Box::new(e)))?;
    if existing.is_some() {
      return Err(ApiError::Conflict(format!("digital id {id} is already issued")));
    }
  }

  let credential = state
    .store
    .register(input)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok((StatusCode::CREATED, Json(credential)))
}

// ─── Lookup ───────────────────────────────────────────────────────────────────

async fn fetch<S>(store: &Arc<S>, digital_id: &str) -> Result<Credential, ApiError>
where
  S: CredentialStore,
{
  let id = DigitalId::parse(digital_id)?;
  store
    .find_by_digital_id(&id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .ok_or_else(|| tappass_core::Error::NotFound(id).into())
}

/// `GET /credentials/:digital_id`
pub async fn get_one<S>(
  State(state): State<ApiState<S>>,
  Path(digital_id): Path<String>,
) -> Result<Json<Credential>, ApiError>
where
  S: CredentialStore + AuditSink + 'static,
{
  Ok(Json(fetch(&state.store, &digital_id).await?))
}

/// `GET /users/:user_id/credential`
pub async fn by_user<S>(
  State(state): State<ApiState<S>>,
  Path(user_id): Path<Uuid>,
) -> Result<Json<Credential>, ApiError>
where
  S: CredentialStore + AuditSink + 'static,
{
  let credential = state
    .store
    .find_by_user_id(user_id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .ok_or_else(|| ApiError::NotFound(format!("user {user_id} has no credential")))?;
  Ok(Json(credential))
}

/// `GET /verify/:digital_id`: the badge as anyone holding it may see it.
pub async fn verify<S>(
  State(state): State<ApiState<S>>,
  Path(digital_id): Path<String>,
) -> Result<Json<BadgeCard>, ApiError>
where
  S: CredentialStore + AuditSink + 'static,
{
  let credential = fetch(&state.store, &digital_id).await?;
  Ok(Json(credential.badge_card(Utc::now())))
}

// ─── Status ───────────────────────────────────────────────────────────────────

async fn set_active<S>(
  store: &Arc<S>,
  digital_id: &str,
  active: bool,
) -> Result<Json<Credential>, ApiError>
where
  S: CredentialStore,
{
  let id = DigitalId::parse(digital_id)?;
  let credential = store
    .set_active(&id, active)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .ok_or(tappass_core::Error::NotFound(id))?;
  Ok(Json(credential))
}

/// `POST /credentials/:digital_id/activate`
pub async fn activate<S>(
  State(state): State<ApiState<S>>,
  Path(digital_id): Path<String>,
) -> Result<Json<Credential>, ApiError>
where
  S: CredentialStore + AuditSink + 'static,
{
  set_active(&state.store, &digital_id, true).await
}

/// `POST /credentials/:digital_id/deactivate`
pub async fn deactivate<S>(
  State(state): State<ApiState<S>>,
  Path(digital_id): Path<String>,
) -> Result<Json<Credential>, ApiError>
where
  S: CredentialStore + AuditSink + 'static,
{
  set_active(&state.store, &digital_id, false).await
}
