//! Handlers for `/sessions` endpoints.
//!
//! | Method  | Path | Notes |
//! |---------|------|-------|
//! | `POST`  | `/sessions` | Create a session with the provider |
//! | `GET`   | `/sessions?document_id=<id>` | Most recent session for a document |
//! | `GET`   | `/sessions/{external_id}` | 404 if not found |
//! | `PATCH` | `/sessions/{external_id}/status` | Proxied provider override |
//! | `GET`   | `/sessions/{external_id}/decision` | Proxied decision report |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use vouch_core::{
  Error,
  provider::{Decision, ProviderClient, RemoteSession},
  session::SessionView,
  store::SessionStore,
  sync::{CreateSessionRequest, CreatedSession},
};

use crate::{
  AppState,
  error::{ApiError, ApiJson},
};

// ─── Create ──────────────────────────────────────────────────────────────────

/// `POST /sessions`
///
/// Required fields are validated by the engine, so a missing one is a 400
/// with a validation kind; a body that does not parse at all is a 400 with
/// a malformed-payload kind from [`ApiJson`].
pub async fn create<S, P>(
  State(state): State<AppState<S, P>>,
  ApiJson(body): ApiJson<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError>
where
  S: SessionStore + Clone + 'static,
  P: ProviderClient + Clone + 'static,
{
  let created: CreatedSession = state.engine.create_session(body).await?;
  Ok((StatusCode::CREATED, Json(created)))
}

// ─── Reads ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct QueryParams {
  pub document_id: Option<String>,
}

/// `GET /sessions?document_id=<id>`
pub async fn query<S, P>(
  State(state): State<AppState<S, P>>,
  Query(params): Query<QueryParams>,
) -> Result<Json<SessionView>, ApiError>
where
  S: SessionStore + Clone + 'static,
  P: ProviderClient + Clone + 'static,
{
  let document_id = params
    .document_id
    .as_deref()
    .filter(|v| !v.trim().is_empty())
    .ok_or_else(|| {
      Error::Validation("missing required query parameter \"document_id\"".into())
    })?;

  let record = state
    .store
    .get_by_document_id(document_id)
    .await
    .map_err(|e| Error::Store(Box::new(e)))?
    .ok_or_else(|| {
      Error::NotFound(format!("no session for document {document_id:?}"))
    })?;
  Ok(Json(SessionView::from(record)))
}

/// `GET /sessions/{external_id}`
pub async fn get_one<S, P>(
  State(state): State<AppState<S, P>>,
  Path(external_id): Path<String>,
) -> Result<Json<SessionView>, ApiError>
where
  S: SessionStore + Clone + 'static,
  P: ProviderClient + Clone + 'static,
{
  let record = state
    .store
    .get_by_external_id(&external_id)
    .await
    .map_err(|e| Error::Store(Box::new(e)))?
    .ok_or_else(|| {
      Error::NotFound(format!(
        "no session with external identifier {external_id:?}"
      ))
    })?;
  Ok(Json(SessionView::from(record)))
}

// ─── Proxied provider calls ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct OverrideBody {
  pub status:  Option<String>,
  pub comment: Option<String>,
}

/// `PATCH /sessions/{external_id}/status`
///
/// Passes the override to the provider. The local row is not written here;
/// the provider's webhook is the only local update path.
pub async fn override_status<S, P>(
  State(state): State<AppState<S, P>>,
  Path(external_id): Path<String>,
  ApiJson(body): ApiJson<OverrideBody>,
) -> Result<Json<RemoteSession>, ApiError>
where
  S: SessionStore + Clone + 'static,
  P: ProviderClient + Clone + 'static,
{
  let remote = state
    .engine
    .override_status(&external_id, body.status.as_deref(), body.comment.as_deref())
    .await?;
  Ok(Json(remote))
}

/// `GET /sessions/{external_id}/decision`
pub async fn decision<S, P>(
  State(state): State<AppState<S, P>>,
  Path(external_id): Path<String>,
) -> Result<Json<Decision>, ApiError>
where
  S: SessionStore + Clone + 'static,
  P: ProviderClient + Clone + 'static,
{
  let decision = state.engine.fetch_decision(&external_id).await?;
  Ok(Json(decision))
}
