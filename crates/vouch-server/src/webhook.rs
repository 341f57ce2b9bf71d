//! Handler for `POST /webhook`, the provider's event callback.

use axum::{
  Json,
  body::Bytes,
  extract::State,
  http::HeaderMap,
};
use vouch_core::{
  provider::ProviderClient,
  signature::SIGNATURE_HEADER,
  store::SessionStore,
  sync::WebhookOutcome,
};

use crate::{AppState, error::ApiError};

/// `POST /webhook`
///
/// Takes the body as raw bytes: the signature covers the exact bytes on the
/// wire, so the payload must not be re-serialized before verification.
pub async fn receive<S, P>(
  State(state): State<AppState<S, P>>,
  headers: HeaderMap,
  body: Bytes,
) -> Result<Json<WebhookOutcome>, ApiError>
where
  S: SessionStore + Clone + 'static,
  P: ProviderClient + Clone + 'static,
{
  let signature = headers
    .get(SIGNATURE_HEADER)
    .and_then(|value| value.to_str().ok());
  let outcome = state.engine.ingest_webhook(&body, signature).await?;
  Ok(Json(outcome))
}
