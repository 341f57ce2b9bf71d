//! HTTP layer for the vouch verification service.
//!
//! Exposes an axum [`Router`] over any [`SessionStore`] + [`ProviderClient`]
//! pair, plus the runtime configuration the `vouchd` binary reads. Operator
//! authentication, TLS, and transport concerns are expected to be handled by
//! whatever fronts this server.

pub mod error;
pub mod sessions;
pub mod webhook;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{get, patch, post},
};
use secrecy::SecretString;
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use vouch_core::{provider::ProviderClient, store::SessionStore, sync::SyncEngine};
use vouch_provider::ProviderConfig;

pub use error::ApiError;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime server configuration, deserialized from `config.toml` layered
/// under `VOUCH_`-prefixed environment variables.
#[derive(Clone, Deserialize)]
pub struct ServerConfig {
  pub host:            String,
  pub port:            u16,
  /// Public base URL the provider reaches this server at; the webhook
  /// callback registered with each session is `{public_base_url}/webhook`.
  pub public_base_url: String,
  pub store_path:      PathBuf,
  /// Shared webhook secret. Unset disables signature verification, which is
  /// only acceptable for local development.
  #[serde(default)]
  pub webhook_secret:  Option<SecretString>,
  pub provider:        ProviderConfig,
}

// ─── Application state ───────────────────────────────────────────────────────

/// Engine and store handles cloned into every handler.
#[derive(Clone)]
pub struct AppState<S, P> {
  pub engine: Arc<SyncEngine<S, P>>,
  pub store:  Arc<S>,
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the axum [`Router`] for the verification API.
pub fn router<S, P>(state: AppState<S, P>) -> Router
where
  S: SessionStore + Clone + 'static,
  P: ProviderClient + Clone + 'static,
{
  Router::new()
    .route(
      "/sessions",
      post(sessions::create::<S, P>).get(sessions::query::<S, P>),
    )
    .route("/sessions/{external_id}", get(sessions::get_one::<S, P>))
    .route(
      "/sessions/{external_id}/status",
      patch(sessions::override_status::<S, P>),
    )
    .route(
      "/sessions/{external_id}/decision",
      get(sessions::decision::<S, P>),
    )
    .route("/webhook", post(webhook::receive::<S, P>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

// ─── Integration tests ───────────────────────────────────────────────────────
