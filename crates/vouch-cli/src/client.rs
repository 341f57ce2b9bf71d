//! HTTP client for the server's JSON API, used by every subcommand.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::Client;
use serde::Deserialize;
use vouch_core::{
  provider::{Decision, RemoteSession},
  session::SessionView,
  signature::SIGNATURE_HEADER,
  sync::{CreateSessionRequest, CreatedSession, WebhookOutcome},
};

/// Thin wrapper over [`reqwest::Client`] that knows the server's routes.
///
/// Cloning is cheap; the underlying connection pool is shared.
#[derive(Clone)]
pub struct ApiClient {
  client:   Client,
  base_url: String,
}

/// Error body shape shared by every endpoint.
#[derive(Deserialize)]
struct ApiErrorBody {
  error: String,
}

impl ApiClient {
  pub fn new(base_url: impl Into<String>) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .context("could not build HTTP client")?;
    Ok(Self {
      client,
      base_url: base_url.into(),
    })
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.base_url.trim_end_matches('/'), path)
  }

  // ── Sessions ──────────────────────────────────────────────────────────────

  /// `POST /sessions`
  pub async fn create_session(
    &self,
    req: &CreateSessionRequest,
  ) -> Result<CreatedSession> {
    let resp = self
      .client
      .post(self.url("/sessions"))
      .json(req)
      .send()
      .await
      .context("POST /sessions failed")?;
    read_json(resp, "POST /sessions").await
  }

  /// `GET /sessions/{session_id}`
  pub async fn session(&self, session_id: &str) -> Result<SessionView> {
    let resp = self
      .client
      .get(self.url(&format!("/sessions/{session_id}")))
      .send()
      .await
      .context("GET /sessions/{id} failed")?;
    read_json(resp, "GET /sessions/{id}").await
  }

  /// `GET /sessions?document_id=<id>`
  pub async fn session_by_document(&self, document_id: &str) -> Result<SessionView> {
    let resp = self
      .client
      .get(self.url("/sessions"))
      .query(&[("document_id", document_id)])
      .send()
      .await
      .context("GET /sessions failed")?;
    read_json(resp, "GET /sessions").await
  }

  /// `PATCH /sessions/{session_id}/status`
  pub async fn override_status(
    &self,
    session_id: &str,
    status: &str,
    comment: Option<&str>,
  ) -> Result<RemoteSession> {
    let resp = self
      .client
      .patch(self.url(&format!("/sessions/{session_id}/status")))
      .json(&serde_json::json!({ "status": status, "comment": comment }))
      .send()
      .await
      .context("PATCH /sessions/{id}/status failed")?;
    read_json(resp, "PATCH /sessions/{id}/status").await
  }

  /// `GET /sessions/{session_id}/decision`
  pub async fn decision(&self, session_id: &str) -> Result<Decision> {
    let resp = self
      .client
      .get(self.url(&format!("/sessions/{session_id}/decision")))
      .send()
      .await
      .context("GET /sessions/{id}/decision failed")?;
    read_json(resp, "GET /sessions/{id}/decision").await
  }

  // ── Webhook ───────────────────────────────────────────────────────────────

  /// `POST /webhook` with a raw, pre-signed body.
  ///
  /// The signature covers the exact bytes on the wire, so the body is sent
  /// as given rather than re-serialized.
  pub async fn post_webhook(
    &self,
    body: Vec<u8>,
    signature: Option<&str>,
  ) -> Result<WebhookOutcome> {
    let mut req = self
      .client
      .post(self.url("/webhook"))
      .header("content-type", "application/json")
      .body(body);
    if let Some(sig) = signature {
      req = req.header(SIGNATURE_HEADER, sig);
    }
    let resp = req.send().await.context("POST /webhook failed")?;
    read_json(resp, "POST /webhook").await
  }
}

/// Decode a response body, surfacing the server's `error` message on failure.
async fn read_json<T: serde::de::DeserializeOwned>(
  resp: reqwest::Response,
  what: &str,
) -> Result<T> {
  let status = resp.status();
  if !status.is_success() {
    return match resp.json::<ApiErrorBody>().await {
      Ok(body) => Err(anyhow!("{what} → {status}: {}", body.error)),
      Err(_) => Err(anyhow!("{what} → {status}")),
    };
  }
  resp
    .json()
    .await
    .with_context(|| format!("deserialising {what} response"))
}
