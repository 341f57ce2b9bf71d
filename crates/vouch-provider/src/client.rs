//! Async HTTP client for the provider's verification API.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;
use vouch_core::provider::{
  CreateRemoteSession, Decision, ProviderClient, RemoteSession,
};

use crate::error::{Error, Result};

/// Provider error bodies can be arbitrarily large; logs and errors carry at
/// most this many characters of them.
const BODY_SNIPPET_LEN: usize = 500;

/// Connection settings for the provider.
///
/// `auth_url` is the complete token-exchange endpoint. `api_url` is the base
/// of the verification API; session paths are appended to it.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
  pub auth_url:      String,
  pub api_url:       String,
  pub client_id:     String,
  pub client_secret: SecretString,
}

/// Async HTTP client for the provider API.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct HttpProviderClient {
  client: Client,
  config: ProviderConfig,
}

impl HttpProviderClient {
  pub fn new(config: ProviderConfig) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(30))
      .build()?;
    Ok(Self { client, config })
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.config.api_url.trim_end_matches('/'), path)
  }

  /// `POST {auth_url}` with Basic credentials. Tokens are short-lived and
  /// cheap; one is acquired per operation instead of cached.
  async fn acquire_token(&self) -> Result<String> {
    let response = self
      .client
      .post(&self.config.auth_url)
      .basic_auth(
        &self.config.client_id,
        Some(self.config.client_secret.expose_secret()),
      )
      .form(&[("grant_type", "client_credentials")])
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      let body = snippet(&response.text().await.unwrap_or_default());
      return Err(Error::Auth { status, body });
    }
    let token: TokenResponse = response.json().await?;
    Ok(token.access_token)
  }
}

impl ProviderClient for HttpProviderClient {
  type Error = Error;

  /// `POST {api_url}/v1/session/`
  async fn create_session(
    &self,
    request: &CreateRemoteSession,
  ) -> Result<RemoteSession> {
    let token = self.acquire_token().await?;
    let body = CreateSessionBody {
      callback:    &request.callback_url,
      features:    &request.features,
      vendor_data: &request.vendor_data,
    };
    debug!(features = %request.features, "creating provider session");

    let response = self
      .client
      .post(self.url("/v1/session/"))
      .bearer_auth(&token)
      .json(&body)
      .send()
      .await?;
    let session = read_session(response).await?;
    if session.session_id.is_empty() || session.verification_url.is_empty() {
      return Err(Error::Decode(
        "session response missing session_id or verification url".into(),
      ));
    }
    Ok(session)
  }

  /// `GET {api_url}/v1/session/{id}/decision/`
  async fn retrieve_decision(&self, external_id: &str) -> Result<Decision> {
    let token = self.acquire_token().await?;
    debug!(%external_id, "retrieving decision report");

    let response = self
      .client
      .get(self.url(&format!("/v1/session/{external_id}/decision/")))
      .bearer_auth(&token)
      .send()
      .await?;
    let status = response.status();
    if !status.is_success() {
      let body = snippet(&response.text().await.unwrap_or_default());
      return Err(Error::Status { status, body });
    }
    Ok(response.json().await?)
  }

  /// `PATCH {api_url}/v1/session/{id}/update-status/`
  async fn update_status(
    &self,
    external_id: &str,
    new_status: &str,
    comment: Option<&str>,
  ) -> Result<RemoteSession> {
    let token = self.acquire_token().await?;
    let body = UpdateStatusBody {
      new_status,
      comment,
    };
    debug!(%external_id, %new_status, "updating provider session status");

    let response = self
      .client
      .patch(self.url(&format!("/v1/session/{external_id}/update-status/")))
      .bearer_auth(&token)
      .json(&body)
      .send()
      .await?;
    read_session(response).await
  }
}

// ─── Wire shapes ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct TokenResponse {
  access_token: String,
}

#[derive(Serialize)]
struct CreateSessionBody<'a> {
  callback:    &'a str,
  features:    &'a str,
  vendor_data: &'a str,
}

#[derive(Serialize)]
struct UpdateStatusBody<'a> {
  new_status: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  comment:    Option<&'a str>,
}

/// The provider's session representation. Creation and status calls return
/// more fields than these; the rest are ignored.
#[derive(Deserialize)]
struct SessionResponse {
  #[serde(default)]
  session_id: String,
  #[serde(default)]
  url:        Option<String>,
  #[serde(default)]
  expires_at: Option<DateTime<Utc>>,
  #[serde(default)]
  status:     Option<String>,
}

impl SessionResponse {
  fn into_remote(self) -> RemoteSession {
    RemoteSession {
      session_id:       self.session_id,
      verification_url: self.url.unwrap_or_default(),
      expires_at:       self.expires_at,
      status:           self.status,
    }
  }
}

async fn read_session(response: reqwest::Response) -> Result<RemoteSession> {
  let status = response.status();
  if !status.is_success() {
    let body = snippet(&response.text().await.unwrap_or_default());
    return Err(Error::Status { status, body });
  }
  let wire: SessionResponse = response.json().await?;
  Ok(wire.into_remote())
}

fn snippet(body: &str) -> String {
  body.chars().take(BODY_SNIPPET_LEN).collect()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
