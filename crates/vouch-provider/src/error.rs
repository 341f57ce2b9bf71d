//! Error types for the provider client.

use thiserror::Error;

/// Errors from talking to the verification provider.
#[derive(Debug, Error)]
pub enum Error {
  /// The token exchange was refused.
  #[error("token exchange failed with {status}: {body}")]
  Auth {
    status: reqwest::StatusCode,
    body:   String,
  },
  /// The provider answered an API call with a non-success status.
  #[error("provider returned {status}: {body}")]
  Status {
    status: reqwest::StatusCode,
    body:   String,
  },
  /// The request itself failed (connect, timeout, body decode).
  #[error("transport error: {0}")]
  Transport(#[from] reqwest::Error),
  /// A success response did not carry what the protocol promises.
  #[error("unexpected provider response: {0}")]
  Decode(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
