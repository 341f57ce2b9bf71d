//! Error types for `vouch-core`.
//!
//! Every failure the engine can surface maps onto exactly one variant here,
//! and each variant carries a stable machine-checkable kind alongside the
//! human-readable message.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Caller-supplied input failed validation before any remote work.
  #[error("validation error: {0}")]
  Validation(String),

  /// Webhook signature was absent, malformed, or did not match.
  #[error("authentication error: {0}")]
  Authentication(String),

  /// Webhook body could not be parsed into the expected schema.
  #[error("malformed payload: {0}")]
  MalformedPayload(String),

  /// No session matches the supplied identifier.
  #[error("not found: {0}")]
  NotFound(String),

  /// The remote provider rejected or failed an operation.
  #[error("provider error: {0}")]
  Provider(#[source] Box<dyn std::error::Error + Send + Sync>),

  /// An external identifier collision or other broken uniqueness invariant.
  #[error("conflict: {0}")]
  Conflict(String),

  /// The local session store failed.
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Stable error kind for API responses and log correlation.
  pub fn kind(&self) -> &'static str {
    match self {
      Error::Validation(_) => "validation_error",
      Error::Authentication(_) => "authentication_error",
      Error::MalformedPayload(_) => "malformed_payload",
      Error::NotFound(_) => "not_found",
      Error::Provider(_) => "provider_error",
      Error::Conflict(_) => "conflict",
      Error::Store(_) => "store_error",
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
