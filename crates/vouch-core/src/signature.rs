//! HMAC-SHA256 verification of webhook signatures.
//!
//! The provider signs every webhook body with a shared secret and sends the
//! lowercase hex digest in the `X-Signature` header. Comparison is constant
//! time, the signature covers the exact raw body bytes, and the secret never
//! appears in errors or logs.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the lowercase hex HMAC-SHA256 of the raw body.
pub const SIGNATURE_HEADER: &str = "x-signature";

/// Verifies webhook signatures against the configured shared secret.
///
/// Without a secret the verifier accepts everything; that mode exists for
/// local development and is announced loudly at startup.
#[derive(Clone)]
pub struct SignatureVerifier {
  secret: Option<SecretString>,
}

impl SignatureVerifier {
  pub const fn new(secret: SecretString) -> Self {
    Self {
      secret: Some(secret),
    }
  }

  /// Explicit opt-out: every payload passes unverified.
  pub const fn disabled() -> Self { Self { secret: None } }

  pub const fn is_enabled(&self) -> bool { self.secret.is_some() }

  /// Check `supplied` (the `X-Signature` header value, if any) against the
  /// HMAC-SHA256 of `body`.
  ///
  /// A missing, non-hex, or mismatched signature is an authentication error.
  /// No local state has been read or written when this fails.
  pub fn verify(&self, body: &[u8], supplied: Option<&str>) -> Result<()> {
    let Some(secret) = &self.secret else {
      return Ok(());
    };
    let supplied = supplied.ok_or_else(|| {
      Error::Authentication("missing X-Signature header".into())
    })?;
    let supplied = hex::decode(supplied.trim())
      .map_err(|_| Error::Authentication("malformed X-Signature header".into()))?;

    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
      .expect("HMAC accepts keys of any length");
    mac.update(body);
    let computed = mac.finalize().into_bytes();

    // Constant-time comparison; length mismatches also compare unequal.
    if computed.as_slice().ct_eq(supplied.as_slice()).into() {
      Ok(())
    } else {
      tracing::warn!("webhook signature verification failed");
      Err(Error::Authentication("invalid webhook signature".into()))
    }
  }

  /// The lowercase hex HMAC-SHA256 of `body` under `secret`, exactly as the
  /// provider would send it. Used by the webhook simulator and tests.
  pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
      .expect("HMAC accepts keys of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
  }
}
