//! Webhook payload schema.
//!
//! The provider delivers status changes as JSON POSTs. The body is parsed
//! once, here, into an explicit schema; handlers never poke at loose JSON.
//! Unknown fields are ignored so the provider can extend its payload without
//! breaking ingestion.

use serde::Deserialize;

use crate::{
  Error, Result,
  provider::KycFields,
  subject::SubjectRefinements,
};

/// One webhook delivery from the provider.
///
/// The provider has used both `id` and `session_id` for the external
/// identifier across payload versions; both are accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
  #[serde(alias = "id")]
  pub session_id:  String,
  /// Raw provider status label; mapped to canonical form by the engine.
  pub status:      String,
  /// Correlation data echoed back by the provider. Real deliveries carry
  /// both the plain tag supplied at creation and structured objects.
  #[serde(default)]
  pub vendor_data: Option<serde_json::Value>,
  #[serde(default)]
  pub decision:    Option<DecisionBlock>,
}

/// Optional decision details embedded in a webhook.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DecisionBlock {
  #[serde(default)]
  pub kyc: Option<KycFields>,
}

impl WebhookEvent {
  /// Parse and validate a raw webhook body.
  ///
  /// Anything that fails here (bad JSON, wrong shape, blank identifier or
  /// status) is a malformed payload; signature verification has already
  /// happened by the time this runs.
  pub fn parse(body: &[u8]) -> Result<Self> {
    let event: Self = serde_json::from_slice(body)
      .map_err(|e| Error::MalformedPayload(format!("invalid webhook body: {e}")))?;
    if event.session_id.trim().is_empty() {
      return Err(Error::MalformedPayload(
        "webhook carries no session identifier".into(),
      ));
    }
    if event.status.trim().is_empty() {
      return Err(Error::MalformedPayload("webhook carries no status".into()));
    }
    Ok(event)
  }

  /// The subject refinements carried by this event, if any.
  pub fn refinements(&self) -> SubjectRefinements {
    self
      .decision
      .as_ref()
      .and_then(|d| d.kyc.as_ref())
      .map(KycFields::to_refinements)
      .unwrap_or_default()
  }
}
