//! The `ProviderClient` trait and the provider-facing data shapes.
//!
//! The hosted verification provider is the source of truth for verification
//! outcomes. This trait is the only seam through which the engine talks to
//! it, so tests can script provider behavior without a network.

use std::future::Future;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::subject::SubjectRefinements;

// ─── Requests ────────────────────────────────────────────────────────────────

/// Parameters for [`ProviderClient::create_session`].
#[derive(Debug, Clone, Serialize)]
pub struct CreateRemoteSession {
  /// Comma-separated provider feature flags, e.g. `"OCR"` or `"OCR,FACE"`.
  pub features:     String,
  /// Where the provider should deliver webhooks for this session.
  pub callback_url: String,
  /// Opaque correlation tag echoed back in webhooks; we pass the document
  /// number unless the caller supplies something else.
  pub vendor_data:  String,
}

// ─── Responses ───────────────────────────────────────────────────────────────

/// The provider's view of a session, as returned by session creation and
/// status-override calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSession {
  /// The provider-assigned external identifier.
  pub session_id:       String,
  /// Hosted flow URL the end user completes verification at. Always present
  /// on creation; may be empty on other calls.
  pub verification_url: String,
  pub expires_at:       Option<DateTime<Utc>>,
  /// Raw provider status label, unmapped.
  pub status:           Option<String>,
}

/// Subject fields the provider extracts during document analysis. Field
/// names follow the provider's wire contract.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KycFields {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_name:       Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub document_number: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub document_type:   Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub nationality:     Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub date_of_birth:   Option<NaiveDate>,
}

impl KycFields {
  /// Translate the wire shape into the domain refinement shape.
  pub fn to_refinements(&self) -> SubjectRefinements {
    SubjectRefinements {
      last_name:     self.last_name.clone(),
      document_id:   self.document_number.clone(),
      document_type: self.document_type.clone(),
      nationality:   self.nationality.clone(),
      date_of_birth: self.date_of_birth,
    }
  }
}

/// The full decision report for a finished session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
  pub session_id: String,
  /// Raw provider status label, unmapped.
  pub status:     String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub kyc:        Option<KycFields>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the hosted verification provider's HTTP API.
///
/// Implementations authenticate per call; no token state is shared between
/// operations. All methods return `Send` futures.
pub trait ProviderClient: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Open a verification session with the provider. The result always
  /// carries an external identifier and a verification URL.
  fn create_session<'a>(
    &'a self,
    request: &'a CreateRemoteSession,
  ) -> impl Future<Output = Result<RemoteSession, Self::Error>> + Send + 'a;

  /// Fetch the decision report for a session.
  fn retrieve_decision<'a>(
    &'a self,
    external_id: &'a str,
  ) -> impl Future<Output = Result<Decision, Self::Error>> + Send + 'a;

  /// Ask the provider to set a session's status. The local store is not
  /// touched; the provider confirms the change through its webhook.
  fn update_status<'a>(
    &'a self,
    external_id: &'a str,
    new_status: &'a str,
    comment: Option<&'a str>,
  ) -> impl Future<Output = Result<RemoteSession, Self::Error>> + Send + 'a;
}
