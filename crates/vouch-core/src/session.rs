//! Verification sessions and their read models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{status::SessionStatus, subject::Subject};

// ─── Session ─────────────────────────────────────────────────────────────────

/// One verification attempt against the external provider.
///
/// `external_id` is `None` while the session is provisional (created locally,
/// not yet acknowledged by the provider). Once set it never changes, and no
/// two sessions ever share one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationSession {
  pub session_id:  Uuid,
  pub external_id: Option<String>,
  pub status:      SessionStatus,
  pub created_at:  DateTime<Utc>,
  pub updated_at:  DateTime<Utc>,
}

/// A session joined with the subject it verifies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
  pub session: VerificationSession,
  pub subject: Subject,
}

// ─── NewSession ──────────────────────────────────────────────────────────────

/// Input to [`crate::store::SessionStore::create_session`].
/// Identifiers and timestamps are always assigned by the store.
#[derive(Debug, Clone)]
pub struct NewSession {
  pub first_name:    String,
  pub last_name:     String,
  pub document_id:   String,
  pub document_type: Option<String>,
}

// ─── Read model ──────────────────────────────────────────────────────────────

/// The flattened view returned by the status-query endpoints.
///
/// `session_id` here is the provider's external identifier; it is `null` only
/// for the brief window in which a session is still provisional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionView {
  pub first_name:  String,
  pub last_name:   String,
  pub document_id: String,
  pub session_id:  Option<String>,
  pub status:      SessionStatus,
  pub created_at:  DateTime<Utc>,
  pub updated_at:  DateTime<Utc>,
}

impl From<SessionRecord> for SessionView {
  fn from(record: SessionRecord) -> Self {
    Self {
      first_name:  record.subject.first_name,
      last_name:   record.subject.last_name,
      document_id: record.subject.document_id,
      session_id:  record.session.external_id,
      status:      record.session.status,
      created_at:  record.session.created_at,
      updated_at:  record.session.updated_at,
    }
  }
}
