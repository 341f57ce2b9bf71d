//! The `SessionStore` trait and its typed operation outcomes.
//!
//! Storage backends (`vouch-store-sqlite` in this workspace) implement the
//! trait; the engine and the HTTP layer only ever see the abstraction.

use std::future::Future;

use uuid::Uuid;

use crate::{
  session::{NewSession, SessionRecord},
  status::SessionStatus,
  subject::SubjectRefinements,
};

// ─── Operation inputs and outcomes ───────────────────────────────────────────

/// A provider-driven status update, already mapped to canonical form.
#[derive(Debug, Clone)]
pub struct SessionUpdate {
  pub status:      SessionStatus,
  pub refinements: SubjectRefinements,
}

/// Result of attaching an external identifier to a provisional session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
  /// The identifier was recorded (or was already recorded with this exact
  /// value; confirmation is idempotent).
  Confirmed,
  /// Another session already owns this external identifier.
  ExternalIdTaken,
  /// The session already carries a different external identifier.
  /// Identifiers are immutable once set, so the write was refused.
  AlreadyConfirmed,
}

/// Result of applying a [`SessionUpdate`], reported so callers can log and
/// react without re-reading the row.
#[derive(Debug, Clone)]
pub enum UpdateOutcome {
  /// The session moved to a new status.
  Applied {
    previous: SessionStatus,
    record:   SessionRecord,
  },
  /// The incoming status matched the stored one. Refinements may still have
  /// been merged; a byte-identical redelivery changes nothing.
  NoOp { record: SessionRecord },
  /// A terminal verdict was replaced by a different terminal verdict.
  Corrected {
    previous: SessionStatus,
    record:   SessionRecord,
  },
  /// A stale non-terminal update arrived after a terminal status and was
  /// dropped without touching the row.
  Ignored { record: SessionRecord },
}

impl UpdateOutcome {
  /// The session record after the update (identical to before, for
  /// `Ignored`).
  pub fn record(&self) -> &SessionRecord {
    match self {
      Self::Applied { record, .. }
      | Self::NoOp { record }
      | Self::Corrected { record, .. }
      | Self::Ignored { record } => record,
    }
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the local session store.
///
/// Webhook application is a read-modify-write of one session row;
/// implementations must serialize concurrent [`SessionStore::apply_update`]
/// calls for the same external identifier so no update is lost.
///
/// Every method returns a `Send` future; the trait is consumed from
/// multi-threaded tokio handlers.
pub trait SessionStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Creation lifecycle ────────────────────────────────────────────────

  /// Persist a provisional session (no external identifier, `pending`
  /// status) together with its subject. Identifiers and timestamps are
  /// assigned by the store.
  fn create_session(
    &self,
    input: NewSession,
  ) -> impl Future<Output = Result<SessionRecord, Self::Error>> + Send + '_;

  /// Attach the provider's external identifier to a provisional session.
  ///
  /// Uniqueness is checked inside the same transaction that writes the
  /// identifier, backed by a UNIQUE constraint.
  fn confirm_session<'a>(
    &'a self,
    session_id: Uuid,
    external_id: &'a str,
  ) -> impl Future<Output = Result<ConfirmOutcome, Self::Error>> + Send + 'a;

  /// Remove a session and its subject. Returns whether anything existed.
  /// Used to roll back the local anchor when the provider call fails.
  fn delete_session(
    &self,
    session_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Provider-driven mutation ──────────────────────────────────────────

  /// Atomically apply a status update plus field refinements to the session
  /// with this external identifier. Returns `None` if no confirmed session
  /// carries the identifier; provisional sessions are never matched.
  fn apply_update<'a>(
    &'a self,
    external_id: &'a str,
    update: SessionUpdate,
  ) -> impl Future<Output = Result<Option<UpdateOutcome>, Self::Error>> + Send + 'a;

  /// Merge field refinements without touching the status. Returns whether a
  /// session with this external identifier exists. Used for best-effort
  /// enrichment from decision reports.
  fn refine_subject<'a>(
    &'a self,
    external_id: &'a str,
    refinements: SubjectRefinements,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Look up a session by its external identifier.
  fn get_by_external_id<'a>(
    &'a self,
    external_id: &'a str,
  ) -> impl Future<Output = Result<Option<SessionRecord>, Self::Error>> + Send + 'a;

  /// Look up the most recently created session for a document number.
  fn get_by_document_id<'a>(
    &'a self,
    document_id: &'a str,
  ) -> impl Future<Output = Result<Option<SessionRecord>, Self::Error>> + Send + 'a;
}
