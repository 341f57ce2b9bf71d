//! Session status: the canonical state machine.
//!
//! The provider reports free-form status labels; locally a session is always
//! in exactly one canonical state. `pending` is the only non-terminal state.
//! Transitions are computed here, free of I/O, and applied by the store
//! inside a single transaction.

use std::fmt;

use serde::{Deserialize, Serialize};

// ─── Canonical states ────────────────────────────────────────────────────────

/// The local, canonical status of a verification session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
  Pending,
  Approved,
  Rejected,
  Failed,
  Expired,
}

impl SessionStatus {
  /// Map a provider status label onto the canonical state.
  ///
  /// Matching is case-insensitive. Unrecognised labels (including the
  /// provider's own intermediate states like "In Progress") collapse to
  /// [`SessionStatus::Pending`] rather than failing, so a new provider label
  /// can never wedge ingestion.
  pub fn from_provider_label(label: &str) -> Self {
    match label.trim().to_ascii_uppercase().as_str() {
      "COMPLETED" => Self::Approved,
      "REJECTED" => Self::Rejected,
      "FAILED" => Self::Failed,
      "EXPIRED" => Self::Expired,
      _ => Self::Pending,
    }
  }

  /// Every state except `pending` is terminal.
  pub fn is_terminal(self) -> bool { !matches!(self, Self::Pending) }

  /// The string stored in the `status` column and rendered in responses.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::Approved => "approved",
      Self::Rejected => "rejected",
      Self::Failed => "failed",
      Self::Expired => "expired",
    }
  }
}

impl fmt::Display for SessionStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

// ─── Transition planning ─────────────────────────────────────────────────────

/// What an incoming status update should do to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
  /// The session moves to the incoming status.
  Enter,
  /// The incoming status equals the current one; nothing to do.
  NoOp,
  /// A non-terminal update arrived after a terminal status; drop it.
  Ignore,
  /// A terminal status different from the current terminal status; the
  /// provider is correcting its own verdict, so the write is accepted.
  Correct,
}

/// Decide what `incoming` does to a session currently in `current`.
///
/// A terminal status never regresses to `pending`, and duplicate deliveries
/// of the same status are no-ops, so replaying a webhook stream in any order
/// converges on the same final state.
pub fn plan_transition(
  current: SessionStatus,
  incoming: SessionStatus,
) -> Transition {
  if current == incoming {
    Transition::NoOp
  } else if !current.is_terminal() {
    Transition::Enter
  } else if incoming.is_terminal() {
    Transition::Correct
  } else {
    Transition::Ignore
  }
}
