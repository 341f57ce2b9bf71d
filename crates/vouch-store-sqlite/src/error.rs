//! Error types for the SQLite session store.

use thiserror::Error;

/// Errors arising from the SQLite store.
#[derive(Debug, Error)]
pub enum Error {
  /// An error from the underlying database.
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),
  /// A stored UUID failed to parse.
  #[error("failed to parse stored UUID: {0}")]
  Uuid(#[from] uuid::Error),
  /// A stored timestamp or calendar date failed to parse.
  #[error("failed to parse stored date: {0}")]
  DateParse(#[from] chrono::ParseError),
  /// A stored status label is not one we recognize.
  #[error("unknown stored status {0:?}")]
  UnknownStatus(String),
  /// A session referenced by primary key does not exist.
  #[error("session {0} not found")]
  SessionNotFound(uuid::Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
