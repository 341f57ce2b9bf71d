//! SQLite-backed implementation of the `vouch-core` session store.
//!
//! All access goes through [`SqliteStore`], a thin async wrapper around a
//! single SQLite connection. Rows are stored as text (UUIDs hyphenated,
//! timestamps RFC 3339) and decoded back into the domain types on read.

mod encode;
pub mod error;
mod schema;
mod store;

pub use error::{Error, Result};
pub use store::SqliteStore;
