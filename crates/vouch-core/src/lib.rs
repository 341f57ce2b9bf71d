//! Core types and trait definitions for the vouch verification service.
//!
//! Everything transport-agnostic lives here: the domain model, the status
//! state machine, the store and provider traits, webhook parsing and
//! signature checks, and the engine that ties them together. This crate has
//! no HTTP or database dependencies; every other crate builds on it.

// Native `async fn` in traits; the advisory lint about `Send` bounds on the
// returned futures does not apply since the traits spell those bounds out.
#![allow(async_fn_in_trait)]

pub mod error;
pub mod provider;
pub mod session;
pub mod signature;
pub mod status;
pub mod store;
pub mod subject;
pub mod sync;
pub mod webhook;

pub use error::{Error, Result};
