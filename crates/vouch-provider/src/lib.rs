//! HTTP implementation of the `vouch-core` provider client.
//!
//! Talks to the hosted verification provider: token exchange with Basic
//! credentials, then bearer-authorized session calls. A fresh token is
//! acquired for every operation; nothing is cached between calls.

mod client;
pub mod error;

pub use client::{HttpProviderClient, ProviderConfig};
pub use error::{Error, Result};
