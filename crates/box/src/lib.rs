//! Enterprise event-stream and user-roster client.
//!
//! Implements [`stats_core::EventSource`] over the enterprise REST API. OAuth
//! and token persistence live elsewhere; this crate only consumes a token.

pub mod client;
pub mod config;

pub use client::BoxClient;
pub use config::BoxConfig;
