//! HTTP API layer for the usage stats collector.
//!
//! Job triggers, stat history reads, and health probes.

pub mod response;
pub mod routes;
pub mod state;

pub use routes::router;
pub use state::AppState;
