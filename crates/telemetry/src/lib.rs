//! Internal telemetry for the usage stats collector.
//!
//! Structured logging setup, in-process job metrics, and the component
//! health registry behind the health endpoints.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
