//! Stat storage for the usage stats collector.
//!
//! One table of time-bucketed measurements, unique per `(measure, starting)`,
//! with a ClickHouse backend for production and an in-memory backend for
//! tests and local runs.

pub mod client;
pub mod clickhouse_store;
pub mod config;
pub mod health;
pub mod memory;
pub mod schema;
pub mod store;

pub use client::*;
pub use clickhouse_store::ClickHouseStatStore;
pub use config::*;
pub use memory::MemoryStatStore;
pub use store::*;
