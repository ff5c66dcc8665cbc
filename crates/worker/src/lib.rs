//! Background workers for the usage stats collector.
//!
//! - Velocity collector (per-minute event counts)
//! - Usage collector (daily roster snapshot)
//! - Backfill engine (repair of missing velocity minutes)
//! - Scheduler (tickers, manual triggers, per-job coalescing)

pub mod backfill;
pub mod job;
pub mod record;
pub mod scheduler;
pub mod usage;
pub mod velocity;

pub use backfill::{BackfillConfig, BackfillEngine, BackfillReport};
pub use job::{Job, JobKind};
pub use record::{record_all, record_stat, WriteOutcome, WriteTally};
pub use scheduler::*;
pub use usage::{UsageCollector, UsageReport, UsageSummary, USERS_PAGE_SIZE};
pub use velocity::{VelocityCollector, VelocityReport, EVENTS_PAGE_SIZE};
