//! Single-row stat writes with per-row failure isolation.

use stat_store::StatStore;
use stats_core::StatRecord;
use telemetry::metrics;
use tracing::{debug, warn};

/// What happened to one write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Recorded,
    /// The bucket already had this measure; the stored value stands.
    Conflict,
    Failed,
}

/// Tally of a batch of independent writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteTally {
    pub recorded: usize,
    pub conflicts: usize,
    pub failed: usize,
}

impl WriteTally {
    pub fn add(&mut self, outcome: WriteOutcome) {
        match outcome {
            WriteOutcome::Recorded => self.recorded += 1,
            WriteOutcome::Conflict => self.conflicts += 1,
            WriteOutcome::Failed => self.failed += 1,
        }
    }
}

/// Write one record. Errors are logged and counted, never returned, so a bad
/// row cannot stop its siblings.
pub async fn record_stat(store: &dyn StatStore, record: &StatRecord) -> WriteOutcome {
    match store.insert(record).await {
        Ok(()) => {
            metrics().stats_recorded.inc();
            WriteOutcome::Recorded
        }
        Err(e) if e.is_conflict() => {
            metrics().stat_conflicts.inc();
            debug!(
                measure = %record.measure,
                starting = %record.starting,
                "Stat already recorded, skipping"
            );
            WriteOutcome::Conflict
        }
        Err(e) => {
            metrics().stat_write_errors.inc();
            warn!(
                measure = %record.measure,
                starting = %record.starting,
                error = %e,
                "Failed to record stat"
            );
            WriteOutcome::Failed
        }
    }
}

/// Write records one by one, each in its own commit.
pub async fn record_all(store: &dyn StatStore, records: &[StatRecord]) -> WriteTally {
    let mut tally = WriteTally::default();
    for record in records {
        tally.add(record_stat(store, record).await);
    }
    tally
}
