//! Backfill worker for missing velocity minutes.
//!
//! Scans stored history hour by hour, newest first, within a bounded lookback
//! window. Every minute of an unmarked hour that lacks one of the velocity
//! measures is re-recorded through the velocity collector. An hour whose 60
//! minutes are all complete gets a `VELOCITY_BACKFILL` marker so later scans
//! skip it. Gaps older than the lookback are left alone.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use telemetry::metrics;
use tracing::{debug, info, warn};

use stat_store::StatStore;
use stats_core::{
    truncate_hour, truncate_minute, Bucket, Clock, Measure, Result, StatRecord,
    VELOCITY_MEASURES,
};

use crate::job::{Job, JobKind};
use crate::record::{record_stat, WriteOutcome};
use crate::velocity::VelocityCollector;

const MINUTES_PER_HOUR: usize = 60;

/// Backfill limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillConfig {
    /// How far back gaps are repaired.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    /// Hours with missing minutes repaired per run; the rest wait for the next run.
    #[serde(default = "default_max_hours_per_run")]
    pub max_hours_per_run: usize,
}

fn default_lookback_days() -> u32 {
    7
}

fn default_max_hours_per_run() -> usize {
    4
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_lookback_days(),
            max_hours_per_run: default_max_hours_per_run(),
        }
    }
}

/// Result of one backfill run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillReport {
    /// Unmarked hours inspected.
    pub hours_scanned: usize,
    /// Hours in which at least one minute was re-recorded.
    pub hours_repaired: usize,
    pub minutes_repaired: usize,
    pub hours_marked: usize,
}

/// First hour the scan may touch: the lookback horizon, but never before the
/// oldest recorded bucket.
pub fn scan_start(
    now: DateTime<Utc>,
    oldest: DateTime<Utc>,
    lookback_days: u32,
) -> DateTime<Utc> {
    let horizon = truncate_hour(now - Duration::days(i64::from(lookback_days)));
    truncate_hour(oldest).max(horizon)
}

/// The newest minute the live collector still owns at `now`: the last
/// completed minute, which the velocity tick records on its own.
pub fn live_minute(now: DateTime<Utc>) -> DateTime<Utc> {
    truncate_minute(now) - Duration::minutes(1)
}

/// Minutes of `hour` to check, newest first, stopping short of `live_minute`.
pub fn minutes_to_check(hour: DateTime<Utc>, live_minute: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    Bucket::hour(hour)
        .minutes()
        .rev()
        .filter(|m| *m < live_minute)
        .collect()
}

/// Minutes with every velocity measure present.
fn complete_minutes(coverage: &BTreeMap<DateTime<Utc>, usize>) -> BTreeSet<DateTime<Utc>> {
    coverage
        .iter()
        .filter(|(_, n)| **n >= VELOCITY_MEASURES.len())
        .map(|(m, _)| *m)
        .collect()
}

/// Worker that repairs missing velocity minutes.
pub struct BackfillEngine {
    velocity: Arc<VelocityCollector>,
    store: Arc<dyn StatStore>,
    clock: Arc<dyn Clock>,
    config: BackfillConfig,
}

impl BackfillEngine {
    pub fn new(
        velocity: Arc<VelocityCollector>,
        store: Arc<dyn StatStore>,
        clock: Arc<dyn Clock>,
        config: BackfillConfig,
    ) -> Self {
        Self {
            velocity,
            store,
            clock,
            config,
        }
    }

    /// Run one bounded repair pass. Never fails; store errors while scanning
    /// end the pass early, marker errors only skip that hour.
    pub async fn backfill_velocity(&self) -> BackfillReport {
        match self.scan().await {
            Ok(report) => {
                info!(
                    hours_scanned = report.hours_scanned,
                    hours_repaired = report.hours_repaired,
                    minutes_repaired = report.minutes_repaired,
                    hours_marked = report.hours_marked,
                    "Backfill pass complete"
                );
                report
            }
            Err(e) => {
                warn!(error = %e, "Backfill pass aborted");
                BackfillReport::default()
            }
        }
    }

    async fn scan(&self) -> Result<BackfillReport> {
        let mut report = BackfillReport::default();

        let Some(oldest) = self.store.oldest_starting(&VELOCITY_MEASURES).await? else {
            info!("No velocity history yet, nothing to backfill");
            return Ok(report);
        };

        let now = self.clock.now();
        let live = live_minute(now);
        let newest_hour = truncate_hour(now);
        let start = scan_start(now, oldest, self.config.lookback_days);

        let marked: BTreeSet<DateTime<Utc>> = self
            .store
            .coverage(
                &[Measure::VelocityBackfill],
                start,
                newest_hour + Duration::hours(1),
            )
            .await?
            .into_keys()
            .collect();

        debug!(
            from = %start,
            to = %newest_hour,
            marked = marked.len(),
            "Scanning velocity history"
        );

        let mut hour = newest_hour;
        while hour >= start {
            if report.hours_repaired >= self.config.max_hours_per_run {
                debug!(next_hour = %hour, "Repair budget spent, resuming next run");
                break;
            }
            if !marked.contains(&hour) {
                report.hours_scanned += 1;
                let repaired = self.repair_hour(hour, live).await?;
                if repaired > 0 {
                    report.hours_repaired += 1;
                    report.minutes_repaired += repaired;
                }
                if self.mark_if_complete(hour).await {
                    report.hours_marked += 1;
                }
            }
            hour -= Duration::hours(1);
        }

        Ok(report)
    }

    /// Re-record the incomplete minutes of `hour`, newest first. Returns how
    /// many minutes were handed to the collector.
    async fn repair_hour(
        &self,
        hour: DateTime<Utc>,
        live_minute: DateTime<Utc>,
    ) -> Result<usize> {
        let bucket = Bucket::hour(hour);
        let coverage = self
            .store
            .coverage(&VELOCITY_MEASURES, bucket.starting, bucket.ending)
            .await?;
        let complete = complete_minutes(&coverage);

        let mut repaired = 0;
        for minute in minutes_to_check(hour, live_minute) {
            if complete.contains(&minute) {
                continue;
            }
            debug!(minute = %minute, "Re-recording missing velocity minute");
            self.velocity.record_velocity(Some(minute)).await;
            metrics().backfill_minutes_repaired.inc();
            repaired += 1;
        }
        Ok(repaired)
    }

    /// Write the hour marker once all 60 minutes are complete. Store errors
    /// are logged and leave the hour unmarked for the next pass.
    async fn mark_if_complete(&self, hour: DateTime<Utc>) -> bool {
        let bucket = Bucket::hour(hour);
        let coverage = match self
            .store
            .coverage(&VELOCITY_MEASURES, bucket.starting, bucket.ending)
            .await
        {
            Ok(coverage) => coverage,
            Err(e) => {
                warn!(hour = %hour, error = %e, "Failed to read hour coverage, leaving unmarked");
                return false;
            }
        };
        let complete = complete_minutes(&coverage).len();
        if complete != MINUTES_PER_HOUR {
            debug!(hour = %hour, complete, "Hour still incomplete");
            return false;
        }

        let marker = StatRecord::new(Measure::VelocityBackfill, MINUTES_PER_HOUR as f64, bucket);
        match record_stat(&*self.store, &marker).await {
            WriteOutcome::Recorded => {
                metrics().backfill_hours_marked.inc();
                debug!(hour = %hour, "Hour marked complete");
                true
            }
            WriteOutcome::Conflict | WriteOutcome::Failed => false,
        }
    }
}

#[async_trait]
impl Job for BackfillEngine {
    fn kind(&self) -> JobKind {
        JobKind::Backfill
    }

    async fn run(&self) {
        metrics().backfill_runs.inc();
        self.backfill_velocity().await;
    }
}
