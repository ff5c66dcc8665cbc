//! Usage collector: daily snapshot of the enterprise roster.

use async_trait::async_trait;
use std::sync::Arc;
use telemetry::metrics;
use tracing::{info, warn};

use stat_store::StatStore;
use stats_core::{
    Bucket, Clock, EnterpriseUser, EventSource, Measure, SourceError, StatRecord, UserStatus,
};

use crate::job::{Job, JobKind};
use crate::record::{record_all, WriteTally};

/// Users requested per roster page.
pub const USERS_PAGE_SIZE: usize = 1000;

const BYTES_PER_GB: f64 = (1u64 << 30) as f64;

/// Aggregates over one roster listing.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct UsageSummary {
    pub active: usize,
    pub inactive: usize,
    /// Total storage consumed, in GiB.
    pub storage_used_gb: f64,
}

impl UsageSummary {
    pub fn from_users(users: &[EnterpriseUser]) -> Self {
        let active = users
            .iter()
            .filter(|u| u.status == UserStatus::Active)
            .count();
        let inactive = users
            .iter()
            .filter(|u| u.status == UserStatus::Inactive)
            .count();
        let bytes: u128 = users.iter().map(|u| u.space_used as u128).sum();

        Self {
            active,
            inactive,
            storage_used_gb: bytes as f64 / BYTES_PER_GB,
        }
    }

    pub fn records(&self, bucket: Bucket) -> Vec<StatRecord> {
        vec![
            StatRecord::new(Measure::ActiveUsers, self.active as f64, bucket),
            StatRecord::new(Measure::InactiveUsers, self.inactive as f64, bucket),
            StatRecord::new(Measure::StorageUsedGb, self.storage_used_gb, bucket),
        ]
    }
}

/// Outcome of one usage pass.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageReport {
    pub bucket: Bucket,
    pub users: usize,
    /// None when the roster came back empty and nothing was written.
    pub summary: Option<UsageSummary>,
    pub writes: WriteTally,
}

/// List the whole roster by offset, stopping once the reported total is reached.
pub async fn fetch_users(
    source: &dyn EventSource,
    page_size: usize,
) -> Result<Vec<EnterpriseUser>, SourceError> {
    let page_size = page_size.max(1);
    let mut users: Vec<EnterpriseUser> = Vec::new();

    loop {
        let page = source.enterprise_users(users.len(), page_size).await?;
        let total = page.total_count;
        let received = page.entries.len();
        users.extend(page.entries);

        if users.len() >= total {
            break;
        }
        if received == 0 {
            warn!(
                listed = users.len(),
                total, "Roster page came back empty before reaching the reported total"
            );
            break;
        }
    }

    metrics().users_fetched.inc_by(users.len() as u64);
    Ok(users)
}

/// Collector for the daily usage snapshot.
pub struct UsageCollector {
    source: Arc<dyn EventSource>,
    store: Arc<dyn StatStore>,
    clock: Arc<dyn Clock>,
    page_size: usize,
}

impl UsageCollector {
    pub fn new(
        source: Arc<dyn EventSource>,
        store: Arc<dyn StatStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            source,
            store,
            clock,
            page_size: USERS_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Record today's active/inactive/storage snapshot. Skipped when the
    /// roster cannot be listed.
    pub async fn record_usage(&self) -> UsageReport {
        let bucket = Bucket::day(self.clock.now());

        let users = match fetch_users(&*self.source, self.page_size).await {
            Ok(users) => users,
            Err(e) => {
                if e.is_not_configured() {
                    metrics().source_not_configured.inc();
                    warn!(error = %e, "Event source not configured, skipping usage snapshot");
                } else {
                    metrics().source_errors.inc();
                    warn!(error = %e, "Failed to list enterprise users, skipping usage snapshot");
                }
                Vec::new()
            }
        };

        if users.is_empty() {
            info!(day = %bucket.starting, "No users listed, nothing to record");
            return UsageReport {
                bucket,
                users: 0,
                summary: None,
                writes: WriteTally::default(),
            };
        }

        let summary = UsageSummary::from_users(&users);
        let writes = record_all(&*self.store, &summary.records(bucket)).await;

        info!(
            day = %bucket.starting,
            users = users.len(),
            active = summary.active,
            inactive = summary.inactive,
            storage_used_gb = summary.storage_used_gb,
            recorded = writes.recorded,
            conflicts = writes.conflicts,
            "Usage recorded"
        );

        UsageReport {
            bucket,
            users: users.len(),
            summary: Some(summary),
            writes,
        }
    }
}

#[async_trait]
impl Job for UsageCollector {
    fn kind(&self) -> JobKind {
        JobKind::Usage
    }

    async fn run(&self) {
        metrics().usage_runs.inc();
        self.record_usage().await;
    }
}
