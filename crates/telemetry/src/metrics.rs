//! Internal metrics collection.
//!
//! Process-local counters for the collectors, read through `snapshot()`
//! by the health endpoint and the periodic metrics log line.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) -> u64 {
        self.0.swap(0, Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Histogram for latency tracking.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 5s, 10s
    buckets: [AtomicU64; 11],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 11] = [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000, 10000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        for (i, &bound) in Self::BUCKET_BOUNDS.iter().enumerate() {
            if ms <= bound {
                self.buckets[i].fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        // Value exceeds all buckets, add to last
        self.buckets[10].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }

    /// Returns bucket counts.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Collected metrics for the usage stats collector.
#[derive(Debug, Default)]
pub struct Metrics {
    // Job runs
    pub velocity_runs: Counter,
    pub usage_runs: Counter,
    pub backfill_runs: Counter,
    pub ticks_coalesced: Counter,

    // Event source
    pub events_fetched: Counter,
    pub pages_fetched: Counter,
    pub users_fetched: Counter,
    pub source_errors: Counter,
    pub source_not_configured: Counter,

    // Stat store
    pub stats_recorded: Counter,
    pub stat_conflicts: Counter,
    pub stat_write_errors: Counter,

    // Backfill
    pub backfill_minutes_repaired: Counter,
    pub backfill_hours_marked: Counter,

    // Latency histograms
    pub source_latency_ms: Histogram,
    pub store_latency_ms: Histogram,
    pub job_latency_ms: Histogram,

    // Gauges
    pub running_jobs: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub velocity_runs: u64,
    pub usage_runs: u64,
    pub backfill_runs: u64,
    pub ticks_coalesced: u64,
    pub events_fetched: u64,
    pub pages_fetched: u64,
    pub users_fetched: u64,
    pub source_errors: u64,
    pub source_not_configured: u64,
    pub stats_recorded: u64,
    pub stat_conflicts: u64,
    pub stat_write_errors: u64,
    pub backfill_minutes_repaired: u64,
    pub backfill_hours_marked: u64,
    pub source_latency_mean_ms: f64,
    pub store_latency_mean_ms: f64,
    pub job_latency_mean_ms: f64,
    pub running_jobs: u64,
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            velocity_runs: self.velocity_runs.get(),
            usage_runs: self.usage_runs.get(),
            backfill_runs: self.backfill_runs.get(),
            ticks_coalesced: self.ticks_coalesced.get(),
            events_fetched: self.events_fetched.get(),
            pages_fetched: self.pages_fetched.get(),
            users_fetched: self.users_fetched.get(),
            source_errors: self.source_errors.get(),
            source_not_configured: self.source_not_configured.get(),
            stats_recorded: self.stats_recorded.get(),
            stat_conflicts: self.stat_conflicts.get(),
            stat_write_errors: self.stat_write_errors.get(),
            backfill_minutes_repaired: self.backfill_minutes_repaired.get(),
            backfill_hours_marked: self.backfill_hours_marked.get(),
            source_latency_mean_ms: self.source_latency_ms.mean(),
            store_latency_mean_ms: self.store_latency_ms.mean(),
            job_latency_mean_ms: self.job_latency_ms.mean(),
            running_jobs: self.running_jobs.get(),
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
