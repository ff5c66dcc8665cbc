//! Worker scheduler for background jobs.
//!
//! One ticker per job kind plus a trigger loop for on-demand runs. A run is
//! spawned on its own task; while it is in flight, further ticks and
//! triggers for the same kind are dropped.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use telemetry::metrics;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::job::{Job, JobKind};

/// Worker scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_velocity_interval")]
    pub velocity_interval_secs: u64,
    #[serde(default = "default_usage_interval")]
    pub usage_interval_secs: u64,
    #[serde(default = "default_backfill_interval")]
    pub backfill_interval_secs: u64,
    /// Period of the metrics summary log line; 0 disables it.
    #[serde(default = "default_metrics_log_interval")]
    pub metrics_log_interval_secs: u64,
}

fn default_velocity_interval() -> u64 {
    60
}

fn default_usage_interval() -> u64 {
    3600
}

fn default_backfill_interval() -> u64 {
    900
}

fn default_metrics_log_interval() -> u64 {
    300
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            velocity_interval_secs: default_velocity_interval(),
            usage_interval_secs: default_usage_interval(),
            backfill_interval_secs: default_backfill_interval(),
            metrics_log_interval_secs: default_metrics_log_interval(),
        }
    }
}

impl WorkerConfig {
    /// Tick period for `kind`. Never zero.
    pub fn interval(&self, kind: JobKind) -> Duration {
        let secs = match kind {
            JobKind::Velocity => self.velocity_interval_secs,
            JobKind::Usage => self.usage_interval_secs,
            JobKind::Backfill => self.backfill_interval_secs,
        };
        Duration::from_secs(secs.max(1))
    }
}

/// The three jobs the scheduler drives.
#[derive(Clone)]
pub struct Jobs {
    pub velocity: Arc<dyn Job>,
    pub usage: Arc<dyn Job>,
    pub backfill: Arc<dyn Job>,
}

impl Jobs {
    fn get(&self, kind: JobKind) -> Arc<dyn Job> {
        match kind {
            JobKind::Velocity => self.velocity.clone(),
            JobKind::Usage => self.usage.clone(),
            JobKind::Backfill => self.backfill.clone(),
        }
    }
}

/// Per-kind dispatch state.
struct JobSlot {
    job: Arc<dyn Job>,
    running: AtomicBool,
    coalesced: AtomicU64,
}

/// Clears the running flag when a run ends, including by panic.
struct RunningGuard(Arc<JobSlot>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::Release);
        metrics().running_jobs.dec();
    }
}

/// What a dispatch did.
#[derive(Debug)]
pub enum Dispatch {
    /// A new run was spawned.
    Started(JoinHandle<()>),
    /// A run of this kind was already in flight; nothing was spawned.
    Coalesced,
}

impl Dispatch {
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started(_))
    }
}

/// Background job scheduler.
pub struct WorkerScheduler {
    config: WorkerConfig,
    slots: [Arc<JobSlot>; 3],
    trigger_tx: mpsc::UnboundedSender<JobKind>,
    trigger_rx: Mutex<Option<mpsc::UnboundedReceiver<JobKind>>>,
    started: AtomicBool,
}

impl WorkerScheduler {
    pub fn new(config: WorkerConfig, jobs: Jobs) -> Self {
        let slots = JobKind::ALL.map(|kind| {
            Arc::new(JobSlot {
                job: jobs.get(kind),
                running: AtomicBool::new(false),
                coalesced: AtomicU64::new(0),
            })
        });
        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();

        Self {
            config,
            slots,
            trigger_tx,
            trigger_rx: Mutex::new(Some(trigger_rx)),
            started: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Handle for on-demand triggers.
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            trigger_tx: self.trigger_tx.clone(),
        }
    }

    /// Starts the tickers and the trigger loop. Calling it again is a no-op
    /// that returns no handles.
    pub fn start(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        if self.started.swap(true, Ordering::AcqRel) {
            warn!("Scheduler already started, ignoring");
            return Vec::new();
        }

        let mut handles = Vec::new();

        for kind in JobKind::ALL {
            let scheduler = self.clone();
            handles.push(tokio::spawn(async move {
                scheduler.run_ticker(kind).await;
            }));
        }

        if let Some(rx) = self.trigger_rx.lock().take() {
            let scheduler = self.clone();
            handles.push(tokio::spawn(async move {
                scheduler.run_trigger_loop(rx).await;
            }));
        }

        if self.config.metrics_log_interval_secs > 0 {
            let period = Duration::from_secs(self.config.metrics_log_interval_secs);
            handles.push(tokio::spawn(async move {
                run_metrics_log(period).await;
            }));
        }

        info!(
            velocity_secs = self.config.velocity_interval_secs,
            usage_secs = self.config.usage_interval_secs,
            backfill_secs = self.config.backfill_interval_secs,
            "Background workers started"
        );
        handles
    }

    /// Spawn a run of `kind` unless one is already in flight.
    pub fn dispatch(&self, kind: JobKind) -> Dispatch {
        let slot = self.slots[kind.index()].clone();

        if slot
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            slot.coalesced.fetch_add(1, Ordering::Relaxed);
            metrics().ticks_coalesced.inc();
            debug!(job = %kind, "Previous run still in flight, coalescing");
            return Dispatch::Coalesced;
        }

        metrics().running_jobs.inc();
        let guard = RunningGuard(slot.clone());
        let handle = tokio::spawn(async move {
            let _guard = guard;
            let start = Instant::now();
            debug!(job = %kind, "Job started");
            slot.job.run().await;
            let elapsed = start.elapsed().as_millis() as u64;
            metrics().job_latency_ms.observe(elapsed);
            debug!(job = %kind, latency_ms = elapsed, "Job finished");
        });
        Dispatch::Started(handle)
    }

    /// Whether a run of `kind` is in flight.
    pub fn is_running(&self, kind: JobKind) -> bool {
        self.slots[kind.index()].running.load(Ordering::Acquire)
    }

    /// Ticks and triggers of `kind` dropped because a run was in flight.
    pub fn coalesced(&self, kind: JobKind) -> u64 {
        self.slots[kind.index()].coalesced.load(Ordering::Relaxed)
    }

    async fn run_ticker(&self, kind: JobKind) {
        let mut ticker = interval(self.config.interval(kind));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            self.dispatch(kind);
        }
    }

    async fn run_trigger_loop(&self, mut rx: mpsc::UnboundedReceiver<JobKind>) {
        while let Some(kind) = rx.recv().await {
            info!(job = %kind, "Manual trigger");
            self.dispatch(kind);
        }
    }
}

async fn run_metrics_log(period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick fires immediately; there is nothing to report yet.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let s = metrics().snapshot();
        info!(
            velocity_runs = s.velocity_runs,
            usage_runs = s.usage_runs,
            backfill_runs = s.backfill_runs,
            ticks_coalesced = s.ticks_coalesced,
            stats_recorded = s.stats_recorded,
            stat_conflicts = s.stat_conflicts,
            stat_write_errors = s.stat_write_errors,
            source_errors = s.source_errors,
            backfill_minutes_repaired = s.backfill_minutes_repaired,
            "Metrics"
        );
    }
}

/// Cloneable trigger surface handed to the API.
#[derive(Clone)]
pub struct SchedulerHandle {
    trigger_tx: mpsc::UnboundedSender<JobKind>,
}

impl SchedulerHandle {
    /// Queue a one-shot run. Returns false if the scheduler is gone.
    pub fn trigger(&self, kind: JobKind) -> bool {
        self.trigger_tx.send(kind).is_ok()
    }

    pub fn trigger_event_job(&self) -> bool {
        self.trigger(JobKind::Velocity)
    }

    pub fn trigger_usage_job(&self) -> bool {
        self.trigger(JobKind::Usage)
    }

    pub fn trigger_event_backfill(&self) -> bool {
        self.trigger(JobKind::Backfill)
    }
}
