//! Scheduler tests under paused tokio time.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use worker::{Job, JobKind, Jobs, WorkerConfig, WorkerScheduler};

/// Job that sleeps and records how many copies of itself ran at once.
struct ProbeJob {
    kind: JobKind,
    duration: Duration,
    runs: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ProbeJob {
    fn new(kind: JobKind, duration: Duration) -> Arc<Self> {
        Arc::new(Self {
            kind,
            duration,
            runs: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        })
    }

    fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Job for ProbeJob {
    fn kind(&self) -> JobKind {
        self.kind
    }

    async fn run(&self) {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.duration).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Probes {
    velocity: Arc<ProbeJob>,
    usage: Arc<ProbeJob>,
    backfill: Arc<ProbeJob>,
}

fn scheduler(velocity_run: Duration) -> (Arc<WorkerScheduler>, Probes) {
    let probes = Probes {
        velocity: ProbeJob::new(JobKind::Velocity, velocity_run),
        usage: ProbeJob::new(JobKind::Usage, Duration::from_secs(1)),
        backfill: ProbeJob::new(JobKind::Backfill, Duration::from_secs(1)),
    };
    let config = WorkerConfig {
        metrics_log_interval_secs: 0,
        ..WorkerConfig::default()
    };
    let scheduler = Arc::new(WorkerScheduler::new(
        config,
        Jobs {
            velocity: probes.velocity.clone(),
            usage: probes.usage.clone(),
            backfill: probes.backfill.clone(),
        },
    ));
    (scheduler, probes)
}

/// Every job runs once as soon as the scheduler starts.
#[tokio::test(start_paused = true)]
async fn test_start_runs_each_job_once() {
    let (scheduler, probes) = scheduler(Duration::from_secs(1));
    let handles = scheduler.clone().start();

    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(probes.velocity.runs(), 1);
    assert_eq!(probes.usage.runs(), 1);
    assert_eq!(probes.backfill.runs(), 1);

    for handle in handles {
        handle.abort();
    }
}

/// A velocity run longer than its interval swallows the ticks that land
/// while it runs; runs never overlap.
#[tokio::test(start_paused = true)]
async fn test_slow_job_coalesces_ticks() {
    let (scheduler, probes) = scheduler(Duration::from_secs(150));
    let handles = scheduler.clone().start();

    // Runs start at t=0 and t=180; ticks at t=60 and t=120 are dropped.
    tokio::time::sleep(Duration::from_secs(200)).await;

    assert_eq!(probes.velocity.max_active(), 1);
    assert_eq!(probes.velocity.runs(), 2);
    assert_eq!(scheduler.coalesced(JobKind::Velocity), 2);
    assert_eq!(scheduler.coalesced(JobKind::Usage), 0);

    for handle in handles {
        handle.abort();
    }
}

/// A manual trigger starts a run; one landing mid-run folds into it.
#[tokio::test(start_paused = true)]
async fn test_manual_trigger_and_coalescing() {
    let (scheduler, probes) = scheduler(Duration::from_secs(1));
    let trigger = scheduler.handle();
    let handles = scheduler.clone().start();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(probes.usage.runs(), 1);

    assert!(trigger.trigger_usage_job());
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(scheduler.is_running(JobKind::Usage));

    // Lands while the triggered run is still sleeping.
    assert!(trigger.trigger_usage_job());
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(probes.usage.runs(), 2);
    assert_eq!(probes.usage.max_active(), 1);
    assert_eq!(scheduler.coalesced(JobKind::Usage), 1);

    assert!(trigger.trigger_event_backfill());
    assert!(trigger.trigger_event_job());
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(probes.backfill.runs(), 2);
    assert_eq!(probes.velocity.runs(), 2);

    for handle in handles {
        handle.abort();
    }
}

/// Starting twice does not double the tickers.
#[tokio::test(start_paused = true)]
async fn test_start_is_idempotent() {
    let (scheduler, probes) = scheduler(Duration::from_secs(1));
    let handles = scheduler.clone().start();
    assert!(scheduler.clone().start().is_empty());

    tokio::time::sleep(Duration::from_secs(61)).await;

    // t=0 and t=60 only.
    assert_eq!(probes.velocity.runs(), 2);

    for handle in handles {
        handle.abort();
    }
}
