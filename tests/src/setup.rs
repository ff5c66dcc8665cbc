//! Common test setup functions.

use api::{router, state::AppState};
use axum::Router;
use chrono::{DateTime, Utc};
use stat_store::{MemoryStatStore, StatStore};
use stats_core::{Clock, EventSource, ManualClock};
use std::sync::Arc;
use worker::{
    BackfillConfig, BackfillEngine, Jobs, UsageCollector, VelocityCollector, WorkerConfig,
    WorkerScheduler,
};

use crate::mocks::FakeEventSource;

/// Test context with a scripted source, in-memory store, and manual clock.
///
/// Exercises the production collectors, backfill engine, scheduler, and
/// router. The scheduler is built but not started; tests that need the
/// tickers call [`TestContext::start_scheduler`].
pub struct TestContext {
    pub source: Arc<FakeEventSource>,
    pub store: Arc<MemoryStatStore>,
    pub clock: Arc<ManualClock>,
    pub velocity: Arc<VelocityCollector>,
    pub usage: Arc<UsageCollector>,
    pub backfill: Arc<BackfillEngine>,
    pub scheduler: Arc<WorkerScheduler>,
    pub router: Router,
}

impl TestContext {
    /// Create a context whose clock reads `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::with_options(now, BackfillConfig::default(), None)
    }

    /// Create a context with explicit backfill limits and event page size.
    pub fn with_options(
        now: DateTime<Utc>,
        backfill_config: BackfillConfig,
        page_size: Option<usize>,
    ) -> Self {
        let source = Arc::new(FakeEventSource::new());
        let store = Arc::new(MemoryStatStore::new());
        let clock = Arc::new(ManualClock::new(now));

        let dyn_source: Arc<dyn EventSource> = source.clone();
        let dyn_store: Arc<dyn StatStore> = store.clone();
        let dyn_clock: Arc<dyn Clock> = clock.clone();

        let mut velocity = VelocityCollector::new(
            dyn_source.clone(),
            dyn_store.clone(),
            dyn_clock.clone(),
        );
        if let Some(page_size) = page_size {
            velocity = velocity.with_page_size(page_size);
        }
        let velocity = Arc::new(velocity);
        let usage = Arc::new(UsageCollector::new(
            dyn_source,
            dyn_store.clone(),
            dyn_clock.clone(),
        ));
        let backfill = Arc::new(BackfillEngine::new(
            velocity.clone(),
            dyn_store.clone(),
            dyn_clock,
            backfill_config,
        ));

        let scheduler = Arc::new(WorkerScheduler::new(
            WorkerConfig::default(),
            Jobs {
                velocity: velocity.clone(),
                usage: usage.clone(),
                backfill: backfill.clone(),
            },
        ));

        let state = AppState::new(dyn_store, scheduler.handle());
        let router = router(state);

        Self {
            source,
            store,
            clock,
            velocity,
            usage,
            backfill,
            scheduler,
            router,
        }
    }

    /// Start the scheduler's tickers and trigger loop.
    pub fn start_scheduler(&self) -> Vec<tokio::task::JoinHandle<()>> {
        self.scheduler.clone().start()
    }
}
