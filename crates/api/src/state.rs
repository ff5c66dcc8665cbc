//! Application state shared across handlers.

use stat_store::StatStore;
use std::sync::Arc;
use worker::SchedulerHandle;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Stat store (ClickHouse in production, in-memory in tests)
    pub store: Arc<dyn StatStore>,
    /// Trigger surface of the background scheduler
    pub scheduler: SchedulerHandle,
}

impl AppState {
    pub fn new(store: Arc<dyn StatStore>, scheduler: SchedulerHandle) -> Self {
        Self { store, scheduler }
    }
}
