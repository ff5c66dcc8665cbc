//! Mock implementations for testing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use stat_store::{MemoryStatStore, StatQuery, StatStore};
use stats_core::{
    DbErrorCode, EnterpriseEvent, EnterpriseUser, Error, EventPage, EventQuery, EventSource,
    Measure, Result as StoreResult, SourceError, StatRecord, UserPage,
};

/// Scripted event source that serves events and users from memory.
///
/// Implements the same `EventSource` trait as the real API client. Events
/// are filtered by type and `[created_after, created_before)`, and the
/// stream position is the offset into the filtered list, so paging behaves
/// like the real cursor. Every call is logged.
#[derive(Clone, Default)]
pub struct FakeEventSource {
    events: Arc<Mutex<Vec<EnterpriseEvent>>>,
    users: Arc<Mutex<Vec<EnterpriseUser>>>,
    /// Returned by every call while set.
    failure: Arc<Mutex<Option<SourceError>>>,
    /// Event calls (0-based) that fail with the paired error.
    failing_event_calls: Arc<Mutex<HashMap<usize, SourceError>>>,
    event_calls: Arc<Mutex<Vec<EventQuery>>>,
    user_calls: Arc<Mutex<Vec<(usize, usize)>>>,
}

impl FakeEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_events(&self, events: impl IntoIterator<Item = EnterpriseEvent>) {
        self.events.lock().extend(events);
    }

    pub fn set_users(&self, users: Vec<EnterpriseUser>) {
        *self.users.lock() = users;
    }

    /// Fail every call with `err` until cleared.
    pub fn fail_with(&self, err: SourceError) {
        *self.failure.lock() = Some(err);
    }

    pub fn clear_failure(&self) {
        *self.failure.lock() = None;
    }

    /// Fail only the `index`-th event call (0-based, counted over the source's lifetime).
    pub fn fail_event_call(&self, index: usize, err: SourceError) {
        self.failing_event_calls.lock().insert(index, err);
    }

    /// Every event query received, in order.
    pub fn event_calls(&self) -> Vec<EventQuery> {
        self.event_calls.lock().clone()
    }

    /// Windows whose collection started (first page of each fetch), in order.
    pub fn windows_queried(&self) -> Vec<DateTime<Utc>> {
        self.event_calls
            .lock()
            .iter()
            .filter(|q| q.stream_position == "0")
            .map(|q| q.created_after)
            .collect()
    }

    /// Every roster page request as `(offset, limit)`.
    pub fn user_calls(&self) -> Vec<(usize, usize)> {
        self.user_calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.event_calls.lock().clear();
        self.user_calls.lock().clear();
    }

    fn check_failure(&self) -> Result<(), SourceError> {
        match self.failure.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl EventSource for FakeEventSource {
    async fn enterprise_events(&self, query: &EventQuery) -> Result<EventPage, SourceError> {
        let index = {
            let mut calls = self.event_calls.lock();
            calls.push(query.clone());
            calls.len() - 1
        };
        if let Some(err) = self.failing_event_calls.lock().get(&index) {
            return Err(err.clone());
        }
        self.check_failure()?;

        let offset: usize = query
            .stream_position
            .parse()
            .map_err(|_| SourceError::Decode(format!("bad position {}", query.stream_position)))?;

        let matching: Vec<EnterpriseEvent> = self
            .events
            .lock()
            .iter()
            .filter(|e| query.event_types.iter().any(|t| *t == e.event_type))
            .filter(|e| {
                e.created_at.map_or(false, |t| {
                    t >= query.created_after && t < query.created_before
                })
            })
            .cloned()
            .collect();

        let entries: Vec<EnterpriseEvent> = matching
            .into_iter()
            .skip(offset)
            .take(query.limit)
            .collect();

        Ok(EventPage {
            chunk_size: entries.len(),
            next_stream_position: (offset + entries.len()).to_string(),
            entries,
        })
    }

    async fn enterprise_users(&self, offset: usize, limit: usize) -> Result<UserPage, SourceError> {
        self.user_calls.lock().push((offset, limit));
        self.check_failure()?;

        let users = self.users.lock();
        Ok(UserPage {
            entries: users.iter().skip(offset).take(limit).cloned().collect(),
            total_count: users.len(),
        })
    }
}

/// Stat store that delegates to a [`MemoryStatStore`] but fails chosen
/// `coverage` calls (0-based, in call order).
pub struct FlakyCoverageStore {
    inner: Arc<MemoryStatStore>,
    failing_calls: Mutex<HashSet<usize>>,
    coverage_calls: AtomicUsize,
}

impl FlakyCoverageStore {
    pub fn new(inner: Arc<MemoryStatStore>) -> Self {
        Self {
            inner,
            failing_calls: Mutex::new(HashSet::new()),
            coverage_calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_coverage_call(&self, index: usize) {
        self.failing_calls.lock().insert(index);
    }

    pub fn coverage_calls(&self) -> usize {
        self.coverage_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatStore for FlakyCoverageStore {
    async fn insert(&self, record: &StatRecord) -> StoreResult<()> {
        self.inner.insert(record).await
    }

    async fn oldest_starting(&self, measures: &[Measure]) -> StoreResult<Option<DateTime<Utc>>> {
        self.inner.oldest_starting(measures).await
    }

    async fn coverage(
        &self,
        measures: &[Measure],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<BTreeMap<DateTime<Utc>, usize>> {
        let call = self.coverage_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_calls.lock().contains(&call) {
            return Err(Error::database(
                DbErrorCode::QueryFailed,
                format!("coverage call {} failed", call),
            ));
        }
        self.inner.coverage(measures, from, to).await
    }

    async fn history(&self, query: &StatQuery) -> StoreResult<Vec<StatRecord>> {
        self.inner.history(query).await
    }

    async fn count(&self, measure: Measure) -> StoreResult<u64> {
        self.inner.count(measure).await
    }
}
