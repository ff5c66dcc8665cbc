//! The stat store contract shared by every backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use stats_core::{Measure, Result, StatRecord};

/// Default row cap for history reads.
pub const DEFAULT_HISTORY_LIMIT: usize = 10_080; // one week of minutes

/// Filter for reading one measure's series.
#[derive(Debug, Clone, PartialEq)]
pub struct StatQuery {
    pub measure: Measure,
    /// Inclusive lower bound on `starting`.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `starting`.
    pub until: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl StatQuery {
    pub fn new(measure: Measure) -> Self {
        Self {
            measure,
            since: None,
            until: None,
            limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub(crate) fn matches(&self, record: &StatRecord) -> bool {
        record.measure == self.measure
            && self.since.map_or(true, |s| record.starting >= s)
            && self.until.map_or(true, |u| record.starting < u)
    }
}

/// Durable table of time-bucketed measurements, unique per `(measure, starting)`.
///
/// Every write is a single row committed on its own. A write that would
/// duplicate an existing pair fails with [`stats_core::Error::Conflict`] and
/// leaves the stored row untouched.
#[async_trait]
pub trait StatStore: Send + Sync {
    /// Insert one record.
    async fn insert(&self, record: &StatRecord) -> Result<()>;

    /// Oldest bucket start recorded for any of `measures`.
    async fn oldest_starting(&self, measures: &[Measure]) -> Result<Option<DateTime<Utc>>>;

    /// For each bucket start in `[from, to)`, how many distinct `measures` are recorded.
    ///
    /// Bucket starts with no record are absent from the map.
    async fn coverage(
        &self,
        measures: &[Measure],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<BTreeMap<DateTime<Utc>, usize>>;

    /// One measure's series ordered by `starting`, oldest first.
    async fn history(&self, query: &StatQuery) -> Result<Vec<StatRecord>>;

    /// Number of records for a measure.
    async fn count(&self, measure: Measure) -> Result<u64>;
}
