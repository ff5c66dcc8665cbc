//! In-memory stat store.
//!
//! Used by tests and by `store = "memory"` for local runs without ClickHouse.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use stats_core::{DbErrorCode, Error, Measure, Result, StatRecord};

use crate::store::{StatQuery, StatStore};

/// Stat store backed by an ordered map keyed like the durable table.
#[derive(Debug, Default)]
pub struct MemoryStatStore {
    rows: RwLock<BTreeMap<(Measure, DateTime<Utc>), StatRecord>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    rejected: AtomicU64,
}

impl MemoryStatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed records without going through the conflict check.
    pub fn with_records(records: impl IntoIterator<Item = StatRecord>) -> Self {
        let store = Self::new();
        {
            let mut rows = store.rows.write();
            for record in records {
                rows.insert((record.measure, record.starting), record);
            }
        }
        store
    }

    /// Make every insert fail with a backend error (not a conflict).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every read fail with a backend error.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Inserts rejected as conflicts so far.
    pub fn conflicts(&self) -> u64 {
        self.rejected.load(Ordering::SeqCst)
    }

    /// Copy of every stored record, ordered by (measure, starting).
    pub fn records(&self) -> Vec<StatRecord> {
        self.rows.read().values().cloned().collect()
    }

    pub fn get(&self, measure: Measure, starting: DateTime<Utc>) -> Option<StatRecord> {
        self.rows.read().get(&(measure, starting)).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    fn check_reads(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::database(
                DbErrorCode::QueryFailed,
                "memory store reads disabled",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl StatStore for MemoryStatStore {
    async fn insert(&self, record: &StatRecord) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::database(
                DbErrorCode::StoreFailed,
                "memory store writes disabled",
            ));
        }

        let mut rows = self.rows.write();
        let key = (record.measure, record.starting);
        if rows.contains_key(&key) {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(Error::conflict(record.measure.as_str(), record.starting));
        }
        rows.insert(key, record.clone());
        Ok(())
    }

    async fn oldest_starting(&self, measures: &[Measure]) -> Result<Option<DateTime<Utc>>> {
        self.check_reads()?;
        let rows = self.rows.read();
        Ok(rows
            .keys()
            .filter(|(m, _)| measures.contains(m))
            .map(|(_, starting)| *starting)
            .min())
    }

    async fn coverage(
        &self,
        measures: &[Measure],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<BTreeMap<DateTime<Utc>, usize>> {
        self.check_reads()?;
        let mut coverage = BTreeMap::new();
        if from >= to {
            return Ok(coverage);
        }

        let wanted: HashSet<Measure> = measures.iter().copied().collect();
        let rows = self.rows.read();
        for measure in wanted {
            for ((_, starting), _) in rows.range((measure, from)..(measure, to)) {
                *coverage.entry(*starting).or_insert(0) += 1;
            }
        }
        Ok(coverage)
    }

    async fn history(&self, query: &StatQuery) -> Result<Vec<StatRecord>> {
        self.check_reads()?;
        let rows = self.rows.read();
        Ok(rows
            .values()
            .filter(|r| query.matches(r))
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn count(&self, measure: Measure) -> Result<u64> {
        self.check_reads()?;
        Ok(self.rows.read().keys().filter(|(m, _)| *m == measure).count() as u64)
    }
}
