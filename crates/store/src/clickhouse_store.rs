//! ClickHouse-backed stat store.
//!
//! ClickHouse has no unique constraints, so the `(measure, starting)` rule is
//! enforced on the write path: the existence probe and the insert run under
//! one write gate. All writers live in this process; the table's replacing
//! engine is the backstop for anything else.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clickhouse::Row;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use telemetry::metrics;
use tokio::sync::Mutex;
use tracing::debug;

use stats_core::{DbErrorCode, Error, Measure, Result, StatRecord};

use crate::client::ClickHouseClient;
use crate::store::{StatQuery, StatStore};

/// Row layout of the stats table. Bucket bounds are epoch milliseconds,
/// the RowBinary encoding of DateTime64(3).
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
struct StatRow {
    measure: String,
    value: f64,
    starting: i64,
    ending: i64,
}

impl From<&StatRecord> for StatRow {
    fn from(record: &StatRecord) -> Self {
        Self {
            measure: record.measure.as_str().to_string(),
            value: record.value,
            starting: record.starting.timestamp_millis(),
            ending: record.ending.timestamp_millis(),
        }
    }
}

impl TryFrom<StatRow> for StatRecord {
    type Error = Error;

    fn try_from(row: StatRow) -> Result<Self> {
        Ok(Self {
            measure: row.measure.parse()?,
            value: row.value,
            starting: from_millis(row.starting)?,
            ending: from_millis(row.ending)?,
        })
    }
}

#[derive(Debug, Row, Deserialize)]
struct OldestRow {
    total: u64,
    oldest: i64,
}

#[derive(Debug, Row, Deserialize)]
struct CoverageRow {
    starting: i64,
    measures: u64,
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| Error::internal(format!("timestamp out of range: {}", ms)))
}

fn query_error(e: clickhouse::error::Error) -> Error {
    Error::database(DbErrorCode::QueryFailed, format!("Query error: {}", e))
}

fn store_error(stage: &str, e: clickhouse::error::Error) -> Error {
    Error::database(DbErrorCode::StoreFailed, format!("{} error: {}", stage, e))
}

/// `IN (...)` list of measure names. Names come from the closed enum, never user input.
fn measure_list(measures: &[Measure]) -> String {
    measures
        .iter()
        .map(|m| format!("'{}'", m.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Stat store over a ClickHouse table.
pub struct ClickHouseStatStore {
    client: ClickHouseClient,
    write_gate: Mutex<()>,
}

impl ClickHouseStatStore {
    pub fn new(client: ClickHouseClient) -> Self {
        Self {
            client,
            write_gate: Mutex::new(()),
        }
    }

    pub fn client(&self) -> &ClickHouseClient {
        &self.client
    }

    async fn exists(&self, record: &StatRecord) -> Result<bool> {
        let sql = format!(
            "SELECT count() FROM {} WHERE measure = ? AND starting = fromUnixTimestamp64Milli(toInt64(?))",
            self.client.table()
        );
        let count: u64 = self
            .client
            .inner()
            .query(&sql)
            .bind(record.measure.as_str())
            .bind(record.starting.timestamp_millis())
            .fetch_one()
            .await
            .map_err(query_error)?;
        Ok(count > 0)
    }
}

#[async_trait]
impl StatStore for ClickHouseStatStore {
    async fn insert(&self, record: &StatRecord) -> Result<()> {
        let start = Instant::now();
        let _gate = self.write_gate.lock().await;

        if self.exists(record).await? {
            return Err(Error::conflict(record.measure.as_str(), record.starting));
        }

        let mut insert = self
            .client
            .inner()
            .insert::<StatRow>(self.client.table())
            .map_err(|e| store_error("Insert", e))?;

        // Dropping `insert` without `end()` abandons the row.
        insert
            .write(&StatRow::from(record))
            .await
            .map_err(|e| store_error("Write", e))?;

        insert.end().await.map_err(|e| store_error("End", e))?;

        let elapsed = start.elapsed().as_millis() as u64;
        metrics().store_latency_ms.observe(elapsed);
        debug!(
            measure = %record.measure,
            starting = %record.starting,
            value = record.value,
            latency_ms = elapsed,
            "Inserted stat"
        );
        Ok(())
    }

    async fn oldest_starting(&self, measures: &[Measure]) -> Result<Option<DateTime<Utc>>> {
        if measures.is_empty() {
            return Ok(None);
        }
        let sql = format!(
            "SELECT count() AS total, min(starting) AS oldest FROM {} WHERE measure IN ({})",
            self.client.table(),
            measure_list(measures)
        );
        let row: OldestRow = self
            .client
            .inner()
            .query(&sql)
            .fetch_one()
            .await
            .map_err(query_error)?;

        if row.total == 0 {
            return Ok(None);
        }
        from_millis(row.oldest).map(Some)
    }

    async fn coverage(
        &self,
        measures: &[Measure],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<BTreeMap<DateTime<Utc>, usize>> {
        if measures.is_empty() || from >= to {
            return Ok(BTreeMap::new());
        }
        let sql = format!(
            r#"
            SELECT starting, uniqExact(measure) AS measures
            FROM {}
            WHERE measure IN ({})
              AND starting >= fromUnixTimestamp64Milli(toInt64(?))
              AND starting < fromUnixTimestamp64Milli(toInt64(?))
            GROUP BY starting
            ORDER BY starting
            "#,
            self.client.table(),
            measure_list(measures)
        );
        let rows: Vec<CoverageRow> = self
            .client
            .inner()
            .query(&sql)
            .bind(from.timestamp_millis())
            .bind(to.timestamp_millis())
            .fetch_all()
            .await
            .map_err(query_error)?;

        rows.into_iter()
            .map(|row| Ok((from_millis(row.starting)?, row.measures as usize)))
            .collect()
    }

    async fn history(&self, query: &StatQuery) -> Result<Vec<StatRecord>> {
        let mut sql = format!(
            "SELECT measure, value, starting, ending FROM {} FINAL WHERE measure = ?",
            self.client.table()
        );
        if query.since.is_some() {
            sql.push_str(" AND starting >= fromUnixTimestamp64Milli(toInt64(?))");
        }
        if query.until.is_some() {
            sql.push_str(" AND starting < fromUnixTimestamp64Milli(toInt64(?))");
        }
        sql.push_str(" ORDER BY starting LIMIT ?");

        let mut q = self.client.inner().query(&sql).bind(query.measure.as_str());
        if let Some(since) = query.since {
            q = q.bind(since.timestamp_millis());
        }
        if let Some(until) = query.until {
            q = q.bind(until.timestamp_millis());
        }
        let rows: Vec<StatRow> = q
            .bind(query.limit as u64)
            .fetch_all()
            .await
            .map_err(query_error)?;

        rows.into_iter().map(StatRecord::try_from).collect()
    }

    async fn count(&self, measure: Measure) -> Result<u64> {
        let sql = format!(
            "SELECT count() FROM {} FINAL WHERE measure = ?",
            self.client.table()
        );
        self.client
            .inner()
            .query(&sql)
            .bind(measure.as_str())
            .fetch_one()
            .await
            .map_err(query_error)
    }
}
