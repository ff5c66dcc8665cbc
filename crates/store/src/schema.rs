//! ClickHouse table schema for stat records.
//!
//! - LowCardinality measure name (a handful of distinct values)
//! - DateTime64(3, 'UTC') bucket bounds, bound and read as epoch millis
//! - ReplacingMergeTree keyed on (measure, starting): the sort key is the
//!   uniqueness key, so a duplicate that slips past the write gate from
//!   another process collapses on merge

/// SQL for creating the database.
pub fn create_database(database: &str) -> String {
    format!("CREATE DATABASE IF NOT EXISTS {database}")
}

/// SQL for creating the stats table.
pub fn create_stats_table(table: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {table} (
    measure LowCardinality(String),
    value Float64,
    starting DateTime64(3, 'UTC'),
    ending DateTime64(3, 'UTC'),
    recorded_at DateTime DEFAULT now()
)
ENGINE = ReplacingMergeTree
PARTITION BY toYYYYMM(starting)
ORDER BY (measure, starting)
SETTINGS index_granularity = 8192
"#
    )
}

/// All DDL statements, in execution order.
pub fn all_tables(table: &str) -> Vec<String> {
    vec![create_stats_table(table)]
}
