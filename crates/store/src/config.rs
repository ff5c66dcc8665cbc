//! Stat store configuration.

use serde::{Deserialize, Serialize};

/// Which backend holds the stats table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Clickhouse,
    /// Process-local; everything is lost on restart.
    Memory,
}

/// ClickHouse client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickHouseConfig {
    /// ClickHouse HTTP URL
    pub url: String,
    /// Database name
    #[serde(default = "default_database")]
    pub database: String,
    /// Username (optional)
    pub username: Option<String>,
    /// Password (optional)
    pub password: Option<String>,
    /// Stats table name
    #[serde(default = "default_table")]
    pub table: String,
}

fn default_database() -> String {
    "box_stats".to_string()
}

fn default_table() -> String {
    "stats".to_string()
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".to_string(),
            database: default_database(),
            username: None,
            password: None,
            table: default_table(),
        }
    }
}
