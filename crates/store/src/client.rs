//! ClickHouse client wrapper.

use crate::config::ClickHouseConfig;
use clickhouse::Client;
use stats_core::{Error, Result};
use tracing::info;

/// ClickHouse client wrapper bound to one database.
#[derive(Clone)]
pub struct ClickHouseClient {
    inner: Client,
    config: ClickHouseConfig,
}

impl ClickHouseClient {
    /// Creates a new ClickHouse client.
    pub fn new(config: ClickHouseConfig) -> Result<Self> {
        for (what, name) in [("database", &config.database), ("table", &config.table)] {
            if !is_identifier(name) {
                return Err(Error::validation(format!("invalid {} name: {}", what, name)));
            }
        }

        let mut client = Client::default()
            .with_url(&config.url)
            .with_database(&config.database);

        if let Some(ref user) = config.username {
            client = client.with_user(user);
        }

        if let Some(ref pass) = config.password {
            client = client.with_password(pass);
        }

        info!(
            url = %config.url,
            database = %config.database,
            table = %config.table,
            "Created ClickHouse client"
        );

        Ok(Self {
            inner: client,
            config,
        })
    }

    /// Returns the inner clickhouse client.
    pub fn inner(&self) -> &Client {
        &self.inner
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClickHouseConfig {
        &self.config
    }

    /// Name of the database (validated identifier).
    pub fn database(&self) -> &str {
        &self.config.database
    }

    /// Name of the stats table (validated identifier, safe to splice into SQL).
    pub fn table(&self) -> &str {
        &self.config.table
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit())
}
