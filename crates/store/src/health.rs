//! ClickHouse health checks.

use crate::client::ClickHouseClient;
use stats_core::{DbErrorCode, Error, Result};
use tracing::{debug, error};

/// Check ClickHouse connection health.
pub async fn check_connection(client: &ClickHouseClient) -> bool {
    match client.inner().query("SELECT 1").fetch_one::<u8>().await {
        Ok(_) => {
            debug!("ClickHouse connection healthy");
            true
        }
        Err(e) => {
            error!("ClickHouse health check failed: {}", e);
            false
        }
    }
}

/// Create the database and stats table if they do not exist.
pub async fn init_schema(client: &ClickHouseClient) -> Result<()> {
    use crate::schema::{all_tables, create_database};

    // The configured database may not exist yet; issue its DDL from `default`.
    client
        .inner()
        .clone()
        .with_database("default")
        .query(&create_database(client.database()))
        .execute()
        .await
        .map_err(|e| {
            Error::database(
                DbErrorCode::StoreFailed,
                format!("Failed to create database: {}", e),
            )
        })?;

    for ddl in all_tables(client.table()) {
        client.inner().query(&ddl).execute().await.map_err(|e| {
            Error::database(
                DbErrorCode::StoreFailed,
                format!("Failed to execute DDL: {}", e),
            )
        })?;
    }

    debug!(table = client.table(), "ClickHouse schema initialized");
    Ok(())
}
