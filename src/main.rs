//! Enterprise Usage Stats Collector
//!
//! Periodically samples an enterprise event stream and user roster:
//! - Per-minute velocity counters by event type plus distinct actors
//! - Daily active/inactive user and storage snapshot
//! - Backfill of missing velocity minutes within a bounded lookback
//! - Thin HTTP surface for manual triggers, history reads, and health

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};

use api::{router, AppState};
use box_client::{BoxClient, BoxConfig};
use stat_store::{
    ClickHouseClient, ClickHouseConfig, ClickHouseStatStore, MemoryStatStore, StatStore,
    StoreBackend,
};
use stats_core::{Clock, EventSource, SystemClock};
use telemetry::{health, init_tracing_from_env};
use worker::{
    BackfillConfig, BackfillEngine, Jobs, UsageCollector, VelocityCollector, WorkerConfig,
    WorkerScheduler,
};

const ENV_PREFIX: &str = "BOXSTATS";

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,

    /// Stat store backend
    #[serde(default)]
    store: StoreBackend,

    #[serde(default)]
    clickhouse: ClickHouseConfig,

    #[serde(default, rename = "box")]
    box_api: BoxConfig,

    #[serde(default)]
    worker: WorkerConfig,

    #[serde(default)]
    backfill: BackfillConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            store: StoreBackend::default(),
            clickhouse: ClickHouseConfig::default(),
            box_api: BoxConfig::default(),
            worker: WorkerConfig::default(),
            backfill: BackfillConfig::default(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing_from_env();

    info!("Starting Box Usage Stats v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;

    let store = build_store(&config).await?;

    let source = Arc::new(
        BoxClient::new(&config.box_api).context("Failed to create enterprise API client")?,
    );
    if source.is_configured() {
        info!(base_url = %config.box_api.base_url, "Enterprise API client configured");
    } else {
        health().event_source.set_unhealthy("No access token");
        warn!("No enterprise access token; collectors will skip until one is installed");
    }
    let source: Arc<dyn EventSource> = source;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let velocity = Arc::new(VelocityCollector::new(
        source.clone(),
        store.clone(),
        clock.clone(),
    ));
    let usage = Arc::new(UsageCollector::new(source, store.clone(), clock.clone()));
    let backfill = Arc::new(BackfillEngine::new(
        velocity.clone(),
        store.clone(),
        clock,
        config.backfill,
    ));

    let scheduler = Arc::new(WorkerScheduler::new(
        config.worker.clone(),
        Jobs {
            velocity,
            usage,
            backfill,
        },
    ));
    let worker_handles = scheduler.clone().start();

    let state = AppState::new(store, scheduler.handle());
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid server address")?;

    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down...");

    // In-flight runs are abandoned; each stat row is its own commit and
    // backfill repairs any minute cut short.
    for handle in worker_handles {
        handle.abort();
    }

    info!("Shutdown complete");
    Ok(())
}

/// Open the configured stat store and record its health.
async fn build_store(config: &Config) -> Result<Arc<dyn StatStore>> {
    match config.store {
        StoreBackend::Memory => {
            warn!("Using in-memory stat store; stats are lost on restart");
            health().store.set_healthy();
            Ok(Arc::new(MemoryStatStore::new()))
        }
        StoreBackend::Clickhouse => {
            let client = ClickHouseClient::new(config.clickhouse.clone())
                .context("Failed to create ClickHouse client")?;

            if let Err(e) = stat_store::health::init_schema(&client).await {
                error!("Failed to initialize ClickHouse schema: {}", e);
                // Continue anyway - schema might already exist
            }

            if stat_store::health::check_connection(&client).await {
                health().store.set_healthy();
                info!("ClickHouse connection: healthy");
            } else {
                health().store.set_unhealthy("Connection failed");
                error!("ClickHouse connection: unhealthy");
            }

            Ok(Arc::new(ClickHouseStatStore::new(client)))
        }
    }
}

/// Load configuration from defaults, an optional file, and the environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        .add_source(config::Config::try_from(&Config::default())?)
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix(ENV_PREFIX)
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // Nested keys with underscores do not survive the `__` split; read them directly.
    let var = |name: &str| std::env::var(format!("{}_{}", ENV_PREFIX, name)).ok();

    if let Some(url) = var("CLICKHOUSE_URL") {
        config.clickhouse.url = url;
    }
    if let Some(database) = var("CLICKHOUSE_DATABASE") {
        config.clickhouse.database = database;
    }
    if let Some(username) = var("CLICKHOUSE_USERNAME") {
        config.clickhouse.username = Some(username);
    }
    if let Some(password) = var("CLICKHOUSE_PASSWORD") {
        config.clickhouse.password = Some(password);
    }
    if let Some(base_url) = var("BOX_BASE_URL") {
        config.box_api.base_url = base_url;
    }
    if let Some(token) = var("BOX_ACCESS_TOKEN") {
        config.box_api.access_token = Some(token);
    }
    if let Some(days) = var("BACKFILL_LOOKBACK_DAYS") {
        config.backfill.lookback_days = days
            .parse()
            .context("BOXSTATS_BACKFILL_LOOKBACK_DAYS must be a number of days")?;
    }
    if let Some(hours) = var("BACKFILL_MAX_HOURS_PER_RUN") {
        config.backfill.max_hours_per_run = hours
            .parse()
            .context("BOXSTATS_BACKFILL_MAX_HOURS_PER_RUN must be a number")?;
    }

    info!(
        store = ?config.store,
        velocity_secs = config.worker.velocity_interval_secs,
        usage_secs = config.worker.usage_interval_secs,
        backfill_secs = config.worker.backfill_interval_secs,
        lookback_days = config.backfill.lookback_days,
        "Loaded configuration"
    );

    Ok(config)
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
