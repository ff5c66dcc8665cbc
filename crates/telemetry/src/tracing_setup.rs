//! Tracing setup for structured logging.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Default filter: our crates at info, HTTP plumbing quieter.
const DEFAULT_FILTER: &str = "info,hyper=warn,reqwest=warn";

/// Output format of the log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    /// `json` (any case) selects JSON; anything else is human readable.
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") || value == "1" || value.eq_ignore_ascii_case("true")
        {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Tracing configuration.
pub struct TracingConfig {
    /// Log level filter (e.g., "info", "debug", "worker=debug")
    pub filter: String,
    pub format: LogFormat,
    /// Whether to log span open/close (job spans carry the window being recorded)
    pub span_events: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            format: LogFormat::Pretty,
            span_events: false,
        }
    }
}

impl TracingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_span_events(mut self, span_events: bool) -> Self {
        self.span_events = span_events;
        self
    }
}

/// Initialize tracing with the given configuration.
///
/// Returns false if a global subscriber was already installed.
pub fn init_tracing(config: TracingConfig) -> bool {
    let env_filter = EnvFilter::try_new(&config.filter)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let installed = match config.format {
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .json()
                .with_span_events(span_events)
                .with_current_span(true)
                .with_target(true)
                .with_file(true)
                .with_line_number(true);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()
                .is_ok()
        }
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .with_span_events(span_events)
                .with_target(true)
                .with_thread_ids(false);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()
                .is_ok()
        }
    };

    if installed {
        tracing::info!(filter = %config.filter, format = ?config.format, "Tracing initialized");
    }
    installed
}

/// Initialize tracing from `RUST_LOG`, `LOG_FORMAT` and the older `LOG_JSON`.
pub fn init_tracing_from_env() -> bool {
    let format = std::env::var("LOG_FORMAT")
        .or_else(|_| std::env::var("LOG_JSON"))
        .map(|v| LogFormat::parse(&v))
        .unwrap_or_default();

    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.to_string());

    init_tracing(
        TracingConfig::new()
            .with_filter(filter)
            .with_format(format)
            .with_span_events(std::env::var("LOG_SPANS").is_ok()),
    )
}
