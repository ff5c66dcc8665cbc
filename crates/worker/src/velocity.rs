//! Velocity collector: per-minute event counts by type plus distinct actors.
//!
//! Each run pulls every watched event in one minute window from the
//! enterprise event stream and writes one counter per event type and a
//! `UNIQUE_USERS` counter for that minute.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use telemetry::metrics;
use tracing::{debug, info, warn};

use stat_store::StatStore;
use stats_core::{
    truncate_minute, Bucket, Clock, EnterpriseEvent, EventQuery, EventSource, Measure,
    SourceError, StatRecord, VELOCITY_EVENTS,
};

use crate::job::{Job, JobKind};
use crate::record::{record_all, WriteTally};

/// Entries requested per page; a page shorter than this ends the stream.
pub const EVENTS_PAGE_SIZE: usize = 500;

/// Hard stop for a source that never returns a short page.
const MAX_PAGES: usize = 10_000;

/// Outcome of one velocity pass.
#[derive(Debug, Clone, PartialEq)]
pub struct VelocityReport {
    pub window: Bucket,
    /// Events fetched for the window.
    pub events: usize,
    pub writes: WriteTally,
    /// Set when the fetch failed; counters were still written as zero.
    pub source_error: Option<SourceError>,
    /// True when nothing was written because the source is not configured.
    pub skipped: bool,
}

/// Fetch every event of `event_types` in `window`, following the stream cursor
/// until the source returns a page shorter than `page_size`.
pub async fn fetch_events(
    source: &dyn EventSource,
    event_types: &[String],
    window: Bucket,
    page_size: usize,
) -> Result<Vec<EnterpriseEvent>, SourceError> {
    let page_size = page_size.max(1);
    let mut events = Vec::new();
    let mut stream_position = "0".to_string();

    for page_number in 0..MAX_PAGES {
        let start = Instant::now();
        let page = source
            .enterprise_events(&EventQuery {
                event_types: event_types.to_vec(),
                created_after: window.starting,
                created_before: window.ending,
                limit: page_size,
                stream_position: stream_position.clone(),
            })
            .await?;

        metrics().pages_fetched.inc();
        let chunk_size = page.chunk_size;
        events.extend(page.entries);
        stream_position = page.next_stream_position;

        debug!(
            page = page_number,
            chunk_size,
            total = events.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Fetched event page"
        );

        if chunk_size != page_size {
            return Ok(events);
        }
    }

    warn!(
        window = %window.starting,
        pages = MAX_PAGES,
        "Event stream never returned a short page, stopping"
    );
    Ok(events)
}

/// Count events per watched type, in watch-list order.
pub fn count_by_type(events: &[EnterpriseEvent]) -> Vec<(Measure, usize)> {
    VELOCITY_EVENTS
        .iter()
        .map(|measure| {
            let count = events
                .iter()
                .filter(|e| e.event_type == measure.as_str())
                .count();
            (*measure, count)
        })
        .collect()
}

/// Number of distinct actors behind the events. Events without an actor are ignored.
pub fn unique_actors(events: &[EnterpriseEvent]) -> usize {
    events
        .iter()
        .filter_map(|e| e.actor_id.as_deref())
        .collect::<HashSet<_>>()
        .len()
}

/// Collector for the per-minute velocity counters.
pub struct VelocityCollector {
    source: Arc<dyn EventSource>,
    store: Arc<dyn StatStore>,
    clock: Arc<dyn Clock>,
    page_size: usize,
    event_types: Vec<String>,
}

impl VelocityCollector {
    pub fn new(
        source: Arc<dyn EventSource>,
        store: Arc<dyn StatStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            source,
            store,
            clock,
            page_size: EVENTS_PAGE_SIZE,
            event_types: VELOCITY_EVENTS
                .iter()
                .map(|m| m.as_str().to_string())
                .collect(),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// The minute to record: the one starting at `window_start`, or the last
    /// completed minute before now.
    pub fn window_for(&self, window_start: Option<DateTime<Utc>>) -> Bucket {
        match window_start {
            Some(start) => Bucket::minute(start),
            None => Bucket::minute(truncate_minute(self.clock.now()) - Duration::minutes(1)),
        }
    }

    /// Record the velocity counters for one minute. Never fails; the report
    /// says what was written.
    pub async fn record_velocity(&self, window_start: Option<DateTime<Utc>>) -> VelocityReport {
        let window = self.window_for(window_start);

        let (events, source_error) =
            match fetch_events(&*self.source, &self.event_types, window, self.page_size).await {
                Ok(events) => (events, None),
                Err(e) if e.is_not_configured() => {
                    metrics().source_not_configured.inc();
                    warn!(
                        window = %window.starting,
                        error = %e,
                        "Event source not configured, skipping velocity window"
                    );
                    return VelocityReport {
                        window,
                        events: 0,
                        writes: WriteTally::default(),
                        source_error: Some(e),
                        skipped: true,
                    };
                }
                Err(e) => {
                    metrics().source_errors.inc();
                    warn!(
                        window = %window.starting,
                        error = %e,
                        "Failed to fetch events, recording zero counts"
                    );
                    (Vec::new(), Some(e))
                }
            };

        metrics().events_fetched.inc_by(events.len() as u64);

        let mut records: Vec<StatRecord> = count_by_type(&events)
            .into_iter()
            .map(|(measure, count)| StatRecord::new(measure, count as f64, window))
            .collect();
        records.push(StatRecord::new(
            Measure::UniqueUsers,
            unique_actors(&events) as f64,
            window,
        ));

        let writes = record_all(&*self.store, &records).await;

        info!(
            window = %window.starting,
            events = events.len(),
            recorded = writes.recorded,
            conflicts = writes.conflicts,
            failed = writes.failed,
            "Velocity recorded"
        );

        VelocityReport {
            window,
            events: events.len(),
            writes,
            source_error,
            skipped: false,
        }
    }
}

#[async_trait]
impl Job for VelocityCollector {
    fn kind(&self) -> JobKind {
        JobKind::Velocity
    }

    async fn run(&self) {
        metrics().velocity_runs.inc();
        self.record_velocity(None).await;
    }
}
