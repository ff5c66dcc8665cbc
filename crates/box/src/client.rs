//! HTTP client for the enterprise admin event stream and user roster.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::RwLock;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::{Duration, Instant};
use telemetry::{health, metrics};
use tracing::{debug, warn};
use url::Url;

use stats_core::{
    EnterpriseEvent, EnterpriseUser, EventPage, EventQuery, EventSource, SourceError, UserPage,
};

use crate::config::BoxConfig;

/// Raw `GET /events` response.
#[derive(Debug, Deserialize)]
struct EventsResponse {
    #[serde(default)]
    chunk_size: Option<usize>,
    #[serde(default)]
    next_stream_position: serde_json::Value,
    #[serde(default)]
    entries: Vec<EventEntry>,
}

#[derive(Debug, Deserialize)]
struct EventEntry {
    event_type: String,
    #[serde(default)]
    created_by: Option<Actor>,
    #[serde(default)]
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Actor {
    #[serde(default)]
    id: serde_json::Value,
}

/// Raw `GET /users` response.
#[derive(Debug, Deserialize)]
struct UsersResponse {
    total_count: usize,
    #[serde(default)]
    entries: Vec<EnterpriseUser>,
}

/// Ids and cursors arrive as either JSON strings or numbers.
fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl From<EventEntry> for EnterpriseEvent {
    fn from(entry: EventEntry) -> Self {
        Self {
            event_type: entry.event_type,
            actor_id: entry.created_by.as_ref().and_then(|a| scalar_to_string(&a.id)),
            created_at: entry
                .created_at
                .as_deref()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|t| t.with_timezone(&Utc)),
        }
    }
}

impl EventsResponse {
    fn into_page(self, previous_position: &str) -> EventPage {
        let entries: Vec<EnterpriseEvent> =
            self.entries.into_iter().map(EnterpriseEvent::from).collect();
        EventPage {
            chunk_size: self.chunk_size.unwrap_or(entries.len()),
            next_stream_position: scalar_to_string(&self.next_stream_position)
                .unwrap_or_else(|| previous_position.to_string()),
            entries,
        }
    }
}

fn rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Enterprise API client.
///
/// Holds no credentials until one is configured or installed; every call
/// made before that returns [`SourceError::NotConfigured`] without touching
/// the network.
pub struct BoxClient {
    base_url: Url,
    http_client: reqwest::Client,
    access_token: RwLock<Option<String>>,
}

impl BoxClient {
    /// Creates a new client.
    pub fn new(config: &BoxConfig) -> Result<Self, SourceError> {
        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|e| SourceError::NotConfigured(format!("invalid base url {}: {}", base, e)))?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SourceError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            http_client,
            access_token: RwLock::new(
                config.access_token.clone().filter(|t| !t.trim().is_empty()),
            ),
        })
    }

    /// Install or replace the access token.
    pub fn set_access_token(&self, token: impl Into<String>) {
        *self.access_token.write() = Some(token.into());
        debug!("Access token updated");
    }

    /// Drop the access token; calls report NotConfigured until a new one is set.
    pub fn clear_access_token(&self) {
        *self.access_token.write() = None;
    }

    pub fn is_configured(&self) -> bool {
        self.access_token.read().is_some()
    }

    fn token(&self) -> Result<String, SourceError> {
        self.access_token.read().clone().ok_or_else(|| {
            SourceError::NotConfigured("no access token; authorize the enterprise account".into())
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, SourceError> {
        self.base_url
            .join(path)
            .map_err(|e| SourceError::NotConfigured(format!("invalid endpoint {}: {}", path, e)))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, SourceError> {
        let result = self.send(url).await;
        match &result {
            Ok(_) => health().event_source.set_healthy(),
            Err(e) => health().event_source.set_unhealthy(e.to_string()),
        }
        result
    }

    async fn send<T: DeserializeOwned>(&self, url: Url) -> Result<T, SourceError> {
        let token = self.token()?;
        let start = Instant::now();

        debug!(url = %url, "Calling event source");

        let response = self
            .http_client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        metrics()
            .source_latency_ms
            .observe(start.elapsed().as_millis() as u64);

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "Event source rejected credentials");
            return Err(SourceError::Unauthorized(format!("{}: {}", status, body)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Transport(format!(
                "event source returned {}: {}",
                status, body
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| SourceError::Decode(e.to_string()))
    }
}

#[async_trait]
impl EventSource for BoxClient {
    async fn enterprise_events(&self, query: &EventQuery) -> Result<EventPage, SourceError> {
        let mut url = self.endpoint("events")?;
        url.query_pairs_mut()
            .append_pair("stream_type", "admin_logs")
            .append_pair("limit", &query.limit.to_string())
            .append_pair("stream_position", &query.stream_position)
            .append_pair("event_type", &query.event_types.join(","))
            .append_pair("created_after", &rfc3339(query.created_after))
            .append_pair("created_before", &rfc3339(query.created_before));

        let response: EventsResponse = self.get_json(url).await?;
        Ok(response.into_page(&query.stream_position))
    }

    async fn enterprise_users(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<UserPage, SourceError> {
        let mut url = self.endpoint("users")?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string());

        let response: UsersResponse = self.get_json(url).await?;
        Ok(UserPage {
            entries: response.entries,
            total_count: response.total_count,
        })
    }
}
