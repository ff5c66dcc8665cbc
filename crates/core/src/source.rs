//! Contract of the enterprise event source.
//!
//! The collectors only see this trait; the HTTP client that implements it
//! lives in its own crate and tests substitute scripted fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a source call produced no data.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// No usable credentials yet; retry on the next tick.
    #[error("event source not configured: {0}")]
    NotConfigured(String),

    #[error("event source rejected credentials: {0}")]
    Unauthorized(String),

    #[error("event source request failed: {0}")]
    Transport(String),

    #[error("event source returned an unreadable body: {0}")]
    Decode(String),
}

impl SourceError {
    pub fn is_not_configured(&self) -> bool {
        matches!(self, Self::NotConfigured(_))
    }
}

/// One page request against the enterprise event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    pub event_types: Vec<String>,
    pub created_after: DateTime<Utc>,
    pub created_before: DateTime<Utc>,
    pub limit: usize,
    pub stream_position: String,
}

/// Event entry, reduced to the fields the collectors read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnterpriseEvent {
    pub event_type: String,
    /// Id of the user that caused the event, if the feed reports one.
    pub actor_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// One page of events plus the cursor for the next request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPage {
    pub entries: Vec<EnterpriseEvent>,
    /// Number of entries the source says it returned.
    pub chunk_size: usize,
    pub next_stream_position: String,
}

/// Account status as reported by the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    Inactive,
    #[serde(other)]
    Other,
}

/// Roster entry, reduced to the fields the usage snapshot reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnterpriseUser {
    pub id: String,
    pub status: UserStatus,
    /// Bytes consumed by the user.
    #[serde(default)]
    pub space_used: u64,
}

/// One offset page of the roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPage {
    pub entries: Vec<EnterpriseUser>,
    pub total_count: usize,
}

/// Paginated, possibly failing, enterprise event and user feed.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Fetch one page of admin events in `[created_after, created_before)`.
    async fn enterprise_events(&self, query: &EventQuery) -> Result<EventPage, SourceError>;

    /// Fetch one page of the enterprise roster.
    async fn enterprise_users(&self, offset: usize, limit: usize)
        -> Result<UserPage, SourceError>;
}
