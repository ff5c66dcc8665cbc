//! Measure names and the stat record they label.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::time::Bucket;

/// Named category of a stat record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Measure {
    // Velocity event types (one-minute buckets)
    Upload,
    Download,
    Delete,
    CollaborationInvite,
    CollaborationAccept,
    Login,
    /// Distinct actors across all watched events in a minute
    UniqueUsers,

    // Usage snapshot (one-day buckets)
    ActiveUsers,
    InactiveUsers,
    StorageUsedGb,

    /// Hour-wide marker: every minute of the hour has all velocity measures.
    VelocityBackfill,
}

/// Event types pulled from the enterprise event feed, in watch-list order.
pub const VELOCITY_EVENTS: [Measure; 6] = [
    Measure::Upload,
    Measure::Download,
    Measure::Delete,
    Measure::CollaborationInvite,
    Measure::CollaborationAccept,
    Measure::Login,
];

/// Measures written for every velocity minute. A minute is complete when all are present.
pub const VELOCITY_MEASURES: [Measure; 7] = [
    Measure::Upload,
    Measure::Download,
    Measure::Delete,
    Measure::CollaborationInvite,
    Measure::CollaborationAccept,
    Measure::Login,
    Measure::UniqueUsers,
];

/// Measures written by the daily usage snapshot.
pub const USAGE_MEASURES: [Measure; 3] = [
    Measure::ActiveUsers,
    Measure::InactiveUsers,
    Measure::StorageUsedGb,
];

impl Measure {
    pub const ALL: [Measure; 11] = [
        Measure::Upload,
        Measure::Download,
        Measure::Delete,
        Measure::CollaborationInvite,
        Measure::CollaborationAccept,
        Measure::Login,
        Measure::UniqueUsers,
        Measure::ActiveUsers,
        Measure::InactiveUsers,
        Measure::StorageUsedGb,
        Measure::VelocityBackfill,
    ];

    /// Stored name of the measure.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "UPLOAD",
            Self::Download => "DOWNLOAD",
            Self::Delete => "DELETE",
            Self::CollaborationInvite => "COLLABORATION_INVITE",
            Self::CollaborationAccept => "COLLABORATION_ACCEPT",
            Self::Login => "LOGIN",
            Self::UniqueUsers => "UNIQUE_USERS",
            Self::ActiveUsers => "ACTIVE_USERS",
            Self::InactiveUsers => "INACTIVE_USERS",
            Self::StorageUsedGb => "STORAGE_USED_GB",
            Self::VelocityBackfill => "VELOCITY_BACKFILL",
        }
    }

    /// True for the raw event types fetched from the feed.
    pub fn is_velocity_event(&self) -> bool {
        VELOCITY_EVENTS.contains(self)
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Measure {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Measure::ALL
            .iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| Error::InvalidMeasure(s.to_string()))
    }
}

/// One persisted, time-bucketed measurement.
///
/// `(measure, starting)` is unique in the store; records are never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatRecord {
    pub measure: Measure,
    pub value: f64,
    pub starting: chrono::DateTime<chrono::Utc>,
    pub ending: chrono::DateTime<chrono::Utc>,
}

impl StatRecord {
    pub fn new(measure: Measure, value: f64, bucket: Bucket) -> Self {
        Self {
            measure,
            value,
            starting: bucket.starting,
            ending: bucket.ending,
        }
    }

    pub fn bucket(&self) -> Bucket {
        Bucket {
            starting: self.starting,
            ending: self.ending,
        }
    }
}
