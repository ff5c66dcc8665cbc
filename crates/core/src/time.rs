//! Fixed-width UTC buckets and the clock the jobs read "now" from.

use chrono::{DateTime, Duration, DurationRound, TimeZone, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Truncate to the start of the minute.
pub fn truncate_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    t.duration_trunc(Duration::minutes(1)).unwrap_or(t)
}

/// Truncate to the start of the hour.
pub fn truncate_hour(t: DateTime<Utc>) -> DateTime<Utc> {
    t.duration_trunc(Duration::hours(1)).unwrap_or(t)
}

/// Truncate to midnight UTC.
pub fn truncate_day(t: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&t.date_naive().and_hms_opt(0, 0, 0).unwrap_or(t.naive_utc()))
}

/// Half-open UTC interval `[starting, ending)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bucket {
    pub starting: DateTime<Utc>,
    pub ending: DateTime<Utc>,
}

impl Bucket {
    /// The one-minute bucket containing `t`.
    pub fn minute(t: DateTime<Utc>) -> Self {
        let starting = truncate_minute(t);
        Self {
            starting,
            ending: starting + Duration::minutes(1),
        }
    }

    /// The one-hour bucket containing `t`.
    pub fn hour(t: DateTime<Utc>) -> Self {
        let starting = truncate_hour(t);
        Self {
            starting,
            ending: starting + Duration::hours(1),
        }
    }

    /// The one-day bucket containing `t`.
    pub fn day(t: DateTime<Utc>) -> Self {
        let starting = truncate_day(t);
        Self {
            starting,
            ending: starting + Duration::days(1),
        }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.starting <= t && t < self.ending
    }

    /// Minute starts inside the bucket, oldest first.
    pub fn minutes(&self) -> impl DoubleEndedIterator<Item = DateTime<Utc>> {
        let starting = self.starting;
        let count = (self.ending - self.starting).num_minutes().max(0);
        (0..count).map(move |i| starting + Duration::minutes(i))
    }
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
