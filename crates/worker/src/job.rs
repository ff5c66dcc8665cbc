//! The unit of work the scheduler dispatches.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kinds of background job. At most one run per kind is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Velocity,
    Usage,
    Backfill,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [JobKind::Velocity, JobKind::Usage, JobKind::Backfill];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Velocity => "velocity",
            Self::Usage => "usage",
            Self::Backfill => "backfill",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Self::Velocity => 0,
            Self::Usage => 1,
            Self::Backfill => 2,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A background job. `run` absorbs its own failures; there is nothing to report upward.
#[async_trait]
pub trait Job: Send + Sync {
    fn kind(&self) -> JobKind;

    async fn run(&self);
}
