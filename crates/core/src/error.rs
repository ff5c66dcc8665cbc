//! Unified error types for the usage stats collector.
//!
//! Error codes:
//! - DB_001-002: Stat store errors
//! - VALID_001: Validation errors

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Database error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorCode {
    /// DB_001: Failed to store a stat record
    StoreFailed,
    /// DB_002: Failed to read stat records
    QueryFailed,
}

impl DbErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::StoreFailed => "DB_001",
            Self::QueryFailed => "DB_002",
        }
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> u16 {
        500
    }
}

/// Unified error type for the usage stats collector.
#[derive(Debug, Error)]
pub enum Error {
    /// Database error with code.
    #[error("[{code}] {message}")]
    Database {
        code: &'static str,
        message: String,
        http_status: u16,
    },

    /// The (measure, starting) pair is already recorded.
    #[error("stat {measure} already recorded for bucket starting {starting}")]
    Conflict {
        measure: String,
        starting: DateTime<Utc>,
    },

    #[error("invalid measure: {0}")]
    InvalidMeasure(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a database error.
    pub fn database(code: DbErrorCode, msg: impl Into<String>) -> Self {
        Self::Database {
            code: code.code(),
            message: msg.into(),
            http_status: code.http_status(),
        }
    }

    pub fn conflict(measure: impl Into<String>, starting: DateTime<Utc>) -> Self {
        Self::Conflict {
            measure: measure.into(),
            starting,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True when the write lost against an existing record.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Get the HTTP status code for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Database { http_status, .. } => *http_status,
            Self::Conflict { .. } => 409,
            Self::InvalidMeasure(_) => 400,
            Self::Validation(_) => 400,
            Self::Internal(_) => 500,
        }
    }

    /// Get the error code if this is a coded error.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::Database { code, .. } => Some(code),
            _ => None,
        }
    }
}
