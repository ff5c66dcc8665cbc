//! Standardized API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use stats_core::{Measure, StatRecord};
use telemetry::HealthStatus;
use worker::JobKind;

/// Response to a job trigger.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobAccepted {
    pub job: JobKind,
    pub queued: bool,
}

impl JobAccepted {
    pub fn queued(job: JobKind) -> Self {
        Self { job, queued: true }
    }
}

/// Stored series for one measure.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub measure: Measure,
    pub count: usize,
    pub records: Vec<StatRecord>,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub store_connected: bool,
    pub event_source_configured: bool,
    pub running_jobs: u64,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }
}

/// API error type with stable error codes.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub response: ErrorResponse,
}

impl ApiError {
    pub fn with_code(status: StatusCode, code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            status,
            response: ErrorResponse::new(msg, code),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::with_code(StatusCode::BAD_REQUEST, "VALID_001", msg)
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::with_code(StatusCode::CONFLICT, "CONFLICT_001", msg)
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::with_code(StatusCode::SERVICE_UNAVAILABLE, "SCHED_001", msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::with_code(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_001", msg)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.response)).into_response()
    }
}

impl From<stats_core::Error> for ApiError {
    fn from(err: stats_core::Error) -> Self {
        match &err {
            stats_core::Error::Database {
                code,
                message,
                http_status,
            } => {
                let status = StatusCode::from_u16(*http_status)
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                ApiError::with_code(status, *code, message)
            }
            stats_core::Error::Conflict { .. } => ApiError::conflict(err.to_string()),
            stats_core::Error::InvalidMeasure(_) | stats_core::Error::Validation(_) => {
                ApiError::bad_request(err.to_string())
            }
            _ => ApiError::internal(err.to_string()),
        }
    }
}
