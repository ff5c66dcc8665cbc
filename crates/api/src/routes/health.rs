//! Health check endpoints.

use axum::{http::StatusCode, Json};
use telemetry::{health, metrics};

use crate::response::HealthResponse;

/// GET /health - Full health check.
pub async fn health_handler() -> Json<HealthResponse> {
    let report = health().report();

    Json(HealthResponse {
        status: report.status,
        store_connected: health().store.is_healthy(),
        event_source_configured: health().event_source.is_healthy(),
        running_jobs: metrics().running_jobs.get(),
    })
}

/// GET /health/ready - Readiness probe (store reachable).
pub async fn ready_handler() -> StatusCode {
    if health().is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /health/live - Liveness probe (service is running).
pub async fn live_handler() -> StatusCode {
    if health().is_alive() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
