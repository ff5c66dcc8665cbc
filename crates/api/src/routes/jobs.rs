//! On-demand job triggers.
//!
//! Each handler queues a one-shot run and returns immediately. A trigger that
//! lands while the same job is running folds into that run.

use axum::{extract::State, http::StatusCode, Json};
use tracing::info;
use worker::JobKind;

use crate::response::{ApiError, JobAccepted};
use crate::state::AppState;

fn enqueue(state: &AppState, kind: JobKind) -> Result<(StatusCode, Json<JobAccepted>), ApiError> {
    if !state.scheduler.trigger(kind) {
        return Err(ApiError::unavailable("Scheduler is not running"));
    }
    info!(job = %kind, "Job trigger accepted");
    Ok((StatusCode::ACCEPTED, Json(JobAccepted::queued(kind))))
}

/// POST /jobs/velocity - Record the last completed minute now.
pub async fn velocity_handler(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<JobAccepted>), ApiError> {
    enqueue(&state, JobKind::Velocity)
}

/// POST /jobs/usage - Take the daily usage snapshot now.
pub async fn usage_handler(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<JobAccepted>), ApiError> {
    enqueue(&state, JobKind::Usage)
}

/// POST /jobs/backfill - Run a backfill pass now.
pub async fn backfill_handler(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<JobAccepted>), ApiError> {
    enqueue(&state, JobKind::Backfill)
}
