//! Stat history reads.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use stat_store::{StatQuery, DEFAULT_HISTORY_LIMIT};
use stats_core::Measure;
use tracing::debug;

use crate::response::{ApiError, StatsResponse};
use crate::state::AppState;

/// Query string of `GET /stats/:measure`.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// GET /stats/:measure - Stored series for one measure, oldest first.
pub async fn history_handler(
    State(state): State<AppState>,
    Path(measure): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<StatsResponse>, ApiError> {
    let measure: Measure = measure.parse()?;

    if let (Some(since), Some(until)) = (params.since, params.until) {
        if since >= until {
            return Err(ApiError::bad_request("`since` must be before `until`"));
        }
    }

    let mut query = StatQuery::new(measure)
        .limit(params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, DEFAULT_HISTORY_LIMIT));
    if let Some(since) = params.since {
        query = query.since(since);
    }
    if let Some(until) = params.until {
        query = query.until(until);
    }

    let records = state.store.history(&query).await?;
    debug!(measure = %measure, count = records.len(), "Served stat history");

    Ok(Json(StatsResponse {
        measure,
        count: records.len(),
        records,
    }))
}
