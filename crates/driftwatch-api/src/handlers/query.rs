//! History query endpoint over the record log.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use driftwatch_core::sample::DetectionRecord;
use driftwatch_core::store::RecordLog;
use driftwatch_storage::query::{RecordQuery, TimeRange};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error};

use crate::{error_response, ErrorResponse, ResponseMetadata, SuccessResponse};

/// Application state for history queries
#[derive(Clone)]
pub struct QueryState {
    /// Record log backend
    pub record_log: Arc<dyn RecordLog>,
}

impl QueryState {
    /// Create query state
    pub fn new(record_log: Arc<dyn RecordLog>) -> Self {
        Self { record_log }
    }
}

impl std::fmt::Debug for QueryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryState").finish()
    }
}

/// Query parameters for history
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    /// Item name filter
    pub item_name: Option<String>,
    /// Product filter
    pub product: Option<String>,
    /// Line filter
    pub line: Option<String>,
    /// Station filter
    pub station: Option<String>,
    /// Start time (ISO 8601)
    pub start_time: Option<String>,
    /// End time (ISO 8601)
    pub end_time: Option<String>,
    /// Time range in hours (alternative to start/end)
    pub hours: Option<i64>,
    /// Result cap
    pub limit: Option<usize>,
}

/// `GET /api/v1/history`
pub async fn query_history(
    State(state): State<Arc<QueryState>>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<SuccessResponse<Vec<DetectionRecord>>>, (StatusCode, Json<ErrorResponse>)> {
    debug!("History query: {:?}", params);

    let mut query = RecordQuery::new();
    if let Some(item) = params.item_name {
        query = query.with_item(item);
    }
    if let Some(product) = params.product {
        query = query.with_product(product);
    }
    if let Some(line) = params.line {
        query = query.with_line(line);
    }
    if let Some(station) = params.station {
        query = query.with_station(station);
    }
    if let Some(limit) = params.limit {
        query = query.with_limit(limit);
    }

    match (params.start_time, params.end_time, params.hours) {
        (Some(start), Some(end), _) => {
            let start = parse_time(&start)?;
            let end = parse_time(&end)?;
            query = query.with_time_range(TimeRange::new(start, end));
        }
        (Some(start), None, _) => {
            let start = parse_time(&start)?;
            query = query.with_time_range(TimeRange::new(start, chrono::Utc::now()));
        }
        (None, _, Some(hours)) => {
            query = query.with_time_range(TimeRange::last_hours(hours));
        }
        _ => {}
    }

    let records = state.record_log.query(&query.build()).map_err(|e| {
        error!("History query failed: {}", e);
        error_response(&e)
    })?;

    debug!("Retrieved {} detection records", records.len());

    let total = records.len();
    Ok(Json(SuccessResponse::new(records).with_metadata(
        ResponseMetadata {
            total_count: Some(total),
        },
    )))
}

fn parse_time(raw: &str) -> Result<chrono::DateTime<chrono::Utc>, (StatusCode, Json<ErrorResponse>)> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new(
                    "invalid_time",
                    format!("Invalid time {}: {}", raw, e),
                )),
            )
        })
}
