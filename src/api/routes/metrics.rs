//! Metrics route handlers

use crate::metrics::{AggregatedMetrics, TimeBucket};
use crate::server::AppState;
use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

/// Query parameters for the aggregated metrics view
#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    /// Aggregation window in minutes
    pub window: Option<u64>,
    /// Time series bucket size in minutes
    pub bucket: Option<u64>,
}

/// Aggregated JSON snapshot of the last `window` minutes (default 5).
pub async fn aggregated(
    State(state): State<AppState>,
    Query(query): Query<MetricsQuery>,
) -> Json<AggregatedMetrics> {
    Json(state.collector.get_aggregated(query.window.unwrap_or(5)))
}

/// Bucketed time series over the last `window` minutes (default 60),
/// `bucket` minutes per point (default 1).
pub async fn time_series(
    State(state): State<AppState>,
    Query(query): Query<MetricsQuery>,
) -> Json<Vec<TimeBucket>> {
    Json(
        state
            .collector
            .get_time_series(query.window.unwrap_or(60), query.bucket.unwrap_or(1)),
    )
}

/// Prometheus text exposition.
pub async fn prometheus(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.collector.to_prometheus(),
    )
}
