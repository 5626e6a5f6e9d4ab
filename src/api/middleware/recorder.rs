//! Request metric recording
//!
//! Times every request under the proxied prefix and records the outcome in
//! the collector: status, latency, the upstream tag and cache flag read
//! off the response, and the rate-limit context the limiter middleware
//! attached. Recording never fails the pipeline.

use crate::metrics::{RateLimitInfo, RequestMetric};
use crate::server::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

pub async fn metrics_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    if !path.starts_with(state.config.rate_limit.path_prefix.as_str()) {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let started = Instant::now();

    let response = next.run(req).await;

    let upstream = response
        .headers()
        .get("x-upstream")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let cached = response
        .headers()
        .get("x-cache")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == "HIT")
        .unwrap_or(false);
    let rate_limit = response.extensions().get::<RateLimitInfo>().copied();

    state.collector.record(RequestMetric {
        path,
        method,
        status_code: response.status().as_u16(),
        latency_ms: started.elapsed().as_millis() as u64,
        timestamp_ms: state.clock.now_ms(),
        upstream,
        cached,
        rate_limit,
    });

    response
}
