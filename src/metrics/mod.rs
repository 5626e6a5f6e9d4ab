//! Metrics aggregation
//!
//! A bounded in-memory ring of per-request records, a streaming aggregation
//! engine over it (counts, latency percentiles, per-path / per-status /
//! per-upstream views, time series), upstream health probing and Prometheus
//! text exposition.

mod collector;
mod prometheus;

pub use collector::MetricsCollector;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Rate-limit context attached to a recorded request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitInfo {
    pub limit: u32,
    pub remaining: u32,
}

/// One completed request, as recorded by the policy pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMetric {
    pub path: String,
    pub method: String,
    pub status_code: u16,
    pub latency_ms: u64,
    pub timestamp_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream: Option<String>,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitInfo>,
}

/// Request counts within an aggregation window.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RequestCounts {
    pub total: u64,
    /// 2xx and 3xx responses
    pub success: u64,
    /// Everything that is not a success
    pub errors: u64,
    pub cached: u64,
    /// 429 responses
    pub rate_limited: u64,
}

/// Latency distribution within an aggregation window.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LatencyStats {
    pub avg_ms: f64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
}

/// Per-path rollup.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PathStats {
    pub count: u64,
    pub avg_latency_ms: f64,
    /// Responses with status >= 400
    pub errors: u64,
}

/// Per-upstream rollup.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UpstreamStats {
    pub count: u64,
    pub avg_latency_ms: f64,
    /// Responses with status >= 500
    pub errors: u64,
    /// From the health-check map; unknown upstreams default to healthy
    pub healthy: bool,
}

/// Snapshot produced by [`MetricsCollector::get_aggregated`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedMetrics {
    pub window_minutes: u64,
    pub requests: RequestCounts,
    pub latency: LatencyStats,
    pub paths: BTreeMap<String, PathStats>,
    pub status_codes: BTreeMap<u16, u64>,
    pub upstreams: BTreeMap<String, UpstreamStats>,
}

/// One bucket of [`MetricsCollector::get_time_series`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeBucket {
    pub bucket_start_ms: i64,
    pub count: u64,
    pub errors: u64,
    pub avg_latency_ms: f64,
}

/// Endpoint whose average latency exceeds a threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlowEndpoint {
    pub path: String,
    pub avg_latency_ms: f64,
    pub count: u64,
}

/// Latest probe outcome for one upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamHealth {
    pub upstream: String,
    pub healthy: bool,
    pub latency_ms: u64,
    pub last_check_ms: i64,
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
