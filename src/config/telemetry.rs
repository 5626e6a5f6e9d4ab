//! Telemetry configuration

use serde::{Deserialize, Serialize};

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Serve the Prometheus exposition endpoint
    pub enable_metrics: bool,

    /// Prometheus endpoint path
    pub metrics_path: String,

    /// Request record ring capacity; oldest entries are evicted first
    pub max_metrics: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enable_metrics: true,
            metrics_path: "/metrics".to_string(),
            max_metrics: 10_000,
        }
    }
}
