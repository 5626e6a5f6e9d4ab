//! Upstream backend configuration

use serde::{Deserialize, Serialize};

/// Upstream backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL requests under the proxied prefix are forwarded to;
    /// `BACKEND_URL` overrides it
    pub backend_url: String,

    /// Path probed on each upstream by the health loop
    pub health_path: String,

    /// Seconds between health probe rounds
    pub health_check_interval_seconds: u64,

    /// Per-probe timeout in milliseconds
    pub health_timeout_ms: u64,

    /// Consecutive probe failures after which the forwarder stops dialling
    /// the upstream and returns 503 until a probe succeeds again
    pub failure_threshold: u32,

    /// Static service catalogue served by `/api/services`
    pub services: Vec<ServiceEntry>,
}

/// One entry of the service catalogue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub name: String,
    pub url: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:8081".to_string(),
            health_path: "/health".to_string(),
            health_check_interval_seconds: 30,
            health_timeout_ms: 5_000,
            failure_threshold: 3,
            services: vec![],
        }
    }
}
