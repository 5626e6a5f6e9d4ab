//! # Edge API Gateway
//!
//! An edge gateway that terminates client HTTP requests, applies
//! cross-cutting policies and forwards surviving requests to upstream
//! backends.
//!
//! ## Features
//!
//! - **Rate Limiting**: four interchangeable KV-backed algorithms (sliding
//!   window, token bucket, leaky bucket, fixed window) stacked behind a
//!   priority-ordered composite limiter
//! - **Quota Enforcement**: per-user minute/day/month counters with
//!   automatic period rollover
//! - **Adaptive Throttling**: load-factor controller that re-prices request
//!   cost under load
//! - **Authentication**: API-key set and bearer-token gating with a
//!   permissive or strict mode
//! - **Proxying**: pass-through forwarding to upstream backends with header
//!   hygiene and an AI backend rewrite
//! - **Observability**: streaming metrics aggregation (percentiles, time
//!   series, per-path/per-upstream views), upstream health probes and
//!   Prometheus text exposition

pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod proxy;
pub mod quota;
pub mod ratelimit;
pub mod server;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use server::Server;

/// Version of the edge-gateway crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Service name reported by the health and descriptor endpoints
pub const SERVICE_NAME: &str = "edge-gateway";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_constants() {
        assert!(!VERSION.is_empty());
        assert_eq!(SERVICE_NAME, "edge-gateway");
    }
}
