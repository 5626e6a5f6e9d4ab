//! Rate limiter family
//!
//! Four interchangeable algorithms behind one contract, a load-adaptive
//! wrapper and a priority-ordered composite stack. Every limiter keeps its
//! per-client state in the shared KV store under its own key prefix and
//! reads time from the injected clock.
//!
//! The KV store gives per-key atomicity for single operations only; a check
//! is a read-modify-write, so concurrent requests from the same client may
//! briefly admit slightly more than the configured limit (bounded by the
//! number of concurrent workers). Records carry a TTL so abandoned keys
//! self-expire.

mod adaptive;
mod composite;
mod fixed_window;
mod leaky_bucket;
mod sliding_window;
mod token_bucket;

pub use adaptive::AdaptiveLimiter;
pub use composite::{CompositeCheck, CompositeLimiter};
pub use fixed_window::FixedWindowLimiter;
pub use leaky_bucket::LeakyBucketLimiter;
pub use sliding_window::SlidingWindowLimiter;
pub use token_bucket::TokenBucketLimiter;

use crate::store::KvError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Outcome of a limiter check.
///
/// Invariant: `allowed` implies `retry_after_secs` is `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitResult {
    /// Whether the request may proceed
    pub allowed: bool,

    /// Requests left in the current window/bucket
    pub remaining: u32,

    /// The configured ceiling
    pub limit: u32,

    /// Unix milliseconds at which the limit resets
    pub reset_at_ms: i64,

    /// Seconds the client should wait before retrying; only set on denial
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl RateLimitResult {
    /// An allowed result.
    pub fn allowed(remaining: u32, limit: u32, reset_at_ms: i64) -> Self {
        Self {
            allowed: true,
            remaining,
            limit,
            reset_at_ms,
            retry_after_secs: None,
        }
    }

    /// A denied result. `retry_after_secs` is floored at one second so
    /// clients never receive `Retry-After: 0`.
    pub fn denied(limit: u32, reset_at_ms: i64, retry_after_secs: u64) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            limit,
            reset_at_ms,
            retry_after_secs: Some(retry_after_secs.max(1)),
        }
    }
}

/// Contract shared by every rate limiting algorithm.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Check whether `client_key` may issue a request costing `cost` tokens.
    ///
    /// Only the token bucket (and its adaptive wrapper) interprets `cost`;
    /// the window and leaky-bucket algorithms count every request as one.
    async fn check_with_cost(&self, client_key: &str, cost: f64)
        -> Result<RateLimitResult, KvError>;

    /// Check with the default cost of one.
    async fn check(&self, client_key: &str) -> Result<RateLimitResult, KvError> {
        self.check_with_cost(client_key, 1.0).await
    }
}

/// Ceiling division of a non-negative millisecond span into whole seconds,
/// floored at one. Used for `Retry-After` arithmetic.
pub(crate) fn secs_until(span_ms: i64) -> u64 {
    if span_ms <= 0 {
        return 1;
    }
    ((span_ms + 999) / 1000) as u64
}
