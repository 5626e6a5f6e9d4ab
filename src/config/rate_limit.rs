//! Rate limiting and quota configuration

use serde::{Deserialize, Serialize};

/// Rate limiting algorithm selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitStrategy {
    SlidingWindow,
    TokenBucket,
    LeakyBucket,
    FixedWindow,
}

/// One policy in the composite stack. Immutable after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Name reported on denial (`limiterName`)
    pub name: String,

    /// Algorithm backing this policy
    pub strategy: LimitStrategy,

    /// Maximum requests per window (window algorithms) or bucket capacity
    /// when `burst` is unset (bucket algorithms)
    pub limit: u32,

    /// Window length; for bucket algorithms this sets the refill/leak rate
    /// to `limit / window_seconds`
    pub window_seconds: u64,

    /// Bucket capacity override for the bucket algorithms
    #[serde(skip_serializing_if = "Option::is_none")]
    pub burst: Option<u32>,

    /// Token cost per request; only the token bucket interprets it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_per_request: Option<f64>,

    /// Probe order in the composite stack; higher runs first
    pub priority: i32,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Master switch for the limiter middleware
    pub enabled: bool,

    /// Only paths under this prefix are rate limited
    pub path_prefix: String,

    /// Composite stack, any number of policies
    pub policies: Vec<RateLimitPolicy>,

    /// Adaptive token-bucket configuration
    pub adaptive: AdaptiveConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path_prefix: "/api".to_string(),
            policies: vec![RateLimitPolicy {
                name: "default".to_string(),
                strategy: LimitStrategy::SlidingWindow,
                limit: 100,
                window_seconds: 60,
                burst: None,
                cost_per_request: None,
                priority: 10,
            }],
            adaptive: AdaptiveConfig::default(),
        }
    }
}

/// Adaptive limiter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveConfig {
    /// Add the adaptive limiter to the composite stack
    pub enabled: bool,

    /// Token bucket capacity
    pub bucket_size: u32,

    /// Token refill rate per second
    pub refill_rate_per_second: f64,

    /// Load ceiling the sampler reports against (requests per minute)
    pub max_load: f64,

    /// Probe order in the composite stack
    pub priority: i32,

    /// How often the background sampler re-reports load
    pub update_interval_seconds: u64,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bucket_size: 100,
            refill_rate_per_second: 10.0,
            max_load: 6_000.0,
            priority: 0,
            update_interval_seconds: 10,
        }
    }
}

/// Quota configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Enforce quotas in the policy pipeline
    pub enabled: bool,

    /// Requests per minute
    pub per_minute: u32,

    /// Requests per day
    pub daily: u32,

    /// Requests per month
    pub monthly: u32,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            per_minute: 60,
            daily: 10_000,
            monthly: 100_000,
        }
    }
}
