//! Adaptive rate limiter
//!
//! Wraps a token bucket and re-prices requests by the current load factor.
//! An operator (or the background sampler in `server`) reports load via
//! [`AdaptiveLimiter::update_load_factor`]; every check then costs
//! `1 / load_factor` tokens, so a low factor tightens the effective limit
//! without touching the bucket configuration.

use super::{RateLimiter, RateLimitResult, TokenBucketLimiter};
use crate::clock::Clock;
use crate::store::{KvError, KvStore};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Fixed KV key holding the scalar load factor.
const LOAD_FACTOR_KEY: &str = "rl:load-factor";
const LOAD_FACTOR_TTL: Duration = Duration::from_secs(3600);

/// Tightest multiplier: every request costs five tokens.
pub const MIN_LOAD_FACTOR: f64 = 0.2;
/// Loosest multiplier: every request costs half a token.
pub const MAX_LOAD_FACTOR: f64 = 2.0;

/// Token bucket whose per-request cost follows the stored load factor.
pub struct AdaptiveLimiter {
    inner: TokenBucketLimiter,
    store: Arc<dyn KvStore>,
}

impl AdaptiveLimiter {
    /// Create an adaptive limiter over a token bucket of `bucket_size`
    /// refilled at `refill_rate_per_second`.
    pub fn new(
        store: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        bucket_size: u32,
        refill_rate_per_second: f64,
    ) -> Self {
        let inner = TokenBucketLimiter::with_prefix(
            store.clone(),
            clock,
            bucket_size,
            refill_rate_per_second,
            "rl:adaptive:",
        );
        Self { inner, store }
    }

    /// Map observed load onto a factor and persist it.
    ///
    /// The factor steps down as load climbs past 50/70/90 percent of
    /// `max_load` and relaxes to 2.0 when load falls under 30 percent.
    pub async fn update_load_factor(
        &self,
        current_load: f64,
        max_load: f64,
    ) -> Result<f64, KvError> {
        let load_percent = if max_load > 0.0 {
            current_load / max_load
        } else {
            0.0
        };

        let factor: f64 = if load_percent > 0.9 {
            0.2
        } else if load_percent > 0.7 {
            0.5
        } else if load_percent > 0.5 {
            0.75
        } else if load_percent >= 0.3 {
            1.0
        } else {
            2.0
        };
        let factor = factor.clamp(MIN_LOAD_FACTOR, MAX_LOAD_FACTOR);

        debug!(load_percent, factor, "updating load factor");
        self.store
            .put(
                LOAD_FACTOR_KEY,
                factor.to_string().into_bytes(),
                LOAD_FACTOR_TTL,
            )
            .await?;

        Ok(factor)
    }

    /// Current factor, defaulting to 1.0 when unset or unparseable. A
    /// missing record is normal (nothing has reported load yet); a garbled
    /// one is logged and ignored so a bad write cannot wedge admission.
    async fn load_factor(&self) -> Result<f64, KvError> {
        let raw = match self.store.get(LOAD_FACTOR_KEY).await? {
            Some(raw) => raw,
            None => return Ok(1.0),
        };

        match std::str::from_utf8(&raw)
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
        {
            Some(factor) => Ok(factor.clamp(MIN_LOAD_FACTOR, MAX_LOAD_FACTOR)),
            None => {
                warn!("stored load factor is not a number, using 1.0");
                Ok(1.0)
            }
        }
    }
}

#[async_trait]
impl RateLimiter for AdaptiveLimiter {
    async fn check_with_cost(
        &self,
        client_key: &str,
        cost: f64,
    ) -> Result<RateLimitResult, KvError> {
        let factor = self.load_factor().await?;
        self.inner.check_with_cost(client_key, cost / factor).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    fn limiter(bucket_size: u32, refill_rate: f64) -> (Arc<MemoryStore>, AdaptiveLimiter) {
        let clock = ManualClock::shared(1_700_000_000_000);
        let store = Arc::new(MemoryStore::new(clock.clone()));
        (
            store.clone(),
            AdaptiveLimiter::new(store, clock, bucket_size, refill_rate),
        )
    }

    #[tokio::test]
    async fn test_factor_table() {
        let (_store, limiter) = limiter(10, 1.0);

        assert_eq!(limiter.update_load_factor(95.0, 100.0).await.unwrap(), 0.2);
        assert_eq!(limiter.update_load_factor(80.0, 100.0).await.unwrap(), 0.5);
        assert_eq!(limiter.update_load_factor(60.0, 100.0).await.unwrap(), 0.75);
        assert_eq!(limiter.update_load_factor(40.0, 100.0).await.unwrap(), 1.0);
        assert_eq!(limiter.update_load_factor(10.0, 100.0).await.unwrap(), 2.0);
    }

    #[tokio::test]
    async fn test_default_factor_is_neutral() {
        let (_store, limiter) = limiter(2, 1.0);

        assert!(limiter.check("c").await.unwrap().allowed);
        assert!(limiter.check("c").await.unwrap().allowed);
        assert!(!limiter.check("c").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_high_load_reprices_requests() {
        let (_store, limiter) = limiter(100, 10.0);

        // Factor 0.2 makes each request cost 5 tokens: 100/5 = 20 admits
        limiter.update_load_factor(95.0, 100.0).await.unwrap();

        let mut admitted = 0;
        for _ in 0..25 {
            if limiter.check("c").await.unwrap().allowed {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 20);
    }

    #[tokio::test]
    async fn test_low_load_halves_cost() {
        let (_store, limiter) = limiter(10, 1.0);

        limiter.update_load_factor(5.0, 100.0).await.unwrap();

        // Factor 2.0: each request costs half a token, 20 admits
        let mut admitted = 0;
        for _ in 0..25 {
            if limiter.check("c").await.unwrap().allowed {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 20);
    }

    #[tokio::test]
    async fn test_garbled_factor_falls_back_to_neutral() {
        let (store, limiter) = limiter(1, 1.0);

        store
            .put(LOAD_FACTOR_KEY, b"not-a-number".to_vec(), LOAD_FACTOR_TTL)
            .await
            .unwrap();

        assert!(limiter.check("c").await.unwrap().allowed);
        assert!(!limiter.check("c").await.unwrap().allowed);
    }
}
