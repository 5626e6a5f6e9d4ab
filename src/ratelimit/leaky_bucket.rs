//! Leaky bucket limiter
//!
//! Each request pours one unit into the bucket; the bucket drains
//! continuously at `leak_rate` per second. A full bucket denies. Where the
//! token bucket permits a burst of `bucket_size` in a single instant, the
//! leaky bucket enforces a smoothed output rate with no burst above the
//! water line.

use super::{RateLimiter, RateLimitResult};
use crate::clock::Clock;
use crate::store::{decode_json, encode_json, KvError, KvStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

const KEY_PREFIX: &str = "rl:lb:";
const RECORD_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Serialize, Deserialize)]
struct LeakyState {
    water_level: f64,
    last_update_ms: i64,
}

/// KV-backed leaky bucket.
pub struct LeakyBucketLimiter {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    bucket_size: u32,
    leak_rate_per_second: f64,
}

impl LeakyBucketLimiter {
    /// Create a bucket of `bucket_size` units draining at
    /// `leak_rate_per_second`.
    pub fn new(
        store: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        bucket_size: u32,
        leak_rate_per_second: f64,
    ) -> Self {
        Self {
            store,
            clock,
            bucket_size,
            leak_rate_per_second,
        }
    }
}

#[async_trait]
impl RateLimiter for LeakyBucketLimiter {
    async fn check_with_cost(
        &self,
        client_key: &str,
        _cost: f64,
    ) -> Result<RateLimitResult, KvError> {
        let key = format!("{KEY_PREFIX}{client_key}");
        let now = self.clock.now_ms();

        let mut state = match self.store.get(&key).await? {
            Some(raw) => decode_json::<LeakyState>(&key, &raw)?,
            None => LeakyState {
                water_level: 0.0,
                last_update_ms: now,
            },
        };

        // Continuous drain since the last observation
        let elapsed_secs = (now - state.last_update_ms).max(0) as f64 / 1000.0;
        state.water_level = (state.water_level - elapsed_secs * self.leak_rate_per_second).max(0.0);

        if state.water_level >= self.bucket_size as f64 {
            // Seconds until one unit of headroom has drained
            let drain_secs =
                (state.water_level - self.bucket_size as f64 + 1.0) / self.leak_rate_per_second;
            let retry_after = drain_secs.ceil() as u64;
            trace!(key = %key, level = state.water_level, "leaky bucket full");
            return Ok(RateLimitResult::denied(
                self.bucket_size,
                now + (drain_secs * 1000.0).ceil() as i64,
                retry_after,
            ));
        }

        state.water_level += 1.0;
        state.last_update_ms = now;
        let remaining = (self.bucket_size as f64 - state.water_level).floor().max(0.0) as u32;

        self.store
            .put(&key, encode_json(&key, &state)?, RECORD_TTL)
            .await?;

        Ok(RateLimitResult::allowed(
            remaining,
            self.bucket_size,
            now + ((state.water_level / self.leak_rate_per_second) * 1000.0).ceil() as i64,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    fn limiter(bucket_size: u32, leak_rate: f64) -> (Arc<ManualClock>, LeakyBucketLimiter) {
        let clock = ManualClock::shared(1_700_000_000_000);
        let store = Arc::new(MemoryStore::new(clock.clone()));
        (
            clock.clone(),
            LeakyBucketLimiter::new(store, clock, bucket_size, leak_rate),
        )
    }

    #[tokio::test]
    async fn test_fills_to_capacity_then_denies() {
        let (_clock, limiter) = limiter(5, 1.0);

        for _ in 0..5 {
            assert!(limiter.check("c").await.unwrap().allowed);
        }

        let result = limiter.check("c").await.unwrap();
        assert!(!result.allowed);
        assert_eq!(result.retry_after_secs, Some(1));
    }

    #[tokio::test]
    async fn test_drains_continuously() {
        let (clock, limiter) = limiter(2, 1.0);

        assert!(limiter.check("c").await.unwrap().allowed);
        assert!(limiter.check("c").await.unwrap().allowed);
        assert!(!limiter.check("c").await.unwrap().allowed);

        // Half a second leaks half a unit: drained level 1.5 is below
        // capacity, so the pour is admitted (level rises to 2.5)
        clock.advance(500);
        assert!(limiter.check("c").await.unwrap().allowed);

        assert!(!limiter.check("c").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_retry_after_scales_with_overfill() {
        let (_clock, limiter) = limiter(3, 0.5);

        for _ in 0..3 {
            assert!(limiter.check("c").await.unwrap().allowed);
        }

        // Level 3 at 0.5/s: one unit of headroom needs 2 seconds
        let result = limiter.check("c").await.unwrap();
        assert!(!result.allowed);
        assert_eq!(result.retry_after_secs, Some(2));
    }

    #[tokio::test]
    async fn test_empty_bucket_after_long_idle() {
        let (clock, limiter) = limiter(2, 1.0);

        assert!(limiter.check("c").await.unwrap().allowed);
        clock.advance(60_000);

        let result = limiter.check("c").await.unwrap();
        assert!(result.allowed);
        assert_eq!(result.remaining, 1);
    }
}
