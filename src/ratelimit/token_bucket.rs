//! Token bucket limiter
//!
//! Tokens refill at a fixed rate up to `bucket_size`; each request consumes
//! `cost` tokens. Bursts up to the full bucket are allowed, after which the
//! sustained rate is `refill_rate` per second.
//!
//! Refill credits whole elapsed intervals only. The discarded sub-interval
//! remainder bounds the long-term rate exactly at the cost of slightly
//! under-crediting a client that arrives just before an interval elapses.

use super::{RateLimiter, RateLimitResult};
use crate::clock::Clock;
use crate::store::{decode_json, encode_json, KvError, KvStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

const RECORD_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Serialize, Deserialize)]
struct BucketState {
    tokens: f64,
    last_update_ms: i64,
}

/// KV-backed token bucket.
pub struct TokenBucketLimiter {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    bucket_size: u32,
    refill_interval_ms: f64,
    key_prefix: &'static str,
}

impl TokenBucketLimiter {
    /// Create a bucket holding `bucket_size` tokens refilled at
    /// `refill_rate_per_second`.
    pub fn new(
        store: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        bucket_size: u32,
        refill_rate_per_second: f64,
    ) -> Self {
        Self::with_prefix(store, clock, bucket_size, refill_rate_per_second, "rl:tb:")
    }

    /// Same bucket under a different KV namespace. The adaptive wrapper uses
    /// this to keep its state apart from plain token buckets.
    pub fn with_prefix(
        store: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        bucket_size: u32,
        refill_rate_per_second: f64,
        key_prefix: &'static str,
    ) -> Self {
        Self {
            store,
            clock,
            bucket_size,
            refill_interval_ms: 1000.0 / refill_rate_per_second,
            key_prefix,
        }
    }
}

#[async_trait]
impl RateLimiter for TokenBucketLimiter {
    async fn check_with_cost(
        &self,
        client_key: &str,
        cost: f64,
    ) -> Result<RateLimitResult, KvError> {
        let key = format!("{}{client_key}", self.key_prefix);
        let now = self.clock.now_ms();

        let mut state = match self.store.get(&key).await? {
            Some(raw) => decode_json::<BucketState>(&key, &raw)?,
            None => BucketState {
                tokens: self.bucket_size as f64,
                last_update_ms: now,
            },
        };

        // Whole elapsed intervals only; the remainder is discarded
        let elapsed = (now - state.last_update_ms).max(0) as f64;
        let refill_count = (elapsed / self.refill_interval_ms).floor();
        state.tokens = (state.tokens + refill_count).min(self.bucket_size as f64);

        if state.tokens < cost {
            let deficit = cost - state.tokens;
            let retry_after = (deficit * self.refill_interval_ms / 1000.0).ceil() as u64;
            trace!(key = %key, tokens = state.tokens, cost, "token bucket empty");
            return Ok(RateLimitResult::denied(
                self.bucket_size,
                now + retry_after as i64 * 1000,
                retry_after,
            ));
        }

        state.tokens -= cost;
        state.last_update_ms = now;
        let remaining = state.tokens.floor() as u32;

        self.store
            .put(&key, encode_json(&key, &state)?, RECORD_TTL)
            .await?;

        Ok(RateLimitResult::allowed(
            remaining,
            self.bucket_size,
            now + self.refill_interval_ms.ceil() as i64,
        ))
    }
}
