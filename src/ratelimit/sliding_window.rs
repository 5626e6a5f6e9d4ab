//! Sliding window limiter
//!
//! Keeps the arrival timestamps of the last `window_ms` milliseconds per
//! client and admits a request only while fewer than `limit` survive.
//! Unlike the fixed window this prevents the 2x burst possible when a spike
//! straddles a window boundary.

use super::{secs_until, RateLimiter, RateLimitResult};
use crate::clock::Clock;
use crate::store::{decode_json, encode_json, KvError, KvStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

const KEY_PREFIX: &str = "rl:sw:";

#[derive(Debug, Default, Serialize, Deserialize)]
struct WindowState {
    /// Arrival timestamps within the window, oldest first
    timestamps: Vec<i64>,
    last_update_ms: i64,
}

/// KV-backed sliding window over request arrival times.
pub struct SlidingWindowLimiter {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    limit: u32,
    window_ms: i64,
}

impl SlidingWindowLimiter {
    /// Create a limiter admitting `limit` requests per `window_seconds`.
    pub fn new(
        store: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        limit: u32,
        window_seconds: u64,
    ) -> Self {
        Self {
            store,
            clock,
            limit,
            window_ms: (window_seconds * 1000) as i64,
        }
    }

    /// Record TTL: the window itself plus a minute of slack for clock skew.
    fn record_ttl(&self) -> Duration {
        Duration::from_secs((self.window_ms as u64 + 999) / 1000 + 60)
    }
}

#[async_trait]
impl RateLimiter for SlidingWindowLimiter {
    async fn check_with_cost(
        &self,
        client_key: &str,
        _cost: f64,
    ) -> Result<RateLimitResult, KvError> {
        let key = format!("{KEY_PREFIX}{client_key}");
        let now = self.clock.now_ms();
        let window_start = now - self.window_ms;

        let mut state = match self.store.get(&key).await? {
            Some(raw) => decode_json::<WindowState>(&key, &raw)?,
            None => WindowState::default(),
        };

        // Drop arrivals that have left the window
        state.timestamps.retain(|&t| t > window_start);

        if state.timestamps.len() >= self.limit as usize {
            // Oldest surviving arrival dictates when a slot frees up
            let oldest = state.timestamps.first().copied().unwrap_or(now);
            let reset_at_ms = oldest + self.window_ms;
            trace!(key = %key, count = state.timestamps.len(), "sliding window full");
            return Ok(RateLimitResult::denied(
                self.limit,
                reset_at_ms,
                secs_until(reset_at_ms - now),
            ));
        }

        state.timestamps.push(now);
        state.last_update_ms = now;
        let count = state.timestamps.len() as u32;

        self.store
            .put(&key, encode_json(&key, &state)?, self.record_ttl())
            .await?;

        Ok(RateLimitResult::allowed(
            self.limit - count,
            self.limit,
            now + self.window_ms,
        ))
    }
}
