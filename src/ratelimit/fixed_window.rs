//! Fixed window limiter
//!
//! Buckets the timeline into windows of `window_ms` and counts requests per
//! window. Cheapest of the algorithms, with the documented weakness that up
//! to `2 x limit` requests may pass in an interval straddling a window
//! boundary.

use super::{secs_until, RateLimiter, RateLimitResult};
use crate::clock::Clock;
use crate::store::{decode_json, encode_json, KvError, KvStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

const KEY_PREFIX: &str = "rl:";

#[derive(Debug, Serialize, Deserialize)]
struct CounterState {
    count: u32,
    window_start_ms: i64,
}

/// KV-backed fixed window counter. The window start is part of the key, so
/// a new window always begins from a fresh record and stale ones expire via
/// TTL.
pub struct FixedWindowLimiter {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    limit: u32,
    window_ms: i64,
}

impl FixedWindowLimiter {
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

    fn record_ttl(&self) -> Duration {
        Duration::from_secs((self.window_ms as u64 + 999) / 1000 + 60)
    }
}

#[async_trait]
impl RateLimiter for FixedWindowLimiter {
    async fn check_with_cost(
        &self,
        client_key: &str,
        _cost: f64,
    ) -> Result<RateLimitResult, KvError> {
        let now = self.clock.now_ms();
        let window_start = (now / self.window_ms) * self.window_ms;
        let key = format!("{KEY_PREFIX}{client_key}:{window_start}");
        let reset_at_ms = window_start + self.window_ms;

        let mut state = match self.store.get(&key).await? {
            Some(raw) => decode_json::<CounterState>(&key, &raw)?,
            None => CounterState {
                count: 0,
                window_start_ms: window_start,
            },
        };

        if state.count >= self.limit {
            trace!(key = %key, count = state.count, "fixed window full");
            return Ok(RateLimitResult::denied(
                self.limit,
                reset_at_ms,
                secs_until(reset_at_ms - now),
            ));
        }

        state.count += 1;

        self.store
            .put(&key, encode_json(&key, &state)?, self.record_ttl())
            .await?;

        Ok(RateLimitResult::allowed(
            self.limit - state.count,
            self.limit,
            reset_at_ms,
        ))
    }
}
