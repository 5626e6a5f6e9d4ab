//! Per-user quota enforcement
//!
//! Tracks minute/day/month usage ceilings per user, distinct from the
//! rolling rate limits: quotas are wall-clock periods. Counters reset the
//! moment their period identifier no longer matches the current one, so a
//! quiet user's first request of a new day clears stale state without any
//! background sweep. The minute gate runs first and blocks abusive bursts
//! before they erode the daily and monthly budgets.

use crate::clock::Clock;
use crate::config::QuotaConfig;
use crate::store::{decode_json, encode_json, KvError, KvStore};
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const KEY_PREFIX: &str = "quota:";

/// Outlives the longest period plus rollover slack.
const RECORD_TTL: Duration = Duration::from_secs(32 * 24 * 3600);

/// Quota period, in evaluation priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaPeriod {
    Minute,
    Daily,
    Monthly,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct QuotaState {
    minute_count: u32,
    /// Start of the minute bucket, unix ms
    minute_bucket_ms: i64,
    day_count: u32,
    /// YYYY-MM-DD
    day: String,
    month_count: u32,
    /// YYYY-MM
    month: String,
}

/// Usage against one period's ceiling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QuotaUsage {
    pub used: u32,
    pub limit: u32,
}

/// Outcome of a quota check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaCheck {
    pub allowed: bool,
    pub minute: QuotaUsage,
    pub daily: QuotaUsage,
    pub monthly: QuotaUsage,
    /// First period found exceeded, when denied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exceeded: Option<QuotaPeriod>,
}

/// Minute/day/month counters per user, stored in KV.
pub struct QuotaManager {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    config: QuotaConfig,
}

impl QuotaManager {
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>, config: QuotaConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Check all three ceilings for `user_id` and, when every one admits,
    /// increment them together. Denied requests do not consume quota.
    pub async fn check_and_increment(&self, user_id: &str) -> Result<QuotaCheck, KvError> {
        let key = format!("{KEY_PREFIX}{user_id}");
        let now = self.clock.now_ms();

        let minute_bucket_ms = (now / 60_000) * 60_000;
        let stamp = Utc
            .timestamp_millis_opt(now)
            .single()
            .unwrap_or_else(Utc::now);
        let day = stamp.format("%Y-%m-%d").to_string();
        let month = stamp.format("%Y-%m").to_string();

        let mut state = match self.store.get(&key).await? {
            Some(raw) => decode_json::<QuotaState>(&key, &raw)?,
            None => QuotaState::default(),
        };

        // Reset every counter whose period identifier rolled over
        if state.minute_bucket_ms != minute_bucket_ms {
            state.minute_count = 0;
            state.minute_bucket_ms = minute_bucket_ms;
        }
        if state.day != day {
            state.day_count = 0;
            state.day = day;
        }
        if state.month != month {
            state.month_count = 0;
            state.month = month;
        }

        // First exceeded period wins, minute gate first
        let exceeded = if state.minute_count >= self.config.per_minute {
            Some(QuotaPeriod::Minute)
        } else if state.day_count >= self.config.daily {
            Some(QuotaPeriod::Daily)
        } else if state.month_count >= self.config.monthly {
            Some(QuotaPeriod::Monthly)
        } else {
            None
        };

        if let Some(period) = exceeded {
            debug!(user = %user_id, ?period, "quota exceeded");
            return Ok(self.snapshot(&state, false, Some(period)));
        }

        state.minute_count += 1;
        state.day_count += 1;
        state.month_count += 1;

        self.store
            .put(&key, encode_json(&key, &state)?, RECORD_TTL)
            .await?;

        Ok(self.snapshot(&state, true, None))
    }

    fn snapshot(&self, state: &QuotaState, allowed: bool, exceeded: Option<QuotaPeriod>) -> QuotaCheck {
        QuotaCheck {
            allowed,
            minute: QuotaUsage {
                used: state.minute_count,
                limit: self.config.per_minute,
            },
            daily: QuotaUsage {
                used: state.day_count,
                limit: self.config.daily,
            },
            monthly: QuotaUsage {
                used: state.month_count,
                limit: self.config.monthly,
            },
            exceeded,
        }
    }
}
