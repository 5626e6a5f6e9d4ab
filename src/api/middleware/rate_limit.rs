//! Rate limit and quota enforcement middleware
//!
//! Runs the composite limiter, then the quota manager, for requests under
//! the configured path prefix. Denials answer 429 with the rate-limit
//! header set and a JSON body; KV failures fail open so a store outage
//! degrades enforcement, not availability. Allowed responses are decorated
//! with `X-RateLimit-*` from the governing (lowest-priority) limiter.

use super::identity::ClientId;
use crate::metrics::RateLimitInfo;
use crate::quota::{QuotaCheck, QuotaPeriod};
use crate::ratelimit::RateLimitResult;
use crate::server::AppState;
use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Datelike, TimeZone, Utc};
use serde_json::json;
use tracing::warn;

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let config = &state.config.rate_limit;
    if !config.enabled || !req.uri().path().starts_with(config.path_prefix.as_str()) {
        return next.run(req).await;
    }

    let client = req
        .extensions()
        .get::<ClientId>()
        .map(|c| c.0.clone())
        .unwrap_or_else(|| ClientId::ANONYMOUS.to_string());

    // Composite limiter; KV trouble fails open
    let check = if state.limiter.is_empty() {
        None
    } else {
        match state.limiter.check(&client, 1.0).await {
            Ok(check) => {
                if !check.result.allowed {
                    return deny_response(&check.result, check.limiter_name.as_deref());
                }
                Some(check.result)
            }
            Err(e) => {
                warn!(client = %client, error = %e, "rate limit check failed, failing open");
                None
            }
        }
    };

    // Quota gate, same fail-open contract
    if let Some(quota) = &state.quota {
        match quota.check_and_increment(&client).await {
            Ok(outcome) if !outcome.allowed => {
                return quota_deny_response(&outcome, state.clock.now_ms());
            }
            Ok(_) => {}
            Err(e) => {
                warn!(client = %client, error = %e, "quota check failed, failing open");
            }
        }
    }

    let mut response = next.run(req).await;
    if let Some(result) = check {
        decorate(&mut response, &result);
        response.extensions_mut().insert(RateLimitInfo {
            limit: result.limit,
            remaining: result.remaining,
        });
    }
    response
}

/// Attach `X-RateLimit-Limit` / `-Remaining` / `-Reset` (unix seconds).
fn decorate(response: &mut Response, result: &RateLimitResult) {
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", int_header(result.limit as i64));
    headers.insert("x-ratelimit-remaining", int_header(result.remaining as i64));
    headers.insert("x-ratelimit-reset", int_header(result.reset_at_ms / 1000));
}

fn deny_response(result: &RateLimitResult, limiter_name: Option<&str>) -> Response {
    let retry_after = result.retry_after_secs.unwrap_or(1);
    let message = match limiter_name {
        Some(name) => format!("rate limit exceeded ({name})"),
        None => "rate limit exceeded".to_string(),
    };

    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({
            "error": "Rate Limit Exceeded",
            "message": message,
            "retryAfter": retry_after,
        })),
    )
        .into_response();

    decorate(&mut response, result);
    response
        .headers_mut()
        .insert("retry-after", int_header(retry_after as i64));
    response
}

fn quota_deny_response(outcome: &QuotaCheck, now_ms: i64) -> Response {
    let period = outcome.exceeded.unwrap_or(QuotaPeriod::Minute);
    let retry_after = seconds_until_period_end(period, now_ms);
    let usage = match period {
        QuotaPeriod::Minute => outcome.minute,
        QuotaPeriod::Daily => outcome.daily,
        QuotaPeriod::Monthly => outcome.monthly,
    };
    let period_name = match period {
        QuotaPeriod::Minute => "minute",
        QuotaPeriod::Daily => "daily",
        QuotaPeriod::Monthly => "monthly",
    };

    let result = RateLimitResult::denied(usage.limit, now_ms + retry_after as i64 * 1000, retry_after);
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({
            "error": "Quota Exceeded",
            "message": format!("{period_name} quota exceeded"),
            "exceededQuota": period_name,
            "retryAfter": retry_after,
        })),
    )
        .into_response();

    decorate(&mut response, &result);
    response
        .headers_mut()
        .insert("retry-after", int_header(retry_after as i64));
    response
}

/// Seconds until the period holding the exceeded counter rolls over.
fn seconds_until_period_end(period: QuotaPeriod, now_ms: i64) -> u64 {
    let now_secs = now_ms / 1000;
    match period {
        QuotaPeriod::Minute => (60 - now_secs % 60).max(1) as u64,
        QuotaPeriod::Daily => (86_400 - now_secs % 86_400).max(1) as u64,
        QuotaPeriod::Monthly => {
            let now = Utc
                .timestamp_millis_opt(now_ms)
                .single()
                .unwrap_or_else(Utc::now);
            let (next_year, next_month) = if now.month() == 12 {
                (now.year() + 1, 1)
            } else {
                (now.year(), now.month() + 1)
            };
            let rollover = Utc
                .with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
                .single()
                .map(|t| t.timestamp())
                .unwrap_or(now_secs + 86_400);
            (rollover - now_secs).max(1) as u64
        }
    }
}

fn int_header(value: i64) -> HeaderValue {
    HeaderValue::from_str(&value.to_string())
        .unwrap_or_else(|_| HeaderValue::from_static("0"))
}
