//! End-to-end limiter, quota and metrics scenarios driven through the
//! public API with a hand-driven clock and the in-memory store.

use edge_gateway::clock::{Clock, ManualClock};
use edge_gateway::config::QuotaConfig;
use edge_gateway::metrics::{MetricsCollector, RequestMetric};
use edge_gateway::quota::{QuotaManager, QuotaPeriod};
use edge_gateway::ratelimit::{
    AdaptiveLimiter, CompositeLimiter, FixedWindowLimiter, RateLimiter, SlidingWindowLimiter,
    TokenBucketLimiter,
};
use edge_gateway::store::MemoryStore;
use std::sync::Arc;

// Aligned to minute and second boundaries
const T0: i64 = 1_700_000_400_000;

fn harness() -> (Arc<ManualClock>, Arc<MemoryStore>) {
    let clock = ManualClock::shared(T0);
    let store = Arc::new(MemoryStore::new(clock.clone()));
    (clock, store)
}

#[tokio::test]
async fn token_bucket_burst_then_refill() {
    let (clock, store) = harness();
    let limiter = TokenBucketLimiter::new(store, clock.clone(), 10, 1.0);

    // 15 instant requests: 10 admitted, 5 denied with a bounded retry hint
    let mut outcomes = Vec::new();
    for _ in 0..15 {
        outcomes.push(limiter.check("client").await.unwrap());
    }
    assert!(outcomes[..10].iter().all(|r| r.allowed));
    for denied in &outcomes[10..] {
        assert!(!denied.allowed);
        let retry = denied.retry_after_secs.unwrap();
        assert!((1..=5).contains(&retry), "retry_after {retry} out of range");
    }

    // After 5 quiet seconds exactly 5 more requests fit
    clock.advance(5_000);
    for _ in 0..5 {
        assert!(limiter.check("client").await.unwrap().allowed);
    }
    assert!(!limiter.check("client").await.unwrap().allowed);
}

#[tokio::test]
async fn sliding_window_blocks_the_boundary_burst_fixed_window_admits_it() {
    let (clock, store) = harness();
    let sliding = SlidingWindowLimiter::new(store.clone(), clock.clone(), 5, 1);
    let fixed = FixedWindowLimiter::new(store, clock.clone(), 5, 1);

    // 5 requests at t=900ms into the window
    clock.advance(900);
    for _ in 0..5 {
        assert!(sliding.check("c").await.unwrap().allowed);
        assert!(fixed.check("c").await.unwrap().allowed);
    }

    // 5 more at t=1100ms: the fixed window rolled over and admits all of
    // them (the documented 2x boundary burst); the sliding window still
    // sees the first batch inside its moving interval and denies
    clock.advance(200);
    for _ in 0..5 {
        assert!(!sliding.check("c").await.unwrap().allowed);
        assert!(fixed.check("c").await.unwrap().allowed);
    }
}

#[tokio::test]
async fn quota_rollover_across_minute_and_daily_gates() {
    let (clock, store) = harness();
    let quota = QuotaManager::new(
        store,
        clock.clone(),
        QuotaConfig {
            enabled: true,
            per_minute: 3,
            daily: 5,
            monthly: 10,
        },
    );

    // Three requests pass, the fourth trips the minute gate
    for _ in 0..3 {
        assert!(quota.check_and_increment("user").await.unwrap().allowed);
    }
    let denied = quota.check_and_increment("user").await.unwrap();
    assert!(!denied.allowed);
    assert_eq!(denied.exceeded, Some(QuotaPeriod::Minute));

    // Next minute: counters roll, daily budget carries
    clock.advance(60_000);
    let check = quota.check_and_increment("user").await.unwrap();
    assert!(check.allowed);
    assert_eq!(check.minute.used, 1);
    assert_eq!(check.daily.used, 4);
    assert_eq!(check.monthly.used, 4);

    // Fifth daily request passes; the sixth trips the daily gate with the
    // minute gate still open
    assert!(quota.check_and_increment("user").await.unwrap().allowed);
    let denied = quota.check_and_increment("user").await.unwrap();
    assert!(!denied.allowed);
    assert_eq!(denied.exceeded, Some(QuotaPeriod::Daily));
    assert_eq!(denied.daily.used, 5);
}

#[tokio::test]
async fn adaptive_throttling_reprices_under_load() {
    let (clock, store) = harness();
    let limiter = AdaptiveLimiter::new(store, clock.clone(), 100, 10.0);

    // 95% load maps to factor 0.2: each request costs 5 tokens
    limiter.update_load_factor(95.0, 100.0).await.unwrap();

    let mut admitted = 0;
    loop {
        let result = limiter.check("client").await.unwrap();
        if !result.allowed {
            break;
        }
        admitted += 1;
        assert!(admitted <= 100, "limiter failed to deny");
    }
    assert_eq!(admitted, 20);
}

#[tokio::test]
async fn composite_stack_denies_on_highest_priority_first() {
    let (clock, store) = harness();

    let mut composite = CompositeLimiter::new();
    composite.add(
        "sw",
        Arc::new(SlidingWindowLimiter::new(store.clone(), clock.clone(), 2, 10)),
        10,
    );
    composite.add(
        "tb",
        Arc::new(TokenBucketLimiter::new(store, clock, 100, 10.0)),
        1,
    );

    assert!(composite.check("client", 1.0).await.unwrap().result.allowed);
    assert!(composite.check("client", 1.0).await.unwrap().result.allowed);

    // The token bucket has 98 tokens left, yet the strict sliding window
    // is probed first and its denial wins
    let check = composite.check("client", 1.0).await.unwrap();
    assert!(!check.result.allowed);
    assert_eq!(check.limiter_name.as_deref(), Some("sw"));
}

#[tokio::test]
async fn prometheus_export_matches_recorded_traffic() {
    let (clock, _store) = harness();
    let collector = MetricsCollector::new(clock.clone(), 10_000);

    // Latencies 10..=100ms; statuses 200 x8, 500 x2
    for i in 1..=10u64 {
        collector.record(RequestMetric {
            path: "/api/widgets".to_string(),
            method: "GET".to_string(),
            status_code: if i <= 8 { 200 } else { 500 },
            latency_ms: i * 10,
            timestamp_ms: clock.now_ms(),
            upstream: None,
            cached: false,
            rate_limit: None,
        });
    }

    let text = collector.to_prometheus();
    assert!(text.contains("gateway_requests_total 10"));
    assert!(text.contains("gateway_errors_total 2"));
    assert!(text.contains("gateway_latency_ms{quantile=\"0.5\"} 50"));
    assert!(text.contains("gateway_latency_ms{quantile=\"0.95\"} 100"));

    // Every quantile line corresponds to a computed percentile
    let aggregated = collector.get_aggregated(5);
    assert_eq!(aggregated.latency.p50_ms, 50);
    assert_eq!(aggregated.latency.p95_ms, 100);
    assert_eq!(aggregated.latency.p99_ms, 100);
}

#[tokio::test]
async fn single_key_admission_is_bounded_over_the_window() {
    let (clock, store) = harness();
    let limiter = SlidingWindowLimiter::new(store, clock.clone(), 10, 60);

    // Serialised access over one window never admits more than the limit,
    // regardless of arrival pattern
    let mut admitted = 0;
    for _ in 0..6 {
        for _ in 0..5 {
            if limiter.check("c").await.unwrap().allowed {
                admitted += 1;
            }
        }
        clock.advance(5_000);
    }
    assert_eq!(admitted, 10);
}
