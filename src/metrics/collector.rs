//! Request metrics collector

use super::{
    AggregatedMetrics, LatencyStats, PathStats, RequestCounts, RequestMetric, SlowEndpoint,
    TimeBucket, UpstreamHealth, UpstreamStats,
};
use crate::clock::Clock;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Bounded collector of request records plus the upstream health map.
///
/// Recording is the only mutation of the buffer; aggregation takes a
/// snapshot under the read lock and is pure, so two successive reads with
/// no intervening record are identical.
pub struct MetricsCollector {
    metrics: RwLock<Vec<RequestMetric>>,
    health: DashMap<String, UpstreamHealth>,
    max_metrics: usize,
    clock: Arc<dyn Clock>,
    client: reqwest::Client,
}

impl MetricsCollector {
    /// Create a collector bounded at `max_metrics` records.
    pub fn new(clock: Arc<dyn Clock>, max_metrics: usize) -> Self {
        Self {
            metrics: RwLock::new(Vec::new()),
            health: DashMap::new(),
            max_metrics: max_metrics.max(1),
            clock,
            client: reqwest::Client::builder().build().unwrap_or_default(),
        }
    }

    /// Append one record, evicting the oldest entries once the ring is full.
    pub fn record(&self, metric: RequestMetric) {
        let mut metrics = self.metrics.write();
        metrics.push(metric);
        if metrics.len() > self.max_metrics {
            let excess = metrics.len() - self.max_metrics;
            metrics.drain(..excess);
        }
    }

    /// Number of records currently buffered.
    pub fn len(&self) -> usize {
        self.metrics.read().len()
    }

    /// Whether no records are buffered.
    pub fn is_empty(&self) -> bool {
        self.metrics.read().is_empty()
    }

    /// Aggregate the records of the last `window_minutes`.
    pub fn get_aggregated(&self, window_minutes: u64) -> AggregatedMetrics {
        let cutoff = self.clock.now_ms() - (window_minutes * 60_000) as i64;
        let metrics = self.metrics.read();
        let window: Vec<&RequestMetric> =
            metrics.iter().filter(|m| m.timestamp_ms >= cutoff).collect();

        let mut counts = RequestCounts::default();
        let mut latencies: Vec<u64> = Vec::with_capacity(window.len());
        let mut paths: BTreeMap<String, (u64, u64, u64)> = BTreeMap::new();
        let mut status_codes: BTreeMap<u16, u64> = BTreeMap::new();
        let mut upstreams: BTreeMap<String, (u64, u64, u64)> = BTreeMap::new();

        for m in &window {
            counts.total += 1;
            if (200..400).contains(&m.status_code) {
                counts.success += 1;
            } else {
                counts.errors += 1;
            }
            if m.cached {
                counts.cached += 1;
            }
            if m.status_code == 429 {
                counts.rate_limited += 1;
            }

            latencies.push(m.latency_ms);
            *status_codes.entry(m.status_code).or_default() += 1;

            let path = paths.entry(m.path.clone()).or_default();
            path.0 += 1;
            path.1 += m.latency_ms;
            if m.status_code >= 400 {
                path.2 += 1;
            }

            if let Some(upstream) = &m.upstream {
                let entry = upstreams.entry(upstream.clone()).or_default();
                entry.0 += 1;
                entry.1 += m.latency_ms;
                if m.status_code >= 500 {
                    entry.2 += 1;
                }
            }
        }

        AggregatedMetrics {
            window_minutes,
            requests: counts,
            latency: latency_stats(&mut latencies),
            paths: paths
                .into_iter()
                .map(|(path, (count, total_latency, errors))| {
                    (
                        path,
                        PathStats {
                            count,
                            avg_latency_ms: total_latency as f64 / count as f64,
                            errors,
                        },
                    )
                })
                .collect(),
            status_codes,
            upstreams: upstreams
                .into_iter()
                .map(|(upstream, (count, total_latency, errors))| {
                    let healthy = self
                        .health
                        .get(&upstream)
                        .map(|h| h.healthy)
                        .unwrap_or(true);
                    (
                        upstream,
                        UpstreamStats {
                            count,
                            avg_latency_ms: total_latency as f64 / count as f64,
                            errors,
                            healthy,
                        },
                    )
                })
                .collect(),
        }
    }

    /// Bucket the last `window_minutes` into spans of `bucket_minutes`,
    /// sorted ascending by bucket start.
    pub fn get_time_series(&self, window_minutes: u64, bucket_minutes: u64) -> Vec<TimeBucket> {
        let bucket_ms = (bucket_minutes.max(1) * 60_000) as i64;
        let cutoff = self.clock.now_ms() - (window_minutes * 60_000) as i64;

        let metrics = self.metrics.read();
        let mut buckets: BTreeMap<i64, (u64, u64, u64)> = BTreeMap::new();

        for m in metrics.iter().filter(|m| m.timestamp_ms >= cutoff) {
            let start = (m.timestamp_ms / bucket_ms) * bucket_ms;
            let entry = buckets.entry(start).or_default();
            entry.0 += 1;
            entry.1 += m.latency_ms;
            if m.status_code >= 400 {
                entry.2 += 1;
            }
        }

        buckets
            .into_iter()
            .map(|(bucket_start_ms, (count, total_latency, errors))| TimeBucket {
                bucket_start_ms,
                count,
                errors,
                avg_latency_ms: total_latency as f64 / count as f64,
            })
            .collect()
    }

    /// The `limit` most requested paths across the whole buffer,
    /// most-requested first.
    pub fn get_top_paths(&self, limit: usize) -> Vec<(String, u64)> {
        let metrics = self.metrics.read();
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for m in metrics.iter() {
            *counts.entry(m.path.clone()).or_default() += 1;
        }

        let mut ranked: Vec<(String, u64)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(limit);
        ranked
    }

    /// Paths whose average latency exceeds `threshold_ms`, slowest first.
    pub fn get_slow_endpoints(&self, threshold_ms: u64) -> Vec<SlowEndpoint> {
        let metrics = self.metrics.read();
        let mut paths: BTreeMap<String, (u64, u64)> = BTreeMap::new();
        for m in metrics.iter() {
            let entry = paths.entry(m.path.clone()).or_default();
            entry.0 += 1;
            entry.1 += m.latency_ms;
        }

        let mut slow: Vec<SlowEndpoint> = paths
            .into_iter()
            .filter_map(|(path, (count, total_latency))| {
                let avg = total_latency as f64 / count as f64;
                (avg > threshold_ms as f64).then_some(SlowEndpoint {
                    path,
                    avg_latency_ms: avg,
                    count,
                })
            })
            .collect();
        slow.sort_by(|a, b| {
            b.avg_latency_ms
                .partial_cmp(&a.avg_latency_ms)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        slow
    }

    /// Probe `upstream` at `health_path` with a GET bounded by `timeout`.
    ///
    /// Success is any 2xx. Failures increment `consecutive_failures`; any
    /// success resets it to zero. The returned snapshot is also stored in
    /// the health map.
    pub async fn check_upstream(
        &self,
        upstream: &str,
        health_path: &str,
        timeout: Duration,
    ) -> UpstreamHealth {
        let url = format!(
            "{}{}",
            upstream.trim_end_matches('/'),
            if health_path.starts_with('/') {
                health_path.to_string()
            } else {
                format!("/{health_path}")
            }
        );

        let started_ms = self.clock.now_ms();
        let outcome = self.client.get(&url).timeout(timeout).send().await;
        let latency_ms = (self.clock.now_ms() - started_ms).max(0) as u64;

        let previous_failures = self
            .health
            .get(upstream)
            .map(|h| h.consecutive_failures)
            .unwrap_or(0);

        let health = match outcome {
            Ok(response) if response.status().is_success() => {
                debug!(upstream = %upstream, latency_ms, "upstream healthy");
                UpstreamHealth {
                    upstream: upstream.to_string(),
                    healthy: true,
                    latency_ms,
                    last_check_ms: self.clock.now_ms(),
                    consecutive_failures: 0,
                    error: None,
                }
            }
            Ok(response) => {
                warn!(upstream = %upstream, status = %response.status(), "upstream unhealthy");
                UpstreamHealth {
                    upstream: upstream.to_string(),
                    healthy: false,
                    latency_ms,
                    last_check_ms: self.clock.now_ms(),
                    consecutive_failures: previous_failures + 1,
                    error: Some(format!("unexpected status {}", response.status())),
                }
            }
            Err(e) => {
                warn!(upstream = %upstream, error = %e, "upstream health check failed");
                UpstreamHealth {
                    upstream: upstream.to_string(),
                    healthy: false,
                    latency_ms,
                    last_check_ms: self.clock.now_ms(),
                    consecutive_failures: previous_failures + 1,
                    error: Some(e.to_string()),
                }
            }
        };

        self.health.insert(upstream.to_string(), health.clone());
        health
    }

    /// Latest health snapshot for `upstream`, if it has ever been probed.
    pub fn upstream_health(&self, upstream: &str) -> Option<UpstreamHealth> {
        self.health.get(upstream).map(|h| h.clone())
    }

    /// Health snapshots for every known upstream.
    pub fn all_upstream_health(&self) -> Vec<UpstreamHealth> {
        let mut all: Vec<UpstreamHealth> = self.health.iter().map(|h| h.clone()).collect();
        all.sort_by(|a, b| a.upstream.cmp(&b.upstream));
        all
    }

    /// All buffered records, oldest first. Used by the Prometheus export.
    pub(super) fn snapshot(&self) -> Vec<RequestMetric> {
        self.metrics.read().clone()
    }
}

/// Nearest-rank percentile over a sorted slice: `sorted[⌈p/100 × n⌉ − 1]`,
/// bounded below by index zero.
fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (p / 100.0 * sorted.len() as f64).ceil() as usize;
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

fn latency_stats(latencies: &mut [u64]) -> LatencyStats {
    if latencies.is_empty() {
        return LatencyStats::default();
    }

    latencies.sort_unstable();
    let sum: u64 = latencies.iter().sum();

    LatencyStats {
        avg_ms: sum as f64 / latencies.len() as f64,
        min_ms: latencies[0],
        max_ms: latencies[latencies.len() - 1],
        p50_ms: percentile(latencies, 50.0),
        p95_ms: percentile(latencies, 95.0),
        p99_ms: percentile(latencies, 99.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::metrics::RateLimitInfo;

    fn collector(max: usize) -> (Arc<ManualClock>, MetricsCollector) {
        let clock = ManualClock::shared(1_700_000_000_000);
        (clock.clone(), MetricsCollector::new(clock, max))
    }

    fn metric(clock: &ManualClock, path: &str, status: u16, latency_ms: u64) -> RequestMetric {
        RequestMetric {
            path: path.to_string(),
            method: "GET".to_string(),
            status_code: status,
            latency_ms,
            timestamp_ms: clock.now_ms(),
            upstream: None,
            cached: false,
            rate_limit: None,
        }
    }

    #[test]
    fn test_ring_evicts_oldest() {
        let (clock, collector) = collector(3);

        for latency in [1, 2, 3, 4] {
            collector.record(metric(&clock, "/a", 200, latency));
        }

        assert_eq!(collector.len(), 3);
        let agg = collector.get_aggregated(60);
        assert_eq!(agg.latency.min_ms, 2);
        assert_eq!(agg.latency.max_ms, 4);
    }

    #[test]
    fn test_aggregation_counts() {
        let (clock, collector) = collector(100);

        collector.record(metric(&clock, "/a", 200, 10));
        collector.record(metric(&clock, "/a", 304, 20));
        collector.record(metric(&clock, "/b", 500, 30));
        collector.record(metric(&clock, "/b", 429, 40));
        let mut cached = metric(&clock, "/c", 200, 50);
        cached.cached = true;
        collector.record(cached);

        let agg = collector.get_aggregated(5);
        assert_eq!(agg.requests.total, 5);
        assert_eq!(agg.requests.success, 3);
        assert_eq!(agg.requests.errors, 2);
        assert_eq!(agg.requests.rate_limited, 1);
        assert_eq!(agg.requests.cached, 1);

        assert_eq!(agg.paths["/a"].count, 2);
        assert_eq!(agg.paths["/a"].errors, 0);
        assert_eq!(agg.paths["/b"].errors, 2);
        assert_eq!(agg.status_codes[&200], 2);
        assert_eq!(agg.status_codes[&429], 1);
    }

    #[test]
    fn test_window_filtering() {
        let (clock, collector) = collector(100);

        collector.record(metric(&clock, "/old", 200, 10));
        clock.advance(10 * 60_000);
        collector.record(metric(&clock, "/new", 200, 20));

        let agg = collector.get_aggregated(5);
        assert_eq!(agg.requests.total, 1);
        assert!(agg.paths.contains_key("/new"));

        let agg = collector.get_aggregated(15);
        assert_eq!(agg.requests.total, 2);
    }

    #[test]
    fn test_percentile_ordering_invariant() {
        let (clock, collector) = collector(100);

        for latency in [12, 7, 93, 41, 3, 68, 22, 55] {
            collector.record(metric(&clock, "/a", 200, latency));
        }

        let latency = collector.get_aggregated(5).latency;
        assert!(latency.p50_ms <= latency.p95_ms);
        assert!(latency.p95_ms <= latency.p99_ms);
        assert!(latency.p99_ms <= latency.max_ms);
        assert!(latency.min_ms <= latency.p50_ms);
    }

    #[test]
    fn test_percentiles_nearest_rank() {
        let (clock, collector) = collector(100);

        for latency in (1..=10).map(|i| i * 10) {
            collector.record(metric(&clock, "/a", 200, latency));
        }

        let latency = collector.get_aggregated(5).latency;
        assert_eq!(latency.p50_ms, 50);
        assert_eq!(latency.p95_ms, 100);
        assert_eq!(latency.p99_ms, 100);
        assert_eq!(latency.avg_ms, 55.0);
    }

    #[test]
    fn test_aggregation_is_pure() {
        let (clock, collector) = collector(100);

        collector.record(metric(&clock, "/a", 200, 10));
        collector.record(metric(&clock, "/b", 500, 20));

        let first = collector.get_aggregated(5);
        let second = collector.get_aggregated(5);
        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::to_value(&second).unwrap()
        );
    }

    #[test]
    fn test_time_series_buckets_sorted() {
        let (clock, collector) = collector(100);

        collector.record(metric(&clock, "/a", 200, 10));
        clock.advance(60_000);
        collector.record(metric(&clock, "/a", 500, 30));
        collector.record(metric(&clock, "/a", 200, 50));

        let series = collector.get_time_series(10, 1);
        assert_eq!(series.len(), 2);
        assert!(series[0].bucket_start_ms < series[1].bucket_start_ms);
        assert_eq!(series[0].count, 1);
        assert_eq!(series[1].count, 2);
        assert_eq!(series[1].errors, 1);
        assert_eq!(series[1].avg_latency_ms, 40.0);
    }

    #[test]
    fn test_top_paths_and_slow_endpoints() {
        let (clock, collector) = collector(100);

        for _ in 0..3 {
            collector.record(metric(&clock, "/popular", 200, 5));
        }
        collector.record(metric(&clock, "/slow", 200, 900));
        collector.record(metric(&clock, "/slow", 200, 1100));

        let top = collector.get_top_paths(1);
        assert_eq!(top, vec![("/popular".to_string(), 3)]);

        let slow = collector.get_slow_endpoints(500);
        assert_eq!(slow.len(), 1);
        assert_eq!(slow[0].path, "/slow");
        assert_eq!(slow[0].avg_latency_ms, 1000.0);
    }

    #[test]
    fn test_unknown_upstream_defaults_healthy() {
        let (clock, collector) = collector(100);

        let mut m = metric(&clock, "/a", 200, 10);
        m.upstream = Some("backend-1".to_string());
        collector.record(m);

        let agg = collector.get_aggregated(5);
        assert!(agg.upstreams["backend-1"].healthy);
    }

    #[test]
    fn test_rate_limit_info_roundtrips() {
        let (clock, collector) = collector(100);

        let mut m = metric(&clock, "/a", 200, 10);
        m.rate_limit = Some(RateLimitInfo {
            limit: 100,
            remaining: 42,
        });
        collector.record(m);

        assert_eq!(collector.snapshot()[0].rate_limit.unwrap().remaining, 42);
    }
}
