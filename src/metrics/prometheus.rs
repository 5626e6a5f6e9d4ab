//! Prometheus text exposition

use super::collector::MetricsCollector;

impl MetricsCollector {
    /// Render the whole buffer in Prometheus text format.
    ///
    /// Stable names: `gateway_requests_total`, `gateway_errors_total`,
    /// `gateway_latency_ms{quantile=...}` and
    /// `gateway_upstream_healthy{upstream=...}`.
    pub fn to_prometheus(&self) -> String {
        let metrics = self.snapshot();

        let total = metrics.len() as u64;
        let errors = metrics
            .iter()
            .filter(|m| !(200..400).contains(&m.status_code))
            .count() as u64;

        let mut latencies: Vec<u64> = metrics.iter().map(|m| m.latency_ms).collect();
        latencies.sort_unstable();

        let mut lines = Vec::new();

        lines.push("# HELP gateway_requests_total Total requests handled by the gateway".to_string());
        lines.push("# TYPE gateway_requests_total counter".to_string());
        lines.push(format!("gateway_requests_total {total}"));

        lines.push("# HELP gateway_errors_total Total non-success responses".to_string());
        lines.push("# TYPE gateway_errors_total counter".to_string());
        lines.push(format!("gateway_errors_total {errors}"));

        lines.push("# HELP gateway_latency_ms Request latency quantiles in milliseconds".to_string());
        lines.push("# TYPE gateway_latency_ms summary".to_string());
        for (quantile, p) in [("0.5", 50.0), ("0.95", 95.0), ("0.99", 99.0)] {
            lines.push(format!(
                "gateway_latency_ms{{quantile=\"{quantile}\"}} {}",
                nearest_rank(&latencies, p)
            ));
        }

        let upstreams = self.all_upstream_health();
        if !upstreams.is_empty() {
            lines.push("# HELP gateway_upstream_healthy Upstream health status (1 healthy, 0 unhealthy)".to_string());
            lines.push("# TYPE gateway_upstream_healthy gauge".to_string());
            for health in upstreams {
                lines.push(format!(
                    "gateway_upstream_healthy{{upstream=\"{}\"}} {}",
                    health.upstream,
                    u8::from(health.healthy)
                ));
            }
        }

        let mut body = lines.join("\n");
        body.push('\n');
        body
    }
}

fn nearest_rank(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (p / 100.0 * sorted.len() as f64).ceil() as usize;
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}
