//! Main server implementation for the edge gateway

use crate::{
    api,
    clock::{Clock, SystemClock},
    config::{Config, LimitStrategy, RateLimitPolicy, StoreBackend},
    error::{Error, Result},
    metrics::MetricsCollector,
    proxy::Forwarder,
    quota::QuotaManager,
    ratelimit::{
        AdaptiveLimiter, CompositeLimiter, FixedWindowLimiter, LeakyBucketLimiter, RateLimiter,
        RateLimitResult, SlidingWindowLimiter, TokenBucketLimiter,
    },
    store::{KvError, KvStore, MemoryStore},
};
use async_trait::async_trait;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

/// Main server structure
pub struct Server {
    config: Arc<Config>,
    app: Router,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,

    /// Shared KV store backing limiter and quota state
    pub store: Arc<dyn KvStore>,

    /// Composite limiter probed by the policy pipeline
    pub limiter: Arc<CompositeLimiter>,

    /// Adaptive limiter handle for the load sampler, when enabled
    pub adaptive: Option<Arc<AdaptiveLimiter>>,

    /// Quota manager, when enabled
    pub quota: Option<Arc<QuotaManager>>,

    /// Metrics collector and upstream health map
    pub collector: Arc<MetricsCollector>,

    /// Upstream forwarder
    pub forwarder: Arc<Forwarder>,

    /// Time source
    pub clock: Arc<dyn Clock>,

    /// HTTP client for upstream requests
    pub http_client: reqwest::Client,
}

impl AppState {
    /// Assemble the application state from configuration and the injected
    /// clock and store. Spawns nothing; background tasks are started
    /// separately so tests can drive a fully wired state synchronously.
    pub fn new(config: Config, clock: Arc<dyn Clock>, store: Arc<dyn KvStore>) -> Result<Self> {
        let config = Arc::new(config);

        let collector = Arc::new(MetricsCollector::new(
            clock.clone(),
            config.telemetry.max_metrics,
        ));

        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(Error::HttpClient)?;

        let forwarder = Arc::new(Forwarder::new(
            http_client.clone(),
            config.upstream.backend_url.clone(),
            config.upstream.failure_threshold,
            collector.clone(),
        ));

        let mut limiter = CompositeLimiter::new();
        for policy in &config.rate_limit.policies {
            limiter.add(
                policy.name.clone(),
                build_policy_limiter(policy, store.clone(), clock.clone()),
                policy.priority,
            );
        }

        let adaptive = if config.rate_limit.adaptive.enabled {
            let adaptive = Arc::new(AdaptiveLimiter::new(
                store.clone(),
                clock.clone(),
                config.rate_limit.adaptive.bucket_size,
                config.rate_limit.adaptive.refill_rate_per_second,
            ));
            limiter.add(
                "adaptive",
                adaptive.clone() as Arc<dyn RateLimiter>,
                config.rate_limit.adaptive.priority,
            );
            Some(adaptive)
        } else {
            None
        };

        let quota = config.quota.enabled.then(|| {
            Arc::new(QuotaManager::new(
                store.clone(),
                clock.clone(),
                config.quota.clone(),
            ))
        });

        Ok(Self {
            config,
            store,
            limiter: Arc::new(limiter),
            adaptive,
            quota,
            collector,
            forwarder,
            clock,
            http_client,
        })
    }

    /// Start the upstream health probe loop and, when the adaptive limiter
    /// is enabled, the load sampler.
    pub fn spawn_background_tasks(&self) {
        let mut upstreams = vec![self.config.upstream.backend_url.clone()];
        for service in &self.config.upstream.services {
            if !upstreams.contains(&service.url) {
                upstreams.push(service.url.clone());
            }
        }

        let collector = self.collector.clone();
        let health_path = self.config.upstream.health_path.clone();
        let interval = self.config.health_check_interval();
        let timeout = self.config.health_check_timeout();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                for upstream in &upstreams {
                    let health = collector.check_upstream(upstream, &health_path, timeout).await;
                    if !health.healthy {
                        warn!(
                            upstream = %upstream,
                            failures = health.consecutive_failures,
                            "upstream probe failed"
                        );
                    }
                }
            }
        });

        if let Some(adaptive) = &self.adaptive {
            let adaptive = adaptive.clone();
            let collector = self.collector.clone();
            let max_load = self.config.rate_limit.adaptive.max_load;
            let interval = self.config.adaptive_update_interval();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                    let current = collector.get_aggregated(1).requests.total as f64;
                    if let Err(e) = adaptive.update_load_factor(current, max_load).await {
                        warn!(error = %e, "failed to update load factor");
                    }
                }
            });
        }
    }
}

impl Server {
    /// Create a new server instance
    pub async fn new(config: Config) -> Result<Self> {
        info!("Initializing edge gateway server");

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store: Arc<dyn KvStore> = match config.store.backend {
            StoreBackend::Memory => Arc::new(MemoryStore::new(clock.clone())),
        };

        let state = AppState::new(config, clock, store)?;
        state.spawn_background_tasks();

        let config = state.config.clone();
        let app = api::router(state);

        Ok(Self { config, app })
    }

    /// Run the server until shutdown signal
    pub async fn run(self) -> Result<()> {
        let addr = self.config.server.bind_address;

        info!("Starting HTTP server on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Internal {
                message: format!("failed to bind to address {addr}: {e}"),
            })?;

        info!("Edge gateway listening on {}", addr);

        axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::Internal {
            message: format!("server error: {e}"),
        })?;

        Ok(())
    }
}

/// Build one policy's limiter from its configuration.
fn build_policy_limiter(
    policy: &RateLimitPolicy,
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
) -> Arc<dyn RateLimiter> {
    let rate = policy.limit as f64 / policy.window_seconds.max(1) as f64;
    let capacity = policy.burst.unwrap_or(policy.limit);

    let limiter: Arc<dyn RateLimiter> = match policy.strategy {
        LimitStrategy::SlidingWindow => Arc::new(SlidingWindowLimiter::new(
            store,
            clock,
            policy.limit,
            policy.window_seconds,
        )),
        LimitStrategy::TokenBucket => {
            Arc::new(TokenBucketLimiter::new(store, clock, capacity, rate))
        }
        LimitStrategy::LeakyBucket => {
            Arc::new(LeakyBucketLimiter::new(store, clock, capacity, rate))
        }
        LimitStrategy::FixedWindow => Arc::new(FixedWindowLimiter::new(
            store,
            clock,
            policy.limit,
            policy.window_seconds,
        )),
    };

    match policy.cost_per_request {
        Some(cost) if policy.strategy == LimitStrategy::TokenBucket && cost > 0.0 => {
            Arc::new(ScaledCost { limiter, cost })
        }
        _ => limiter,
    }
}

/// Multiplies every check's cost by a fixed factor. Wraps token-bucket
/// policies configured with `cost_per_request`.
struct ScaledCost {
    limiter: Arc<dyn RateLimiter>,
    cost: f64,
}

#[async_trait]
impl RateLimiter for ScaledCost {
    async fn check_with_cost(
        &self,
        client_key: &str,
        cost: f64,
    ) -> std::result::Result<RateLimitResult, KvError> {
        self.limiter.check_with_cost(client_key, cost * self.cost).await
    }
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            warn!("Received terminate signal, shutting down");
        },
    }
}
