//! API module: routes, middleware stack and response types

pub mod middleware;
pub mod routes;
pub mod types;

use crate::error::Error;
use crate::server::AppState;
use axum::{
    routing::{any, get},
    Router,
};

/// Build the complete application router with the policy pipeline applied.
pub fn router(state: AppState) -> Router {
    let metrics_path = state.config.telemetry.metrics_path.clone();
    let enable_metrics = state.config.telemetry.enable_metrics;

    let mut router = Router::new()
        .route("/", get(routes::meta::root))
        .route("/health", get(routes::health::health_check))
        .route("/api/echo", any(routes::meta::echo))
        .route("/api/services", get(routes::meta::services))
        .route("/api/version", get(routes::meta::version))
        .route("/api/metrics", get(routes::metrics::aggregated))
        .route("/api/metrics/timeseries", get(routes::metrics::time_series))
        .route("/api/ai/*path", any(routes::proxy::forward_ai))
        .route("/api/*path", any(routes::proxy::forward_any))
        .fallback(not_found);

    if enable_metrics {
        router = router.route(&metrics_path, get(routes::metrics::prometheus));
    }

    let router = router.with_state(state.clone());
    middleware::apply_middleware(router, state)
}

/// JSON 404 for unknown routes.
async fn not_found(uri: axum::http::Uri) -> Error {
    Error::NotFound {
        resource: uri.path().to_string(),
    }
}
