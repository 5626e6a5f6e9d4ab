//! Policy pipeline middleware stack
//!
//! Fixed order per request: request id, entry/exit logging, CORS
//! (preflight answered here), client identification, rate limiting and
//! quota, authentication, then the route handler or forwarder. The metrics
//! recorder sits outside the limiter so denials are recorded too.

mod auth;
mod identity;
mod rate_limit;
mod recorder;
mod request_id;

pub use identity::ClientId;
pub use request_id::RequestId;

use crate::server::AppState;
use axum::http::{HeaderName, HeaderValue, Method};
use axum::Router;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

/// Apply the policy pipeline to a router. The first layer in the builder
/// is the outermost, so requests traverse top-down in the order listed in
/// the module docs.
pub fn apply_middleware(router: Router, state: AppState) -> Router {
    let pipeline = ServiceBuilder::new()
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            recorder::metrics_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            identity::identity_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state,
            auth::auth_middleware,
        ));

    router.layer(pipeline)
}

/// CORS policy from server config. Preflight OPTIONS requests are answered
/// by this layer with the allowed methods and headers; `X-Request-Id` is
/// exposed so browser clients can correlate.
fn cors_layer(state: &AppState) -> CorsLayer {
    let config = &state.config.server;
    let origins = &config.cors_origins;

    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static("x-request-id")])
        .max_age(Duration::from_secs(config.cors_max_age))
}
