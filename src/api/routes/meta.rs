//! Service descriptor, version, catalogue and echo handlers

use crate::api::types::{EchoResponse, ServiceDescriptor, ServiceStatus, VersionResponse};
use crate::server::AppState;
use axum::{
    body::Bytes,
    extract::{Request, State},
    Json,
};
use std::collections::BTreeMap;

/// Root service descriptor.
pub async fn root(State(_state): State<AppState>) -> Json<ServiceDescriptor> {
    Json(ServiceDescriptor {
        service: crate::SERVICE_NAME.to_string(),
        version: crate::VERSION.to_string(),
        description: "Edge API gateway: rate limiting, quota enforcement, proxying".to_string(),
        endpoints: vec![
            "/health".to_string(),
            "/metrics".to_string(),
            "/api/echo".to_string(),
            "/api/services".to_string(),
            "/api/version".to_string(),
            "/api/metrics".to_string(),
        ],
    })
}

/// Gateway version and environment.
pub async fn version(State(state): State<AppState>) -> Json<VersionResponse> {
    Json(VersionResponse {
        gateway: crate::VERSION.to_string(),
        environment: state.config.environment.clone(),
        runtime: "tokio".to_string(),
    })
}

/// Static service catalogue with current health.
pub async fn services(State(state): State<AppState>) -> Json<Vec<ServiceStatus>> {
    let catalogue = state
        .config
        .upstream
        .services
        .iter()
        .map(|entry| ServiceStatus {
            name: entry.name.clone(),
            url: entry.url.clone(),
            healthy: state
                .collector
                .upstream_health(&entry.url)
                .map(|h| h.healthy)
                .unwrap_or(true),
        })
        .collect();
    Json(catalogue)
}

/// Reflection endpoint: returns the request as the gateway saw it.
pub async fn echo(State(_state): State<AppState>, req: Request) -> Json<EchoResponse> {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let query = parse_query(req.uri().query().unwrap_or(""));

    let headers: BTreeMap<String, String> = req
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                value.to_str().unwrap_or("<binary>").to_string(),
            )
        })
        .collect();

    let body = axum::body::to_bytes(req.into_body(), crate::api::routes::proxy::MAX_BODY_BYTES)
        .await
        .unwrap_or_else(|_| Bytes::new());

    Json(EchoResponse {
        method,
        path,
        headers,
        query,
        body: String::from_utf8_lossy(&body).into_owned(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

fn parse_query(raw: &str) -> BTreeMap<String, String> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query() {
        let query = parse_query("a=1&b=two&flag");
        assert_eq!(query["a"], "1");
        assert_eq!(query["b"], "two");
        assert_eq!(query["flag"], "");
        assert!(parse_query("").is_empty());
    }
}
