//! Proxy route handlers
//!
//! Policy-cleared requests under `/api/*` are forwarded to the configured
//! backend with their path below the prefix preserved; `/api/ai/*` is
//! rewritten onto the backend's `/ai/*` surface.

use crate::error::{Error, Result};
use crate::server::AppState;
use axum::{
    body::Body,
    extract::{ConnectInfo, Path, Request, State},
    http::Response,
};
use std::net::SocketAddr;

/// Largest request body the gateway buffers for forwarding.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Pass-through forwarding for `/api/*`.
pub async fn forward_any(
    State(state): State<AppState>,
    Path(rest): Path<String>,
    req: Request,
) -> Result<Response<Body>> {
    let method = req.method().clone();
    let headers = req.headers().clone();
    let client_addr = peer_addr(&req);
    let rest = with_query(&rest, req.uri().query());

    let body = axum::body::to_bytes(req.into_body(), MAX_BODY_BYTES)
        .await
        .map_err(|e| Error::Internal {
            message: format!("failed to read request body: {e}"),
        })?;

    state
        .forwarder
        .forward(method, &rest, &headers, body, client_addr.as_deref())
        .await
}

/// Rewrite forwarding for `/api/ai/*`.
pub async fn forward_ai(
    State(state): State<AppState>,
    Path(rest): Path<String>,
    req: Request,
) -> Result<Response<Body>> {
    let method = req.method().clone();
    let headers = req.headers().clone();
    let rest = with_query(&rest, req.uri().query());

    let body = axum::body::to_bytes(req.into_body(), MAX_BODY_BYTES)
        .await
        .map_err(|e| Error::Internal {
            message: format!("failed to read request body: {e}"),
        })?;

    state.forwarder.forward_ai(method, &rest, &headers, body).await
}

fn peer_addr(req: &Request) -> Option<String> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

fn with_query(rest: &str, query: Option<&str>) -> String {
    match query {
        Some(q) if !q.is_empty() => format!("{rest}?{q}"),
        _ => rest.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_query() {
        assert_eq!(with_query("widgets", Some("a=1")), "widgets?a=1");
        assert_eq!(with_query("widgets", None), "widgets");
        assert_eq!(with_query("widgets", Some("")), "widgets");
    }
}
