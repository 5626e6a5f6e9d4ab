//! Client identification
//!
//! Resolves the client key that scopes limiter and quota state: the API
//! key when one is presented, otherwise the peer address (forwarded header
//! first, then the socket), otherwise the literal `anonymous`.

use crate::server::AppState;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;

/// Client key carried through request extensions.
#[derive(Debug, Clone)]
pub struct ClientId(pub String);

impl ClientId {
    /// Fallback identity for requests with no credentials and no peer info.
    pub const ANONYMOUS: &'static str = "anonymous";
}

/// Resolve and attach the [`ClientId`] extension.
pub async fn identity_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let client = extract_client_key(&state, &req);
    req.extensions_mut().insert(ClientId(client));
    next.run(req).await
}

fn extract_client_key(state: &AppState, req: &Request) -> String {
    if let Some(key) = req
        .headers()
        .get(&state.config.auth.api_key_header)
        .and_then(|v| v.to_str().ok())
        .filter(|k| !k.is_empty())
    {
        return key.to_string();
    }

    // First hop of the forwarded chain identifies the original peer
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next().map(str::trim).filter(|s| !s.is_empty()) {
            return first.to_string();
        }
    }

    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }

    ClientId::ANONYMOUS.to_string()
}
