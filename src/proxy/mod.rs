//! Upstream request forwarding
//!
//! Pass-through forwarding of policy-cleared requests to the configured
//! backend, plus the rewrite rule for the AI backend. Hop-by-hop headers
//! are stripped in both directions and the client address is appended to
//! `X-Forwarded-For`. Responses are tagged with `X-Upstream` so the
//! metrics recorder can attribute them.
//!
//! When the health probes have marked the backend down for
//! `failure_threshold` consecutive rounds the forwarder stops dialling and
//! answers 503 until a probe succeeds again.

use crate::error::{Error, Result};
use crate::metrics::MetricsCollector;
use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, Response};
use std::sync::Arc;
use tracing::{debug, warn};

/// Headers that must not cross the proxy in either direction.
const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Response header carrying the upstream that served the request.
pub const UPSTREAM_HEADER: &str = "X-Upstream";

/// Forwards requests to the configured backend.
pub struct Forwarder {
    client: reqwest::Client,
    backend_url: String,
    upstream_tag: String,
    failure_threshold: u32,
    collector: Arc<MetricsCollector>,
}

impl Forwarder {
    /// Create a forwarder dialling `backend_url` on the shared client.
    pub fn new(
        client: reqwest::Client,
        backend_url: impl Into<String>,
        failure_threshold: u32,
        collector: Arc<MetricsCollector>,
    ) -> Self {
        let backend_url = backend_url.into();
        let upstream_tag = reqwest::Url::parse(&backend_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| backend_url.clone());

        Self {
            client,
            backend_url,
            upstream_tag,
            failure_threshold,
            collector,
        }
    }

    /// Base URL requests are forwarded to.
    pub fn backend_url(&self) -> &str {
        &self.backend_url
    }

    /// Forward a request as-is. `rest` is the path below the proxied
    /// prefix, with its query string when present.
    pub async fn forward(
        &self,
        method: Method,
        rest: &str,
        headers: &HeaderMap,
        body: Bytes,
        client_addr: Option<&str>,
    ) -> Result<Response<Body>> {
        self.check_gate()?;

        let url = join_url(&self.backend_url, rest);
        debug!(method = %method, url = %url, "forwarding request");

        let mut request = self
            .client
            .request(method, &url)
            .headers(prepare_forward_headers(headers, client_addr));
        if !body.is_empty() {
            request = request.body(body);
        }

        let response = request.send().await.map_err(map_send_error)?;
        self.into_axum_response(response).await
    }

    /// Forward to the AI backend: path rewritten to `<backend>/ai/<rest>`,
    /// only `Authorization` and `Content-Type` carried over, body attached
    /// for non-GET methods.
    pub async fn forward_ai(
        &self,
        method: Method,
        rest: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<Response<Body>> {
        self.check_gate()?;

        let url = join_url(&self.backend_url, &format!("ai/{}", rest.trim_start_matches('/')));
        debug!(method = %method, url = %url, "forwarding ai request");

        let mut forward_headers = HeaderMap::new();
        for name in [header::AUTHORIZATION, header::CONTENT_TYPE] {
            if let Some(value) = headers.get(&name) {
                forward_headers.insert(name, value.clone());
            }
        }

        let is_get = method == Method::GET;
        let mut request = self.client.request(method, &url).headers(forward_headers);
        if !is_get && !body.is_empty() {
            request = request.body(body);
        }

        let response = request.send().await.map_err(map_send_error)?;
        self.into_axum_response(response).await
    }

    /// Deny forwarding while the backend is gated off by the health loop.
    fn check_gate(&self) -> Result<()> {
        if let Some(health) = self.collector.upstream_health(&self.backend_url) {
            if !health.healthy && health.consecutive_failures >= self.failure_threshold {
                warn!(
                    upstream = %self.backend_url,
                    failures = health.consecutive_failures,
                    "upstream gated off, short-circuiting"
                );
                return Err(Error::UpstreamUnavailable {
                    upstream: self.upstream_tag.clone(),
                });
            }
        }
        Ok(())
    }

    /// Rebuild the upstream response for the client: status preserved,
    /// hop-by-hop headers dropped, `X-Upstream` tag added.
    async fn into_axum_response(&self, response: reqwest::Response) -> Result<Response<Body>> {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(map_send_error)?;

        let mut builder = Response::builder().status(status);
        if let Some(response_headers) = builder.headers_mut() {
            for (name, value) in headers.iter() {
                if !is_hop_by_hop(name) {
                    response_headers.insert(name.clone(), value.clone());
                }
            }
            if let Ok(tag) = HeaderValue::from_str(&self.upstream_tag) {
                response_headers.insert(HeaderName::from_static("x-upstream"), tag);
            }
        }

        builder.body(Body::from(body)).map_err(|e| Error::Internal {
            message: format!("failed to assemble proxied response: {e}"),
        })
    }
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}

/// Copy client headers for forwarding: hop-by-hop and `Host` dropped,
/// forwarded-for chain extended.
fn prepare_forward_headers(headers: &HeaderMap, client_addr: Option<&str>) -> HeaderMap {
    let mut forward = HeaderMap::new();

    for (name, value) in headers.iter() {
        if is_hop_by_hop(name) || name == header::HOST {
            continue;
        }
        forward.insert(name.clone(), value.clone());
    }

    if let Some(addr) = client_addr {
        let chain = match headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
        {
            Some(existing) => format!("{existing}, {addr}"),
            None => addr.to_string(),
        };
        if let Ok(value) = HeaderValue::from_str(&chain) {
            forward.insert(HeaderName::from_static("x-forwarded-for"), value);
        }
        if let Ok(value) = HeaderValue::from_str(addr) {
            forward.insert(HeaderName::from_static("x-real-ip"), value);
        }
    }

    forward
}

fn join_url(base: &str, rest: &str) -> String {
    let rest = rest.trim_start_matches('/');
    format!("{}/{rest}", base.trim_end_matches('/'))
}

fn map_send_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::UpstreamTimeout
    } else {
        Error::Upstream {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url_normalizes_slashes() {
        assert_eq!(join_url("http://b:1/", "/x/y?q=1"), "http://b:1/x/y?q=1");
        assert_eq!(join_url("http://b:1", "x"), "http://b:1/x");
        assert_eq!(join_url("http://b:1", ""), "http://b:1/");
    }

    #[test]
    fn test_hop_by_hop_headers_dropped() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(
            HeaderName::from_static("transfer-encoding"),
            HeaderValue::from_static("chunked"),
        );
        headers.insert(header::HOST, HeaderValue::from_static("gateway"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));

        let forward = prepare_forward_headers(&headers, None);
        assert!(forward.get(header::CONNECTION).is_none());
        assert!(forward.get("transfer-encoding").is_none());
        assert!(forward.get(header::HOST).is_none());
        assert_eq!(forward.get(header::ACCEPT).unwrap(), "*/*");
    }

    #[test]
    fn test_forwarded_for_chain_appends() {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-forwarded-for"),
            HeaderValue::from_static("10.0.0.1"),
        );

        let forward = prepare_forward_headers(&headers, Some("192.168.1.5"));
        assert_eq!(
            forward.get("x-forwarded-for").unwrap(),
            "10.0.0.1, 192.168.1.5"
        );
        assert_eq!(forward.get("x-real-ip").unwrap(), "192.168.1.5");
    }
}
