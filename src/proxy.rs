//! Upstream proxy hop.
//!
//! The fallback handler for every path the gateway does not serve itself: by
//! the time a request lands here it has already passed rate limiting,
//! authentication, and context enrichment, so the forwarded request carries
//! the trusted identity headers and the gateway secret.

use axum::{
    body::Body,
    extract::{OriginalUri, Request, State},
    http::HeaderName,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::api::error::{bad_gateway_response, payload_too_large_response};

/// Request bodies above this size are rejected before the upstream hop.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Hop-by-hop headers (RFC 9110 §7.6.1) are meaningful only for a single
/// connection and must not be forwarded in either direction. `Host` is
/// rewritten by the client from the upstream URL.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.iter().any(|h| name.as_str() == *h)
}

#[derive(Clone)]
pub struct ProxyState {
    pub client: reqwest::Client,
    /// Upstream base URL without a trailing slash
    pub upstream: Arc<String>,
}

impl ProxyState {
    pub fn new(upstream: impl Into<String>, client: reqwest::Client) -> Self {
        let mut upstream = upstream.into();
        while upstream.ends_with('/') {
            upstream.pop();
        }
        Self {
            client,
            upstream: Arc::new(upstream),
        }
    }
}

/// Forward a request to the upstream, preserving method, path, query,
/// end-to-end headers, and body. Upstream failures map to 502; the upstream's
/// own status codes pass through untouched.
pub async fn forward(
    State(state): State<ProxyState>,
    OriginalUri(uri): OriginalUri,
    request: Request,
) -> Response {
    let path = uri.path().to_string();
    let target = match uri.path_and_query() {
        Some(pq) => format!("{}{}", state.upstream, pq),
        None => format!("{}{}", state.upstream, path),
    };

    let (parts, body) = request.into_parts();

    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(path = %path, error = %e, "Failed to read request body");
            return payload_too_large_response(&path);
        }
    };

    let mut upstream_request = state.client.request(parts.method, &target).body(body);
    for (name, value) in &parts.headers {
        if !is_hop_by_hop(name) {
            upstream_request = upstream_request.header(name, value);
        }
    }

    let upstream_response = match upstream_request.send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "Upstream request failed");
            return bad_gateway_response("Upstream service unavailable", &path);
        }
    };

    let status = upstream_response.status();
    let mut headers = axum::http::HeaderMap::new();
    for (name, value) in upstream_response.headers() {
        if !is_hop_by_hop(name) {
            headers.insert(name.clone(), value.clone());
        }
    }

    let body = match upstream_response.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "Failed to read upstream response");
            return bad_gateway_response("Upstream service unavailable", &path);
        }
    };

    (status, headers, Body::from(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hop_by_hop_headers_filtered() {
        assert!(is_hop_by_hop(&HeaderName::from_static("connection")));
        assert!(is_hop_by_hop(&HeaderName::from_static("host")));
        assert!(is_hop_by_hop(&HeaderName::from_static("transfer-encoding")));
        assert!(!is_hop_by_hop(&HeaderName::from_static("x-user-id")));
        assert!(!is_hop_by_hop(&HeaderName::from_static("content-type")));
    }

    #[test]
    fn test_upstream_base_trailing_slash_trimmed() {
        let state = ProxyState::new("http://backend:8080///", reqwest::Client::new());
        assert_eq!(state.upstream.as_str(), "http://backend:8080");
    }
}
