//! Client identity derivation for rate limiting.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request};

/// Key under which all unattributable clients are pooled. With a
/// misconfigured proxy this single bucket serves every anonymous peer, so a
/// startup warning flags deployments where it can occur.
pub const UNKNOWN_CLIENT_KEY: &str = "unknown";

/// Derive the rate-limit key for a request: the first hop of
/// `X-Forwarded-For`, else `X-Real-IP`, else the transport remote address,
/// else `"unknown"`.
pub fn client_key(request: &Request) -> String {
    if let Some(forwarded_for) = request.headers().get("x-forwarded-for") {
        if let Ok(value) = forwarded_for.to_str() {
            // X-Forwarded-For can contain multiple hops, take the first
            // (original client).
            if let Some(first_hop) = value.split(',').next() {
                let ip = first_hop.trim();
                if !ip.is_empty() {
                    return ip.to_string();
                }
            }
        }
    }

    if let Some(real_ip) = request.headers().get("x-real-ip") {
        if let Ok(value) = real_ip.to_str() {
            let ip = value.trim();
            if !ip.is_empty() {
                return ip.to_string();
            }
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT_KEY.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;

    fn request_with_headers(headers: &[(&str, &str)]) -> Request {
        let mut builder = HttpRequest::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_forwarded_for_first_hop_wins() {
        let request = request_with_headers(&[
            ("x-forwarded-for", "203.0.113.7, 10.0.0.1"),
            ("x-real-ip", "198.51.100.2"),
        ]);
        assert_eq!(client_key(&request), "203.0.113.7");
    }

    #[test]
    fn test_real_ip_fallback() {
        let request = request_with_headers(&[("x-real-ip", "198.51.100.2")]);
        assert_eq!(client_key(&request), "198.51.100.2");
    }

    #[test]
    fn test_connect_info_fallback() {
        let mut request = request_with_headers(&[]);
        request
            .extensions_mut()
            .insert(ConnectInfo("192.0.2.9:4242".parse::<SocketAddr>().unwrap()));
        assert_eq!(client_key(&request), "192.0.2.9");
    }

    #[test]
    fn test_unknown_when_nothing_available() {
        let request = request_with_headers(&[]);
        assert_eq!(client_key(&request), UNKNOWN_CLIENT_KEY);
    }

    #[test]
    fn test_empty_forwarded_for_falls_through() {
        let request =
            request_with_headers(&[("x-forwarded-for", "  "), ("x-real-ip", "198.51.100.2")]);
        assert_eq!(client_key(&request), "198.51.100.2");
    }
}
