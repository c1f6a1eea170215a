//! Shared error handling for the gateway surface.
//!
//! Every rejection — authentication, rate limiting, upstream failure — maps
//! deterministically to an HTTP status and the JSON body
//! `{timestamp, status, error, message, path}`.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

#[derive(Serialize)]
struct ErrorBody {
    timestamp: String,
    status: u16,
    error: &'static str,
    message: String,
    path: String,
    #[serde(rename = "retryAfter", skip_serializing_if = "Option::is_none")]
    retry_after: Option<String>,
}

impl ErrorBody {
    fn new(status: StatusCode, message: &str, path: &str) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            status: status.as_u16(),
            error: status.canonical_reason().unwrap_or("Error"),
            message: message.to_string(),
            path: path.to_string(),
            retry_after: None,
        }
    }
}

/// API error with automatic response conversion. Carries the request path so
/// the error body matches the contract consumed by frontends.
pub struct ApiError {
    status: StatusCode,
    message: String,
    path: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            path: path.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
            path: path.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            message: message.into(),
            path: path.into(),
        }
    }

    /// Unexpected fault: logged with context, generic message to the caller.
    pub fn internal(context: &str, e: impl std::fmt::Display, path: impl Into<String>) -> Self {
        error!("{}: {}", context, e);
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Internal server error".to_string(),
            path: path.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody::new(self.status, &self.message, &self.path)),
        )
            .into_response()
    }
}

/// 401 response used by the authentication stage.
pub fn unauthorized_response(message: &str, path: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorBody::new(StatusCode::UNAUTHORIZED, message, path)),
    )
        .into_response()
}

/// 429 response with a retry hint, used by the rate limiter.
pub fn rate_limited_response(path: &str, retry_after_secs: u64) -> Response {
    let mut body = ErrorBody::new(
        StatusCode::TOO_MANY_REQUESTS,
        "Too many requests. Please slow down.",
        path,
    );
    body.retry_after = Some(format!("{} seconds", retry_after_secs));

    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
        response.headers_mut().insert(header::RETRY_AFTER, value);
    }
    response
}

/// 413 response used when a request body exceeds the proxy's buffer limit.
pub fn payload_too_large_response(path: &str) -> Response {
    (
        StatusCode::PAYLOAD_TOO_LARGE,
        Json(ErrorBody::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            "Request body too large",
            path,
        )),
    )
        .into_response()
}

/// 502 response used when the upstream hop fails.
pub fn bad_gateway_response(message: &str, path: &str) -> Response {
    (
        StatusCode::BAD_GATEWAY,
        Json(ErrorBody::new(StatusCode::BAD_GATEWAY, message, path)),
    )
        .into_response()
}
