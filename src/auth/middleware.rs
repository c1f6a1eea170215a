//! Authentication and context-enrichment stages of the request pipeline.
//!
//! Both are ordinary `handle(request, next)` middlewares. Authentication
//! gates protected paths on a valid access token and stores the decoded
//! claims in a request extension; enrichment turns those claims into trusted
//! headers for the upstream hop. A rejection short-circuits, so enrichment
//! and routing never see an unauthenticated request to a protected path.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderValue, header},
    middleware::Next,
    response::Response,
};

use super::cookie::{ACCESS_COOKIE_NAME, get_cookie};
use crate::api::error::unauthorized_response;
use crate::jwt::{AccessClaims, JwtConfig};

/// Trusted header carrying the authenticated subject.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Trusted header carrying the active workspace, when present in the token.
pub const WORKSPACE_ID_HEADER: &str = "x-workspace-id";
/// Trusted header carrying comma-joined capability names, when present.
pub const PERMISSIONS_HEADER: &str = "x-user-permissions";
/// Shared-secret header proving the request traversed the gateway.
pub const GATEWAY_SECRET_HEADER: &str = "x-gateway-secret";

/// Request extension holding the claims decoded by the authentication stage,
/// so no later stage re-parses the token.
#[derive(Debug, Clone)]
pub struct ValidatedAccess(pub AccessClaims);

/// State for the authentication stage.
#[derive(Clone)]
pub struct AuthStageState {
    pub jwt: Arc<JwtConfig>,
    /// Path prefixes that bypass authentication (auth endpoints, health)
    pub allow_list: Arc<Vec<String>>,
    /// Local-development switch; bypasses this stage only
    pub auth_disabled: bool,
}

impl AuthStageState {
    fn is_allow_listed(&self, path: &str) -> bool {
        self.allow_list.iter().any(|prefix| path.starts_with(prefix))
    }
}

/// Authentication stage: allow-listed paths pass through untouched; every
/// other request must present a valid access token in the `access_token`
/// cookie or an `Authorization: Bearer` header.
pub async fn require_access_token(
    State(state): State<AuthStageState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    if state.is_allow_listed(&path) {
        tracing::debug!(path = %path, "Skipping authentication for allow-listed path");
        return next.run(request).await;
    }

    if state.auth_disabled {
        return next.run(request).await;
    }

    let token = get_cookie(request.headers(), ACCESS_COOKIE_NAME)
        .map(str::to_string)
        .or_else(|| bearer_token(request.headers()));

    let Some(token) = token else {
        tracing::debug!(path = %path, "Access token is missing");
        return unauthorized_response("Access token is required", &path);
    };

    match state.jwt.validate_access_token(&token) {
        Ok(claims) => {
            request.extensions_mut().insert(ValidatedAccess(claims));
            next.run(request).await
        }
        Err(e) => {
            tracing::debug!(path = %path, error = %e, "Access token validation failed");
            unauthorized_response("Invalid or expired access token", &path)
        }
    }
}

/// Extract a bearer token from the `Authorization` header, if present.
pub fn bearer_token(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
}

/// State for the context-enrichment stage.
#[derive(Clone)]
pub struct EnrichStageState {
    /// Gateway-to-backend shared secret, attached to every forwarded request
    pub gateway_secret: Arc<String>,
}

/// Context-enrichment stage: strip any client-supplied trusted headers,
/// attach the gateway secret, and when the authentication stage validated a
/// token, project its claims into `X-User-Id` / `X-Workspace-Id` /
/// `X-User-Permissions`. A missing optional claim never fails the request;
/// authentication already proved the token.
pub async fn enrich_context(
    State(state): State<EnrichStageState>,
    mut request: Request,
    next: Next,
) -> Response {
    let headers = request.headers_mut();
    // Inbound copies of trusted headers are forgeries by definition.
    headers.remove(USER_ID_HEADER);
    headers.remove(WORKSPACE_ID_HEADER);
    headers.remove(PERMISSIONS_HEADER);

    if let Ok(value) = HeaderValue::from_str(&state.gateway_secret) {
        headers.insert(GATEWAY_SECRET_HEADER, value);
    }

    let claims = request
        .extensions()
        .get::<ValidatedAccess>()
        .map(|v| v.0.clone());

    if let Some(claims) = claims {
        let headers = request.headers_mut();

        if let Ok(value) = HeaderValue::from_str(&claims.user_id) {
            headers.insert(USER_ID_HEADER, value);
        }

        if let Some(workspace_id) = claims.workspace_id.as_deref() {
            if let Ok(value) = HeaderValue::from_str(workspace_id) {
                headers.insert(WORKSPACE_ID_HEADER, value);
            }
        }

        if let Some(permissions) = claims.permissions.as_deref() {
            if !permissions.is_empty() {
                if let Ok(value) = HeaderValue::from_str(&permissions.join(",")) {
                    headers.insert(PERMISSIONS_HEADER, value);
                }
            }
        }
    }

    next.run(request).await
}
