mod auth;
pub mod error;

use axum::{Json, Router, http::StatusCode, response::IntoResponse, routing::get};
use std::sync::Arc;

use crate::directory::UserDirectory;
use crate::jwt::JwtConfig;

pub use auth::AuthApiState;

/// Create the router for endpoints the gateway serves itself (everything
/// else falls through to the upstream proxy).
pub fn create_api_router(
    jwt: Arc<JwtConfig>,
    directory: Arc<dyn UserDirectory>,
    secure_cookies: bool,
    rotate_refresh: bool,
) -> Router {
    let auth_state = AuthApiState {
        jwt,
        directory,
        secure_cookies,
        rotate_refresh,
    };

    Router::new()
        .route("/health", get(health))
        .nest("/auth", auth::router(auth_state))
}

/// Liveness probe. Deliberately does not touch the user directory or the
/// upstream, so a dependency outage never makes the gateway look dead.
async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({ "status": "up" })),
    )
}
