//! Authentication API endpoints.
//!
//! - POST `/auth/login` - Verify credentials, set token cookies
//! - POST `/auth/signup` - Register an account, then log it in
//! - POST `/auth/refresh` - Exchange refresh token for a new access token
//! - POST `/auth/switch-workspace` - Reissue the access token for another workspace
//! - POST `/auth/logout` - Clear both token cookies
//!
//! All of these live on the allow list: the authentication stage never gates
//! them, so an expired access token never locks a client out of refreshing.

use axum::{
    Json, Router,
    extract::{OriginalUri, State},
    http::{StatusCode, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse},
    routing::post,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use super::error::ApiError;
use crate::auth::{
    ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, auth_cookie, bearer_token, clear_cookie, get_cookie,
};
use crate::directory::{DirectoryError, DirectoryUser, UserDirectory, WorkspaceMembership};
use crate::jwt::JwtConfig;

#[derive(Clone)]
pub struct AuthApiState {
    pub jwt: Arc<JwtConfig>,
    pub directory: Arc<dyn UserDirectory>,
    pub secure_cookies: bool,
    /// When set, a successful refresh also reissues the refresh cookie.
    pub rotate_refresh: bool,
}

pub fn router(state: AuthApiState) -> Router {
    Router::new()
        .route("/login", post(login))
        .route("/signup", post(signup))
        .route("/refresh", post(refresh))
        .route("/switch-workspace", post(switch_workspace))
        .route("/logout", post(logout))
        .with_state(state)
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct SignupRequest {
    email: String,
    password: String,
    name: String,
}

#[derive(Serialize)]
struct SessionResponse {
    message: &'static str,
    #[serde(rename = "userId")]
    user_id: String,
    email: String,
    name: String,
}

/// Claims derived from a workspace membership: the workspace id and its
/// permission set, `None` when the membership grants no permissions.
fn membership_claims(
    membership: Option<&WorkspaceMembership>,
) -> (Option<String>, Option<Vec<String>>) {
    match membership {
        Some(ws) => (
            Some(ws.workspace_id.clone()),
            if ws.permissions.is_empty() {
                None
            } else {
                Some(ws.permissions.clone())
            },
        ),
        None => (None, None),
    }
}

/// Issue an access token scoped to the given membership and build its cookie.
fn access_cookie(
    state: &AuthApiState,
    user: &DirectoryUser,
    membership: Option<&WorkspaceMembership>,
    path: &str,
) -> Result<(axum::http::HeaderName, String), ApiError> {
    let (workspace_id, permissions) = membership_claims(membership);
    let access = state
        .jwt
        .issue_access_token(&user.id, &user.email, &user.name, workspace_id, permissions)
        .map_err(|e| ApiError::internal("Failed to issue access token", e, path))?;

    Ok((
        SET_COOKIE,
        auth_cookie(
            ACCESS_COOKIE_NAME,
            &access.token,
            access.max_age,
            state.secure_cookies,
        ),
    ))
}

/// Issue the access + refresh pair for a verified user and build the two
/// Set-Cookie values. The access token starts in the user's primary
/// workspace when one exists.
fn session_cookies(
    state: &AuthApiState,
    user: &DirectoryUser,
    path: &str,
) -> Result<[(axum::http::HeaderName, String); 2], ApiError> {
    let access = access_cookie(state, user, user.primary_workspace(), path)?;
    let refresh = state
        .jwt
        .issue_refresh_token(&user.id)
        .map_err(|e| ApiError::internal("Failed to issue refresh token", e, path))?;

    Ok([
        access,
        (
            SET_COOKIE,
            auth_cookie(
                REFRESH_COOKIE_NAME,
                &refresh.token,
                refresh.max_age,
                state.secure_cookies,
            ),
        ),
    ])
}

/// Verify credentials against the user directory and start a session.
///
/// Directory unavailability is reported as an authentication failure rather
/// than a gateway fault: the caller cannot be told apart from one presenting
/// bad credentials without leaking infrastructure state.
async fn login(
    State(state): State<AuthApiState>,
    OriginalUri(uri): OriginalUri,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let path = uri.path();

    let user = match state
        .directory
        .validate_credentials(&body.email, &body.password)
        .await
    {
        Ok(user) => user,
        Err(DirectoryError::InvalidCredentials) => {
            return Err(ApiError::unauthorized("Invalid email or password", path));
        }
        Err(e) => {
            warn!("Credential validation failed: {}", e);
            return Err(ApiError::unauthorized("Authentication failed", path));
        }
    };

    if !user.active {
        return Err(ApiError::unauthorized("User account is inactive", path));
    }

    let cookies = session_cookies(&state, &user, path)?;
    tracing::info!(user_id = %user.id, "User logged in");

    Ok((
        StatusCode::OK,
        AppendHeaders(cookies),
        Json(SessionResponse {
            message: "Login successful",
            user_id: user.id,
            email: user.email,
            name: user.name,
        }),
    ))
}

/// Register a new account in the directory, then log it in immediately so
/// the client leaves signup with a live session.
async fn signup(
    State(state): State<AuthApiState>,
    OriginalUri(uri): OriginalUri,
    Json(body): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let path = uri.path();

    match state
        .directory
        .create_user(&body.email, &body.password, &body.name)
        .await
    {
        Ok(()) => {}
        Err(DirectoryError::Rejected(msg)) => {
            let message = if msg.trim().is_empty() {
                "Signup rejected".to_string()
            } else {
                msg
            };
            return Err(ApiError::bad_request(message, path));
        }
        Err(e) => return Err(ApiError::internal("Signup failed", e, path)),
    }

    let user = state
        .directory
        .validate_credentials(&body.email, &body.password)
        .await
        .map_err(|e| ApiError::internal("Post-signup login failed", e, path))?;

    let cookies = session_cookies(&state, &user, path)?;
    tracing::info!(user_id = %user.id, "User signed up");

    Ok((
        StatusCode::OK,
        AppendHeaders(cookies),
        Json(SessionResponse {
            message: "Signup successful",
            user_id: user.id,
            email: user.email,
            name: user.name,
        }),
    ))
}

#[derive(Serialize)]
struct RefreshResponse {
    message: &'static str,
}

/// Exchange a valid refresh token for a fresh access token. The directory is
/// consulted on every refresh so a deactivated account loses access within
/// one access-token lifetime. No cookie is touched on any failure path.
async fn refresh(
    State(state): State<AuthApiState>,
    OriginalUri(uri): OriginalUri,
    request: axum::extract::Request,
) -> Result<impl IntoResponse, ApiError> {
    let path = uri.path();
    let (parts, _body) = request.into_parts();

    // An empty or whitespace cookie value counts as missing.
    let refresh_token = get_cookie(&parts.headers, REFRESH_COOKIE_NAME)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::unauthorized("Refresh token is missing", path))?;

    let claims = state
        .jwt
        .validate_refresh_token(refresh_token)
        .map_err(|_| ApiError::unauthorized("Invalid refresh token", path))?;

    let user = match state.directory.get_user_by_id(&claims.user_id).await {
        Ok(user) => user,
        Err(DirectoryError::NotFound) => {
            return Err(ApiError::unauthorized("Invalid refresh token", path));
        }
        Err(e) => {
            warn!("User lookup failed during refresh: {}", e);
            return Err(ApiError::unauthorized("Invalid refresh token", path));
        }
    };

    if !user.active {
        return Err(ApiError::unauthorized("User account is inactive", path));
    }

    // The refresh token carries no workspace context; the new access token
    // starts over in the primary workspace.
    let mut cookies = vec![access_cookie(&state, &user, user.primary_workspace(), path)?];

    if state.rotate_refresh {
        let rotated = state
            .jwt
            .issue_refresh_token(&user.id)
            .map_err(|e| ApiError::internal("Failed to issue refresh token", e, path))?;
        cookies.push((
            SET_COOKIE,
            auth_cookie(
                REFRESH_COOKIE_NAME,
                &rotated.token,
                rotated.max_age,
                state.secure_cookies,
            ),
        ));
    }

    Ok((
        StatusCode::OK,
        AppendHeaders(cookies),
        Json(RefreshResponse {
            message: "Token refreshed",
        }),
    ))
}

#[derive(Deserialize)]
struct SwitchWorkspaceRequest {
    #[serde(rename = "workspaceId")]
    workspace_id: String,
}

#[derive(Serialize)]
struct SwitchWorkspaceResponse {
    message: &'static str,
    #[serde(rename = "workspaceId")]
    workspace_id: String,
}

/// Reissue the access token scoped to another of the caller's workspaces.
///
/// Lives on the auth allow list like refresh, so the handler validates the
/// access token itself. Membership is checked against the directory's current
/// answer, not the token, so a revoked membership cannot be switched back to.
async fn switch_workspace(
    State(state): State<AuthApiState>,
    OriginalUri(uri): OriginalUri,
    headers: axum::http::HeaderMap,
    Json(body): Json<SwitchWorkspaceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let path = uri.path();

    let token = get_cookie(&headers, ACCESS_COOKIE_NAME)
        .map(str::to_string)
        .or_else(|| bearer_token(&headers))
        .ok_or_else(|| ApiError::unauthorized("Access token is required", path))?;

    let claims = state
        .jwt
        .validate_access_token(&token)
        .map_err(|_| ApiError::unauthorized("Invalid or expired access token", path))?;

    let user = match state.directory.get_user_by_id(&claims.user_id).await {
        Ok(user) => user,
        Err(DirectoryError::NotFound) => {
            return Err(ApiError::unauthorized("Invalid or expired access token", path));
        }
        Err(e) => {
            warn!("User lookup failed during workspace switch: {}", e);
            return Err(ApiError::unauthorized("Invalid or expired access token", path));
        }
    };

    if !user.active {
        return Err(ApiError::unauthorized("User account is inactive", path));
    }

    let Some(membership) = user.workspace(&body.workspace_id) else {
        return Err(ApiError::forbidden(
            "Not a member of the requested workspace",
            path,
        ));
    };

    let cookie = access_cookie(&state, &user, Some(membership), path)?;
    tracing::info!(user_id = %user.id, workspace_id = %body.workspace_id, "Workspace switched");

    Ok((
        StatusCode::OK,
        AppendHeaders([cookie]),
        Json(SwitchWorkspaceResponse {
            message: "Workspace switched",
            workspace_id: body.workspace_id,
        }),
    ))
}

/// Clear both token cookies. Tokens are stateless, so logout is purely a
/// client-side affair; the endpoint always succeeds.
async fn logout(State(state): State<AuthApiState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        AppendHeaders([
            (
                SET_COOKIE,
                clear_cookie(ACCESS_COOKIE_NAME, state.secure_cookies),
            ),
            (
                SET_COOKIE,
                clear_cookie(REFRESH_COOKIE_NAME, state.secure_cookies),
            ),
        ]),
        Json(RefreshResponse {
            message: "Logged out",
        }),
    )
}
