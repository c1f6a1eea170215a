//! Request authentication: cookies, client identity, and pipeline stages.
//!
//! Dual-token system: short-lived stateless access tokens and longer-lived
//! refresh tokens, both carried in HttpOnly cookies. The stages here gate
//! protected paths and project validated claims into trusted headers.

mod cookie;
mod ip;
mod middleware;

pub use cookie::{ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, auth_cookie, clear_cookie, get_cookie};
pub use ip::{UNKNOWN_CLIENT_KEY, client_key};
pub use middleware::{
    AuthStageState, EnrichStageState, GATEWAY_SECRET_HEADER, PERMISSIONS_HEADER, USER_ID_HEADER,
    ValidatedAccess, WORKSPACE_ID_HEADER, bearer_token, enrich_context, require_access_token,
};
