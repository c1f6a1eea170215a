pub mod api;
pub mod auth;
pub mod cli;
pub mod directory;
pub mod jwt;
pub mod proxy;
pub mod rate_limit;

use api::create_api_router;
use auth::{AuthStageState, EnrichStageState, enrich_context, require_access_token};
use axum::{Router, middleware};
use directory::UserDirectory;
use jwt::JwtConfig;
use proxy::ProxyState;
use rate_limit::{IpRateLimiter, RateLimitConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Path prefixes that bypass the authentication stage when no explicit allow
/// list is configured. The auth endpoints must stay reachable with an expired
/// access token, and health probes carry no credentials at all.
pub const DEFAULT_ALLOW_LIST: &[&str] = &["/auth/", "/health"];

pub struct ServerConfig {
    /// JWT signing secret
    pub jwt_secret: Vec<u8>,
    /// Shared secret attached to every forwarded request
    pub gateway_secret: String,
    /// Access token validity in minutes
    pub access_token_minutes: u64,
    /// Refresh token validity in minutes
    pub refresh_token_minutes: u64,
    /// Base URL of the upstream the gateway fronts
    pub upstream_url: String,
    /// User directory used for credential checks and account state
    pub directory: Arc<dyn UserDirectory>,
    /// Whether to set Secure flag on cookies (true in production with HTTPS)
    pub secure_cookies: bool,
    /// Whether a successful refresh also rotates the refresh cookie
    pub rotate_refresh: bool,
    /// Local-development switch that bypasses the authentication stage
    pub auth_disabled: bool,
    /// Path prefixes exempt from authentication
    pub allow_list: Vec<String>,
    /// Per-client rate limiter settings
    pub rate_limit: RateLimitConfig,
}

impl ServerConfig {
    pub fn default_allow_list() -> Vec<String> {
        DEFAULT_ALLOW_LIST.iter().map(|s| s.to_string()).collect()
    }
}

/// Create the application router: gateway-served endpoints plus the upstream
/// proxy fallback, wrapped in the pipeline stages. Returns the rate limiter
/// so the caller can start its sweeper.
///
/// Stage order is rate limiting, then authentication, then context
/// enrichment. The limiter sees every request including allow-listed ones;
/// enrichment only ever sees requests authentication let through.
pub fn create_app(config: &ServerConfig) -> (Router, Arc<IpRateLimiter>) {
    let jwt = Arc::new(JwtConfig::new(
        &config.jwt_secret,
        config.access_token_minutes,
        config.refresh_token_minutes,
    ));

    let limiter = Arc::new(IpRateLimiter::new(config.rate_limit.clone()));

    let auth_state = AuthStageState {
        jwt: jwt.clone(),
        allow_list: Arc::new(config.allow_list.clone()),
        auth_disabled: config.auth_disabled,
    };
    if config.auth_disabled {
        tracing::warn!("Authentication stage is DISABLED; all paths are open");
    }

    let enrich_state = EnrichStageState {
        gateway_secret: Arc::new(config.gateway_secret.clone()),
    };

    let proxy_state = ProxyState::new(config.upstream_url.clone(), reqwest::Client::new());

    let app = Router::new()
        .fallback(proxy::forward)
        .with_state(proxy_state)
        .merge(create_api_router(
            jwt,
            config.directory.clone(),
            config.secure_cookies,
            config.rotate_refresh,
        ))
        .layer(middleware::from_fn_with_state(enrich_state, enrich_context))
        .layer(middleware::from_fn_with_state(
            auth_state,
            require_access_token,
        ))
        .layer(middleware::from_fn_with_state(
            limiter.clone(),
            rate_limit::enforce_rate_limit,
        ));

    (app, limiter)
}

/// Run the server on the given listener. This function blocks until the
/// server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    // Without a trusted proxy header or connect info, every anonymous peer
    // lands in one shared rate-limit bucket.
    tracing::warn!(
        "Unattributable clients share the '{}' rate-limit bucket",
        auth::UNKNOWN_CLIENT_KEY
    );

    let (app, limiter) = create_app(&config);
    rate_limit::spawn_sweeper(limiter);

    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to
/// let the OS choose a random port. Returns the actual listening address.
/// For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> (tokio::task::JoinHandle<()>, SocketAddr) {
    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await.expect("Failed to bind");
    let local_addr = listener.local_addr().expect("Failed to get local address");

    let handle = tokio::spawn(async move {
        run_server(config, listener).await.ok();
    });

    (handle, local_addr)
}
