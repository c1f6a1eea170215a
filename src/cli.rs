//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::directory::HttpUserDirectory;
use crate::rate_limit::RateLimitConfig;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;
use url::Url;

const MIN_JWT_SECRET_LENGTH: usize = 32;

/// Directory calls must finish well inside a client's patience.
const DIRECTORY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "Edgegate",
    about = "Edge gateway handling authentication, rate limiting, and context enrichment"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    pub port: u16,

    /// Base URL of the upstream service the gateway fronts
    #[arg(long, default_value = "http://localhost:9000", value_parser = validate_base_url)]
    pub upstream_url: String,

    /// Base URL of the user directory service
    #[arg(long, default_value = "http://localhost:9100", value_parser = validate_base_url)]
    pub directory_url: String,

    /// Access token validity in minutes
    #[arg(long, default_value = "15")]
    pub access_token_minutes: u64,

    /// Refresh token validity in minutes
    #[arg(long, default_value = "10080")]
    pub refresh_token_minutes: u64,

    /// Rate-limit burst capacity per client (at least 1)
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u32).range(1..))]
    pub rate_capacity: u32,

    /// Rate-limit refill per second per client (at least 1; a bucket that
    /// never refills would deny a client forever)
    #[arg(long, default_value = "5", value_parser = clap::value_parser!(u32).range(1..))]
    pub rate_refill: u32,

    /// Path prefixes exempt from authentication (defaults to the auth
    /// endpoints and the health probe)
    #[arg(long = "allow-prefix", value_parser = validate_allow_prefix)]
    pub allow_prefixes: Vec<String>,

    /// Disable the authentication stage (local development only)
    #[arg(long)]
    pub auth_disabled: bool,

    /// Rotate the refresh cookie on every successful refresh
    #[arg(long)]
    pub rotate_refresh: bool,

    /// Set the Secure flag on token cookies (requires HTTPS termination)
    #[arg(long)]
    pub secure_cookies: bool,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Path to file containing the gateway/service shared secret. Prefer
    /// using GATEWAY_SECRET env var instead
    #[arg(long)]
    pub gateway_secret_file: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

fn validate_base_url(s: &str) -> Result<String, String> {
    let url = Url::parse(s).map_err(|e| format!("Invalid URL '{}': {}", s, e))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(format!("URL must be http or https: {}", s));
    }
    Ok(s.to_string())
}

fn validate_allow_prefix(s: &str) -> Result<String, String> {
    if !s.starts_with('/') {
        return Err(format!("Allow prefix must start with '/': {}", s));
    }
    if s.chars().any(|c| !c.is_ascii() || c.is_whitespace()) {
        return Err(format!("Allow prefix contains invalid characters: {}", s));
    }
    Ok(s.to_string())
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = load_secret("JWT_SECRET", jwt_secret_file, "--jwt-secret-file")?;

    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Load the gateway/service shared secret from environment variable or file.
pub fn load_gateway_secret(gateway_secret_file: Option<&str>) -> Option<String> {
    let secret = load_secret("GATEWAY_SECRET", gateway_secret_file, "--gateway-secret-file")?;

    if secret.is_empty() {
        error!("Gateway secret must not be empty");
        return None;
    }

    Some(secret)
}

fn load_secret(env_var: &str, file: Option<&str>, flag: &str) -> Option<String> {
    if let Ok(secret) = std::env::var(env_var) {
        // Clear the environment variable to prevent leaking.
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var(env_var) };
        return Some(secret);
    }

    if let Some(path) = file {
        return match std::fs::read_to_string(path) {
            Ok(content) => Some(content.trim().to_string()),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read secret file");
                None
            }
        };
    }

    error!(
        "Secret is required. Set {} environment variable (recommended) or use {}",
        env_var, flag
    );
    None
}

/// Build ServerConfig from validated arguments and loaded secrets.
pub fn build_config(args: &Args, jwt_secret: String, gateway_secret: String) -> ServerConfig {
    let directory = HttpUserDirectory::new(
        args.directory_url.clone(),
        gateway_secret.clone(),
        DIRECTORY_TIMEOUT,
    )
    .expect("Failed to build directory client");

    let allow_list = if args.allow_prefixes.is_empty() {
        ServerConfig::default_allow_list()
    } else {
        args.allow_prefixes.clone()
    };

    ServerConfig {
        jwt_secret: jwt_secret.into_bytes(),
        gateway_secret,
        access_token_minutes: args.access_token_minutes,
        refresh_token_minutes: args.refresh_token_minutes,
        upstream_url: args.upstream_url.clone(),
        directory: Arc::new(directory),
        secure_cookies: args.secure_cookies,
        rotate_refresh: args.rotate_refresh,
        auth_disabled: args.auth_disabled,
        allow_list,
        rate_limit: RateLimitConfig {
            capacity: args.rate_capacity,
            refill_rate: args.rate_refill,
            ..RateLimitConfig::default()
        },
    }
}
