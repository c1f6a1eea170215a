#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use axum::body::Body;
use edgegate::directory::{DirectoryError, DirectoryUser, UserDirectory, WorkspaceMembership};
use edgegate::rate_limit::RateLimitConfig;
use edgegate::{ServerConfig, create_app};

pub const TEST_JWT_SECRET: &[u8] = b"test-jwt-secret-for-testing-0123";
pub const TEST_GATEWAY_SECRET: &str = "test-gateway-secret";

struct StubAccount {
    user: DirectoryUser,
    password: String,
}

/// In-memory stand-in for the user directory service.
pub struct StubDirectory {
    accounts: Mutex<HashMap<String, StubAccount>>,
    unavailable: AtomicBool,
}

impl StubDirectory {
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn with_user(self, id: &str, email: &str, name: &str, password: &str, active: bool) -> Self {
        self.add_user(id, email, name, password, active);
        self
    }

    pub fn add_user(&self, id: &str, email: &str, name: &str, password: &str, active: bool) {
        self.accounts.lock().unwrap().insert(
            email.to_string(),
            StubAccount {
                user: DirectoryUser {
                    id: id.to_string(),
                    email: email.to_string(),
                    name: name.to_string(),
                    active,
                    workspaces: Vec::new(),
                },
                password: password.to_string(),
            },
        );
    }

    pub fn set_workspaces(&self, email: &str, workspaces: Vec<WorkspaceMembership>) {
        if let Some(account) = self.accounts.lock().unwrap().get_mut(email) {
            account.user.workspaces = workspaces;
        }
    }

    pub fn deactivate(&self, user_id: &str) {
        let mut accounts = self.accounts.lock().unwrap();
        for account in accounts.values_mut() {
            if account.user.id == user_id {
                account.user.active = false;
            }
        }
    }

    /// Simulate a directory outage for subsequent calls.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), DirectoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(DirectoryError::Unavailable("stub outage".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl UserDirectory for StubDirectory {
    async fn validate_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<DirectoryUser, DirectoryError> {
        self.check_available()?;
        let accounts = self.accounts.lock().unwrap();
        match accounts.get(email) {
            Some(account) if account.password == password => Ok(account.user.clone()),
            _ => Err(DirectoryError::InvalidCredentials),
        }
    }

    async fn get_user_by_id(&self, user_id: &str) -> Result<DirectoryUser, DirectoryError> {
        self.check_available()?;
        let accounts = self.accounts.lock().unwrap();
        accounts
            .values()
            .find(|a| a.user.id == user_id)
            .map(|a| a.user.clone())
            .ok_or(DirectoryError::NotFound)
    }

    async fn create_user(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<(), DirectoryError> {
        self.check_available()?;
        let mut accounts = self.accounts.lock().unwrap();
        if accounts.contains_key(email) {
            return Err(DirectoryError::Rejected("Email already registered".to_string()));
        }
        let id = uuid::Uuid::new_v4().to_string();
        accounts.insert(
            email.to_string(),
            StubAccount {
                user: DirectoryUser {
                    id,
                    email: email.to_string(),
                    name: name.to_string(),
                    active: true,
                    workspaces: Vec::new(),
                },
                password: password.to_string(),
            },
        );
        Ok(())
    }
}

/// Base config for tests: stub directory, generous rate limit so unrelated
/// tests never trip it, insecure cookies.
pub fn test_config(directory: Arc<StubDirectory>, upstream_url: &str) -> ServerConfig {
    ServerConfig {
        jwt_secret: TEST_JWT_SECRET.to_vec(),
        gateway_secret: TEST_GATEWAY_SECRET.to_string(),
        access_token_minutes: 15,
        refresh_token_minutes: 60,
        upstream_url: upstream_url.to_string(),
        directory,
        secure_cookies: false,
        rotate_refresh: false,
        auth_disabled: false,
        allow_list: ServerConfig::default_allow_list(),
        rate_limit: RateLimitConfig {
            capacity: 1000,
            refill_rate: 1000,
            ..RateLimitConfig::default()
        },
    }
}

/// Build the app router from a config, discarding the limiter handle.
pub fn test_app(config: &ServerConfig) -> axum::Router {
    let (app, _limiter) = create_app(config);
    app
}

/// Extract Set-Cookie headers from a response.
pub fn extract_set_cookies(response: &axum::http::Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect()
}

/// Pull the bare value of a named cookie out of Set-Cookie headers.
pub fn cookie_value(cookies: &[String], name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    cookies.iter().find_map(|c| {
        let rest = c.strip_prefix(&prefix)?;
        Some(rest.split(';').next().unwrap_or("").to_string())
    })
}

/// Check if cookies contain a token being cleared (Max-Age=0).
pub fn has_cleared_cookie(cookies: &[String], cookie_name: &str) -> bool {
    cookies
        .iter()
        .any(|c| c.starts_with(&format!("{}=", cookie_name)) && c.contains("Max-Age=0"))
}
