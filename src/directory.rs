//! User directory collaborator.
//!
//! Credential verification and account state live in a separate service; the
//! gateway only ever sees `{id, email, name, active}`. The trait keeps the
//! seam mockable in tests, and the HTTP implementation talks to the
//! directory's internal endpoints with a bounded timeout.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A workspace the user belongs to, with the permissions granted there.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkspaceMembership {
    #[serde(rename = "workspaceId")]
    pub workspace_id: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Marked by the directory as the user's default workspace
    #[serde(default)]
    pub primary: bool,
}

/// A user as reported by the directory service.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub active: bool,
    /// Workspace memberships; empty for users outside any workspace
    #[serde(default)]
    pub workspaces: Vec<WorkspaceMembership>,
}

impl DirectoryUser {
    /// The membership a fresh session starts in: the one the directory marks
    /// primary, else the first listed.
    pub fn primary_workspace(&self) -> Option<&WorkspaceMembership> {
        self.workspaces
            .iter()
            .find(|w| w.primary)
            .or_else(|| self.workspaces.first())
    }

    pub fn workspace(&self, workspace_id: &str) -> Option<&WorkspaceMembership> {
        self.workspaces
            .iter()
            .find(|w| w.workspace_id == workspace_id)
    }
}

/// Directory call outcomes. `Unavailable` covers timeouts, transport
/// failures, and 5xx responses; callers surface it as an authentication
/// failure, never as a gateway fault.
#[derive(Debug)]
pub enum DirectoryError {
    /// Credentials did not match an account
    InvalidCredentials,
    /// No account with the given id
    NotFound,
    /// The directory refused the request (validation, duplicate email)
    Rejected(String),
    /// The directory could not be reached or answered abnormally
    Unavailable(String),
}

impl std::fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DirectoryError::InvalidCredentials => write!(f, "Invalid credentials"),
            DirectoryError::NotFound => write!(f, "User not found"),
            DirectoryError::Rejected(msg) => write!(f, "Directory rejected request: {}", msg),
            DirectoryError::Unavailable(msg) => write!(f, "User directory unavailable: {}", msg),
        }
    }
}

impl std::error::Error for DirectoryError {}

/// External user-directory contract.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Verify email + password, returning the account on success.
    async fn validate_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<DirectoryUser, DirectoryError>;

    /// Fetch the current account state for a user id.
    async fn get_user_by_id(&self, user_id: &str) -> Result<DirectoryUser, DirectoryError>;

    /// Register a new account.
    async fn create_user(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<(), DirectoryError>;
}

#[derive(Serialize)]
struct CredentialsRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct CreateUserRequest<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
}

/// HTTP client for the directory's internal endpoints. Requests carry the
/// service secret so the directory can reject calls that bypassed the
/// gateway.
pub struct HttpUserDirectory {
    client: reqwest::Client,
    base_url: String,
    service_secret: String,
}

impl HttpUserDirectory {
    pub fn new(
        base_url: impl Into<String>,
        service_secret: String,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self {
            client,
            base_url,
            service_secret,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("X-Service-Secret", &self.service_secret)
            .header("X-Source", "gateway")
    }
}

fn transport_error(e: reqwest::Error) -> DirectoryError {
    DirectoryError::Unavailable(e.to_string())
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn validate_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<DirectoryUser, DirectoryError> {
        let response = self
            .request(reqwest::Method::POST, "/users/internal/validate-credentials")
            .json(&CredentialsRequest { email, password })
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            response.json().await.map_err(transport_error)
        } else if status.is_client_error() {
            Err(DirectoryError::InvalidCredentials)
        } else {
            Err(DirectoryError::Unavailable(format!(
                "validate-credentials returned {}",
                status
            )))
        }
    }

    async fn get_user_by_id(&self, user_id: &str) -> Result<DirectoryUser, DirectoryError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/users/internal/users/{}", user_id),
            )
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            response.json().await.map_err(transport_error)
        } else if status == reqwest::StatusCode::NOT_FOUND {
            Err(DirectoryError::NotFound)
        } else if status.is_client_error() {
            Err(DirectoryError::Rejected(format!("status {}", status)))
        } else {
            Err(DirectoryError::Unavailable(format!(
                "get-user returned {}",
                status
            )))
        }
    }

    async fn create_user(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<(), DirectoryError> {
        let response = self
            .request(reqwest::Method::POST, "/users/internal/users")
            .json(&CreateUserRequest {
                name,
                email,
                password,
            })
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            Err(DirectoryError::Rejected(body))
        } else {
            Err(DirectoryError::Unavailable(format!(
                "create-user returned {}",
                status
            )))
        }
    }
}
