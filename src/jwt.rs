//! JWT token issuance and validation.
//!
//! Dual-token system: short-lived access tokens carrying identity and
//! authorization claims, and longer-lived refresh tokens carrying only the
//! subject. Both are stateless HS256 tokens; validity is reconstructed
//! entirely from the token bytes and the signing secret.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Token type for distinguishing access vs refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Short-lived token authorizing API access
    Access,
    /// Longer-lived token usable only to mint a new access token
    Refresh,
}

/// Claims carried by an access token.
///
/// Wire names (`userId`, `workspaceId`, `type`) match the claim contract the
/// backend services already consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject user id
    #[serde(rename = "userId")]
    pub user_id: String,
    /// User email
    pub email: String,
    /// Display name
    pub name: String,
    /// Active workspace, if one was selected at login
    #[serde(
        rename = "workspaceId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub workspace_id: Option<String>,
    /// Capability names granted within the workspace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
    /// Token type tag, always `access`
    #[serde(rename = "type")]
    pub token_type: TokenType,
    /// Issued at (Unix seconds)
    pub iat: u64,
    /// Expiration (Unix seconds)
    pub exp: u64,
}

/// Claims carried by a refresh token. Deliberately minimal: subject only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// Subject user id
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Token type tag, always `refresh`
    #[serde(rename = "type")]
    pub token_type: TokenType,
    /// Issued at (Unix seconds)
    pub iat: u64,
    /// Expiration (Unix seconds)
    pub exp: u64,
}

/// A freshly issued token plus the cookie max-age matching its validity.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The compact JWT string
    pub token: String,
    /// Validity window in seconds, used as the cookie Max-Age
    pub max_age: u64,
}

/// Configuration for JWT operations. Immutable after startup.
#[derive(Clone)]
pub struct JwtConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_validity_secs: u64,
    refresh_validity_secs: u64,
}

impl JwtConfig {
    /// Create a new JWT configuration with the given secret and validity
    /// windows (in minutes, matching the deployment configuration format).
    pub fn new(secret: &[u8], access_token_minutes: u64, refresh_token_minutes: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_validity_secs: access_token_minutes * 60,
            refresh_validity_secs: refresh_token_minutes * 60,
        }
    }

    /// Access token validity in seconds.
    pub fn access_validity_secs(&self) -> u64 {
        self.access_validity_secs
    }

    /// Refresh token validity in seconds.
    pub fn refresh_validity_secs(&self) -> u64 {
        self.refresh_validity_secs
    }

    /// Issue an access token carrying identity and optional authorization
    /// claims.
    pub fn issue_access_token(
        &self,
        user_id: &str,
        email: &str,
        name: &str,
        workspace_id: Option<String>,
        permissions: Option<Vec<String>>,
    ) -> Result<IssuedToken, JwtError> {
        let now = now_secs()?;
        let claims = AccessClaims {
            user_id: user_id.to_string(),
            email: email.to_string(),
            name: name.to_string(),
            workspace_id,
            permissions,
            token_type: TokenType::Access,
            iat: now,
            exp: now + self.access_validity_secs,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(JwtError::Encoding)?;

        Ok(IssuedToken {
            token,
            max_age: self.access_validity_secs,
        })
    }

    /// Issue a refresh token carrying only the subject user id.
    pub fn issue_refresh_token(&self, user_id: &str) -> Result<IssuedToken, JwtError> {
        let now = now_secs()?;
        let claims = RefreshClaims {
            user_id: user_id.to_string(),
            token_type: TokenType::Refresh,
            iat: now,
            exp: now + self.refresh_validity_secs,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(JwtError::Encoding)?;

        Ok(IssuedToken {
            token,
            max_age: self.refresh_validity_secs,
        })
    }

    /// Validate and decode an access token: structure, signature, expiry,
    /// and exact type match. A token is invalid from its `exp` second onward.
    pub fn validate_access_token(&self, token: &str) -> Result<AccessClaims, JwtError> {
        let claims: AccessClaims = self.decode(token)?;
        // jsonwebtoken only rejects exp < now; the contract is strict.
        if claims.exp <= now_secs()? {
            return Err(JwtError::Expired);
        }
        if claims.token_type != TokenType::Access {
            return Err(JwtError::WrongTokenType);
        }
        Ok(claims)
    }

    /// Validate and decode a refresh token.
    pub fn validate_refresh_token(&self, token: &str) -> Result<RefreshClaims, JwtError> {
        let claims: RefreshClaims = self.decode(token)?;
        if claims.exp <= now_secs()? {
            return Err(JwtError::Expired);
        }
        if claims.token_type != TokenType::Refresh {
            return Err(JwtError::WrongTokenType);
        }
        Ok(claims)
    }

    /// True iff the token decodes, is typed `access`, and is not expired.
    /// Never panics; any failure yields `false`.
    pub fn is_valid_access_token(&self, token: &str) -> bool {
        self.validate_access_token(token).is_ok()
    }

    /// True iff the token decodes, is typed `refresh`, and is not expired.
    pub fn is_valid_refresh_token(&self, token: &str) -> bool {
        self.validate_refresh_token(token).is_ok()
    }

    /// Best-effort extraction of the subject user id from either token
    /// shape. Absence and decode failure both yield `None`; callers that
    /// must distinguish them validate first.
    pub fn extract_user_id(&self, token: &str) -> Option<String> {
        if let Ok(claims) = self.validate_access_token(token) {
            return Some(claims.user_id);
        }
        self.validate_refresh_token(token)
            .ok()
            .map(|claims| claims.user_id)
    }

    fn decode<T: DeserializeOwned>(&self, token: &str) -> Result<T, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        jsonwebtoken::decode::<T>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(JwtError::from_decode)
    }
}

fn now_secs() -> Result<u64, JwtError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| JwtError::Time)
}

/// Errors that can occur during JWT operations.
#[derive(Debug)]
pub enum JwtError {
    /// Bad structure, bad signature, or undecodable claims
    Malformed,
    /// Signature valid but `exp` has elapsed
    Expired,
    /// Correct shape but an unrecognized signing scheme
    Unsupported,
    /// Token type does not match the validation context
    WrongTokenType,
    /// System clock is before the Unix epoch
    Time,
    /// Error encoding a new token
    Encoding(jsonwebtoken::errors::Error),
}

impl JwtError {
    fn from_decode(e: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match e.kind() {
            ErrorKind::ExpiredSignature => JwtError::Expired,
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => JwtError::Unsupported,
            _ => JwtError::Malformed,
        }
    }
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::Malformed => write!(f, "Malformed token"),
            JwtError::Expired => write!(f, "Token has expired"),
            JwtError::Unsupported => write!(f, "Unsupported signing scheme"),
            JwtError::WrongTokenType => write!(f, "Wrong token type"),
            JwtError::Time => write!(f, "System time error"),
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
        }
    }
}

impl std::error::Error for JwtError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> JwtConfig {
        JwtConfig::new(b"test-secret-key-for-testing", 15, 60 * 24 * 7)
    }

    #[test]
    fn test_issue_and_validate_access_token() {
        let config = test_config();

        let issued = config
            .issue_access_token("u1", "a@example.com", "A", None, None)
            .unwrap();
        assert_eq!(issued.max_age, 15 * 60);

        let claims = config.validate_access_token(&issued.token).unwrap();
        assert_eq!(claims.user_id, "u1");
        assert_eq!(claims.email, "a@example.com");
        assert_eq!(claims.name, "A");
        assert_eq!(claims.token_type, TokenType::Access);
        assert_eq!(claims.workspace_id, None);
        assert_eq!(claims.permissions, None);
        assert_eq!(claims.exp, claims.iat + 15 * 60);
    }

    #[test]
    fn test_issue_and_validate_refresh_token() {
        let config = test_config();

        let issued = config.issue_refresh_token("u1").unwrap();
        assert_eq!(issued.max_age, 60 * 24 * 7 * 60);

        let claims = config.validate_refresh_token(&issued.token).unwrap();
        assert_eq!(claims.user_id, "u1");
        assert_eq!(claims.token_type, TokenType::Refresh);
    }

    #[test]
    fn test_workspace_and_permissions_round_trip() {
        let config = test_config();

        let issued = config
            .issue_access_token(
                "u1",
                "a@example.com",
                "A",
                Some("ws-9".to_string()),
                Some(vec!["posts:read".to_string(), "posts:write".to_string()]),
            )
            .unwrap();

        let claims = config.validate_access_token(&issued.token).unwrap();
        assert_eq!(claims.workspace_id.as_deref(), Some("ws-9"));
        assert_eq!(
            claims.permissions,
            Some(vec!["posts:read".to_string(), "posts:write".to_string()])
        );
    }

    #[test]
    fn test_wrong_token_type_rejected() {
        let config = test_config();

        let access = config
            .issue_access_token("u1", "a@example.com", "A", None, None)
            .unwrap();
        let refresh = config.issue_refresh_token("u1").unwrap();

        assert!(!config.is_valid_refresh_token(&access.token));
        assert!(!config.is_valid_access_token(&refresh.token));

        // A token is never valid as both types.
        for token in [&access.token, &refresh.token] {
            assert!(!(config.is_valid_access_token(token) && config.is_valid_refresh_token(token)));
        }
    }

    #[test]
    fn test_garbage_input_is_malformed_not_panic() {
        let config = test_config();

        for input in ["", "not-a-token", "a.b", "a.b.c.d", "\u{0}\u{1}"] {
            assert!(matches!(
                config.validate_access_token(input),
                Err(JwtError::Malformed)
            ));
            assert!(!config.is_valid_access_token(input));
            assert_eq!(config.extract_user_id(input), None);
        }
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let config1 = JwtConfig::new(b"secret-1", 15, 60);
        let config2 = JwtConfig::new(b"secret-2", 15, 60);

        let issued = config1
            .issue_access_token("u1", "a@example.com", "A", None, None)
            .unwrap();

        assert!(matches!(
            config2.validate_access_token(&issued.token),
            Err(JwtError::Malformed)
        ));
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let config = test_config();
        let issued = config
            .issue_access_token("u1", "a@example.com", "A", None, None)
            .unwrap();

        let mut tampered = issued.token.clone();
        // Flip the last signature character.
        let last = tampered.pop().unwrap();
        tampered.push(if last == 'A' { 'B' } else { 'A' });

        assert!(!config.is_valid_access_token(&tampered));
    }

    #[test]
    fn test_expired_token() {
        let secret = b"test-secret";
        let encoding_key = EncodingKey::from_secret(secret);

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();

        let claims = AccessClaims {
            user_id: "u1".to_string(),
            email: "a@example.com".to_string(),
            name: "A".to_string(),
            workspace_id: None,
            permissions: None,
            token_type: TokenType::Access,
            iat: now - 100,
            exp: now - 50,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &encoding_key).unwrap();

        let config = JwtConfig::new(secret, 15, 60);
        assert!(matches!(
            config.validate_access_token(&token),
            Err(JwtError::Expired)
        ));
        assert!(!config.is_valid_access_token(&token));
    }

    #[test]
    fn test_token_expiring_this_second_is_already_expired() {
        let secret = b"test-secret-key-for-testing";
        let encoding_key = EncodingKey::from_secret(secret);

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();

        // exp == now: the validity window has fully elapsed.
        let claims = AccessClaims {
            user_id: "u1".to_string(),
            email: "a@example.com".to_string(),
            name: "A".to_string(),
            workspace_id: None,
            permissions: None,
            token_type: TokenType::Access,
            iat: now - 60,
            exp: now,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &encoding_key).unwrap();

        let config = JwtConfig::new(secret, 15, 60);
        assert!(matches!(
            config.validate_access_token(&token),
            Err(JwtError::Expired)
        ));
        assert!(!config.is_valid_access_token(&token));
    }

    #[test]
    fn test_unsupported_algorithm() {
        let secret = b"test-secret-key-for-testing";
        let encoding_key = EncodingKey::from_secret(secret);

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();

        let claims = RefreshClaims {
            user_id: "u1".to_string(),
            token_type: TokenType::Refresh,
            iat: now,
            exp: now + 60,
        };

        // Signed with HS384: structurally sound, but not a scheme we accept.
        let token =
            jsonwebtoken::encode(&Header::new(Algorithm::HS384), &claims, &encoding_key).unwrap();

        let config = JwtConfig::new(secret, 15, 60);
        assert!(matches!(
            config.validate_refresh_token(&token),
            Err(JwtError::Unsupported)
        ));
    }

    #[test]
    fn test_extract_user_id() {
        let config = test_config();

        let access = config
            .issue_access_token("u1", "a@example.com", "A", None, None)
            .unwrap();
        let refresh = config.issue_refresh_token("u2").unwrap();

        assert_eq!(config.extract_user_id(&access.token).as_deref(), Some("u1"));
        assert_eq!(
            config.extract_user_id(&refresh.token).as_deref(),
            Some("u2")
        );
    }
}
