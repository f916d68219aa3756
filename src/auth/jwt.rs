//! Identity-provider session tokens
//!
//! The owner's second session is the identity provider's access token, an
//! HS256 JWT signed with the provider's project secret. We only verify it;
//! `issue` exists for dev mode and tests.
//!
//! Executors get a token of our own after Google sign-in: an HS256 JWT
//! pinned to [`EXECUTOR_AUDIENCE`] and signed with a separate secret. The
//! plain email and subject cookies are display hints; this token is the
//! credential.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::types::HeirloomError;

/// Claims carried by the provider's access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderClaims {
    /// Provider user id; this is the owner's account id
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Result of token validation
#[derive(Debug)]
pub struct TokenValidationResult {
    pub valid: bool,
    pub claims: Option<ProviderClaims>,
    pub error: Option<String>,
}

impl TokenValidationResult {
    pub fn valid(claims: ProviderClaims) -> Self {
        Self {
            valid: true,
            claims: Some(claims),
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            claims: None,
            error: Some(error.into()),
        }
    }
}

fn check_secret(name: &str, secret: &str) -> Result<(), HeirloomError> {
    if secret.is_empty() {
        return Err(HeirloomError::Config(format!(
            "{} is required in production mode",
            name
        )));
    }
    if secret.len() < 32 {
        return Err(HeirloomError::Config(format!(
            "{} must be at least 32 characters",
            name
        )));
    }
    Ok(())
}

fn now_secs() -> Result<u64, HeirloomError> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| HeirloomError::Internal(format!("System time error: {}", e)))?
        .as_secs())
}

/// Verifier for provider access tokens
#[derive(Clone)]
pub struct ProviderJwtValidator {
    secret: String,
}

impl ProviderJwtValidator {
    /// Returns an error if the secret is empty or too short
    pub fn new(secret: String) -> Result<Self, HeirloomError> {
        check_secret("PROVIDER_JWT_SECRET", &secret)?;
        Ok(Self { secret })
    }

    /// Create a validator for dev mode (allows empty secret)
    pub fn new_dev() -> Self {
        Self {
            secret: "dev-mode-secret-not-for-production-use-123456".into(),
        }
    }

    /// Sign a token for `sub`, valid for `ttl_seconds`
    pub fn issue(
        &self,
        sub: &str,
        email: Option<&str>,
        ttl_seconds: u64,
    ) -> Result<String, HeirloomError> {
        let now = now_secs()?;

        let claims = ProviderClaims {
            sub: sub.to_string(),
            email: email.map(str::to_string),
            iat: now,
            exp: now + ttl_seconds,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| HeirloomError::Internal(format!("Failed to generate token: {}", e)))
    }

    /// Verify and decode a provider token
    pub fn verify_token(&self, token: &str) -> TokenValidationResult {
        let mut validation = Validation::default();
        // Provider tokens carry a project-specific audience we don't pin
        validation.validate_aud = false;

        match decode::<ProviderClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        ) {
            Ok(token_data) if token_data.claims.sub.is_empty() => {
                TokenValidationResult::invalid("Token has no subject")
            }
            Ok(token_data) => TokenValidationResult::valid(token_data.claims),
            Err(err) => {
                use jsonwebtoken::errors::ErrorKind;
                let error_msg = match err.kind() {
                    ErrorKind::ExpiredSignature => "Token expired",
                    ErrorKind::InvalidToken => "Invalid token",
                    ErrorKind::InvalidSignature => "Invalid signature",
                    _ => "Token validation failed",
                };
                TokenValidationResult::invalid(error_msg)
            }
        }
    }
}

/// Audience claim every executor session token carries
pub const EXECUTOR_AUDIENCE: &str = "heirloom-executor";

/// Claims of an executor session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorClaims {
    /// Google subject verified at sign-in
    pub sub: String,
    pub email: String,
    pub aud: String,
    pub iat: u64,
    pub exp: u64,
}

/// Issues and verifies executor session tokens
#[derive(Clone)]
pub struct ExecutorSessionSigner {
    secret: String,
}

impl ExecutorSessionSigner {
    pub fn new(secret: String) -> Result<Self, HeirloomError> {
        check_secret("EXECUTOR_SESSION_SECRET", &secret)?;
        Ok(Self { secret })
    }

    /// Signer for dev mode; never shares a key with the provider validator
    pub fn new_dev() -> Self {
        Self {
            secret: "dev-mode-executor-secret-not-for-production-use".into(),
        }
    }

    /// Sign a session for a Google-verified executor
    pub fn issue(&self, subject: &str, email: &str, ttl_seconds: u64) -> Result<String, HeirloomError> {
        if subject.is_empty() || email.trim().is_empty() {
            return Err(HeirloomError::Internal(
                "Executor session needs a subject and email".into(),
            ));
        }
        let now = now_secs()?;
        let claims = ExecutorClaims {
            sub: subject.to_string(),
            email: email.trim().to_lowercase(),
            aud: EXECUTOR_AUDIENCE.to_string(),
            iat: now,
            exp: now + ttl_seconds,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| HeirloomError::Internal(format!("Failed to generate token: {}", e)))
    }

    /// Claims of a well-signed, unexpired executor token
    pub fn verify(&self, token: &str) -> Option<ExecutorClaims> {
        let mut validation = Validation::default();
        validation.set_audience(&[EXECUTOR_AUDIENCE]);
        validation.set_required_spec_claims(&["exp", "aud", "sub"]);

        match decode::<ExecutorClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        ) {
            Ok(data) if data.claims.sub.is_empty() || data.claims.email.is_empty() => None,
            Ok(data) => Some(data.claims),
            Err(err) => {
                debug!("Executor session rejected: {}", err);
                None
            }
        }
    }
}

/// Extract token from Authorization header.
/// Supports "Bearer <token>" format and raw tokens.
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;

    if let Some(token) = header.strip_prefix("Bearer ") {
        let token = token.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    if !header.contains(' ') {
        let token = header.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    None
}
