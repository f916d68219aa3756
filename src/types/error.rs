//! Error types for Heirloom
//!
//! Every failure maps to a stable HTTP status and a stable machine code so
//! the UI can tell "who are you?" apart from "you can't see this" and from
//! "not released yet".

use hyper::StatusCode;

/// Main error type for Heirloom operations
#[derive(Debug, thiserror::Error)]
pub enum HeirloomError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// No identity could be resolved from the request credentials
    #[error("Authentication required")]
    AuthenticationRequired,

    /// Identity resolved, but it may not see this category or perform this action
    #[error("Access denied: {0}")]
    AuthorizationDenied(String),

    /// Token lookup failed. The cause is never disclosed.
    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,

    /// Executor or scheduled-letter path blocked until release is activated
    #[error("Not yet released")]
    NotYetReleased,

    /// The requested end state already holds
    #[error("Conflicting state: {0}")]
    ConflictingState(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A unique index rejected the write
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Email, identity provider or other outbound call failed
    #[error("Upstream failure: {0}")]
    Upstream(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HeirloomError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            Self::AuthorizationDenied(_) => StatusCode::FORBIDDEN,
            Self::InvalidOrExpiredToken => StatusCode::UNAUTHORIZED,
            Self::NotYetReleased => StatusCode::LOCKED,
            Self::ConflictingState(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::DuplicateKey(_) => StatusCode::CONFLICT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for the response body
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::AuthenticationRequired => "AUTHENTICATION_REQUIRED",
            Self::AuthorizationDenied(_) => "AUTHORIZATION_DENIED",
            Self::InvalidOrExpiredToken => "INVALID_OR_EXPIRED_TOKEN",
            Self::NotYetReleased => "NOT_YET_RELEASED",
            Self::ConflictingState(_) => "CONFLICTING_STATE",
            Self::NotFound(_) => "NOT_FOUND",
            Self::DuplicateKey(_) => "DUPLICATE",
            Self::Upstream(_) => "UPSTREAM_FAILURE",
            Self::Database(_) => "DB_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show to a client.
    ///
    /// Store, upstream and internal detail stays in the server log.
    pub fn public_message(&self) -> String {
        match self {
            Self::Upstream(_) | Self::Database(_) | Self::Config(_) | Self::Internal(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }

    /// True for failures the caller could not have caused
    pub fn is_server_fault(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl From<std::io::Error> for HeirloomError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for HeirloomError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for HeirloomError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

impl From<reqwest::Error> for HeirloomError {
    fn from(err: reqwest::Error) -> Self {
        Self::Upstream(err.to_string())
    }
}

impl From<mongodb::error::Error> for HeirloomError {
    fn from(err: mongodb::error::Error) -> Self {
        if crate::db::mongo::is_duplicate_key(&err) {
            Self::DuplicateKey(err.to_string())
        } else {
            Self::Database(err.to_string())
        }
    }
}

impl From<bson::ser::Error> for HeirloomError {
    fn from(err: bson::ser::Error) -> Self {
        Self::Internal(format!("BSON serialization error: {}", err))
    }
}

impl From<bson::de::Error> for HeirloomError {
    fn from(err: bson::de::Error) -> Self {
        Self::Database(format!("BSON deserialization error: {}", err))
    }
}

/// Result type alias for Heirloom operations
pub type Result<T> = std::result::Result<T, HeirloomError>;
