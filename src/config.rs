//! Configuration for Heirloom
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

use crate::auth::{CookiePolicy, ExecutorSessionSigner, ProviderJwtValidator};
use crate::types::HeirloomError;

/// Heirloom - access gateway for end-of-life plans
#[derive(Parser, Debug, Clone)]
#[command(name = "heirloom")]
#[command(about = "Trusted viewer, executor and release gateway for end-of-life plans")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Enable development mode (in-memory fallback, log-only email, insecure cookies)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "heirloom")]
    pub mongodb_db: String,

    /// Public URL of the web app; invitation links and CORS origin derive from it
    #[arg(long, env = "APP_BASE_URL", default_value = "http://localhost:3000")]
    pub app_base_url: String,

    /// Identity provider JWT secret (required in production)
    #[arg(long, env = "PROVIDER_JWT_SECRET")]
    pub provider_jwt_secret: Option<String>,

    /// Signing secret for executor session cookies (required in production)
    #[arg(long, env = "EXECUTOR_SESSION_SECRET")]
    pub executor_session_secret: Option<String>,

    /// Expected audience of executor Google ID tokens
    #[arg(long, env = "GOOGLE_CLIENT_ID")]
    pub google_client_id: Option<String>,

    /// Google tokeninfo endpoint
    #[arg(
        long,
        env = "GOOGLE_TOKENINFO_URL",
        default_value = "https://oauth2.googleapis.com/tokeninfo"
    )]
    pub google_tokeninfo_url: String,

    /// Bearer secret for the scheduled-letters cron endpoint (required in production)
    #[arg(long, env = "CRON_SECRET")]
    pub cron_secret: Option<String>,

    /// Transactional email API endpoint
    #[arg(long, env = "EMAIL_API_URL", default_value = "https://api.resend.com/emails")]
    pub email_api_url: String,

    /// Transactional email API key; email is only logged when unset in dev mode
    #[arg(long, env = "EMAIL_API_KEY")]
    pub email_api_key: Option<String>,

    /// Sender address
    #[arg(long, env = "EMAIL_FROM", default_value = "Heirloom <noreply@heirloom.local>")]
    pub email_from: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log format (text or json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Timeout for outbound HTTP calls in milliseconds
    #[arg(long, env = "OUTBOUND_TIMEOUT_MS", default_value = "10000")]
    pub outbound_timeout_ms: u64,

    /// Lifetime of viewer login tokens in days
    #[arg(long, env = "VIEWER_TOKEN_TTL_DAYS", default_value = "7")]
    pub viewer_token_ttl_days: i64,

    /// Lifetime of owner cookie sessions in hours
    #[arg(long, env = "OWNER_SESSION_TTL_HOURS", default_value = "24")]
    pub owner_session_ttl_hours: i64,

    /// Lifetime of executor identity cookies in days
    #[arg(long, env = "EXECUTOR_COOKIE_DAYS", default_value = "30")]
    pub executor_cookie_days: i64,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode {
            match self.provider_jwt_secret.as_deref() {
                None | Some("") => {
                    return Err("PROVIDER_JWT_SECRET is required in production mode".to_string())
                }
                Some(s) if s.len() < 32 => {
                    return Err("PROVIDER_JWT_SECRET must be at least 32 characters".to_string())
                }
                _ => {}
            }
            match self.executor_session_secret.as_deref() {
                None | Some("") => {
                    return Err("EXECUTOR_SESSION_SECRET is required in production mode".to_string())
                }
                Some(s) if s.len() < 32 => {
                    return Err("EXECUTOR_SESSION_SECRET must be at least 32 characters".to_string())
                }
                Some(s) if Some(s) == self.provider_jwt_secret.as_deref() => {
                    return Err(
                        "EXECUTOR_SESSION_SECRET must differ from PROVIDER_JWT_SECRET".to_string()
                    )
                }
                _ => {}
            }
            if self.cron_secret.as_deref().map_or(true, str::is_empty) {
                return Err("CRON_SECRET is required in production mode".to_string());
            }
            if self.email_api_key.is_none() {
                return Err("EMAIL_API_KEY is required in production mode".to_string());
            }
        }

        if self.viewer_token_ttl_days <= 0
            || self.owner_session_ttl_hours <= 0
            || self.executor_cookie_days <= 0
        {
            return Err("Token and session lifetimes must be positive".to_string());
        }

        if !self.app_base_url.starts_with("http://") && !self.app_base_url.starts_with("https://") {
            return Err("APP_BASE_URL must be an http(s) URL".to_string());
        }

        Ok(())
    }

    /// Provider token validator (dev secret when unset in dev mode)
    pub fn provider_validator(&self) -> Result<ProviderJwtValidator, HeirloomError> {
        match self.provider_jwt_secret.clone() {
            Some(secret) if !secret.is_empty() => ProviderJwtValidator::new(secret),
            _ if self.dev_mode => Ok(ProviderJwtValidator::new_dev()),
            _ => Err(HeirloomError::Config(
                "PROVIDER_JWT_SECRET is required in production mode".into(),
            )),
        }
    }

    /// Executor session signer (dev secret when unset in dev mode)
    pub fn executor_session_signer(&self) -> Result<ExecutorSessionSigner, HeirloomError> {
        match self.executor_session_secret.clone() {
            Some(secret) if !secret.is_empty() => ExecutorSessionSigner::new(secret),
            _ if self.dev_mode => Ok(ExecutorSessionSigner::new_dev()),
            _ => Err(HeirloomError::Config(
                "EXECUTOR_SESSION_SECRET is required in production mode".into(),
            )),
        }
    }

    pub fn outbound_timeout(&self) -> Duration {
        Duration::from_millis(self.outbound_timeout_ms)
    }

    pub fn cookie_policy(&self) -> CookiePolicy {
        CookiePolicy {
            secure: !self.dev_mode,
        }
    }

    /// Origin allowed to call the API with credentials
    pub fn cors_origin(&self) -> &str {
        self.app_base_url.trim_end_matches('/')
    }

    pub fn viewer_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.viewer_token_ttl_days)
    }

    pub fn owner_session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.owner_session_ttl_hours)
    }

    pub fn executor_cookie_max_age(&self) -> i64 {
        self.executor_cookie_days * 24 * 60 * 60
    }
}
