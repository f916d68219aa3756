//! Federated login for executors
//!
//! Executors sign in with Google. The ID token from the browser is checked
//! against Google's tokeninfo endpoint, which returns the verified claims.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::types::{HeirloomError, Result};

/// Identity proven by a federated login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedIdentity {
    /// Provider subject id
    pub subject: String,
    /// Verified email, lower-cased
    pub email: String,
}

#[async_trait]
pub trait FederatedVerifier: Send + Sync {
    /// Verify an ID token.
    ///
    /// A rejected token is `AuthenticationRequired`; failing to reach the
    /// provider is `Upstream`.
    async fn verify(&self, id_token: &str) -> Result<FederatedIdentity>;
}

/// Claims returned by the tokeninfo endpoint.
///
/// Google encodes `email_verified` as a string, so it is read loosely.
#[derive(Debug, Deserialize)]
struct TokenInfo {
    sub: Option<String>,
    email: Option<String>,
    aud: Option<String>,
    #[serde(default)]
    email_verified: Value,
}

impl TokenInfo {
    fn email_verified(&self) -> bool {
        match &self.email_verified {
            Value::Bool(b) => *b,
            Value::String(s) => s == "true",
            _ => false,
        }
    }
}

pub struct GoogleTokenVerifier {
    client: Client,
    tokeninfo_url: String,
    /// Expected `aud`; unchecked when unset (dev mode)
    client_id: Option<String>,
}

impl GoogleTokenVerifier {
    pub fn new(
        tokeninfo_url: impl Into<String>,
        client_id: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HeirloomError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            tokeninfo_url: tokeninfo_url.into(),
            client_id,
        })
    }
}

#[async_trait]
impl FederatedVerifier for GoogleTokenVerifier {
    async fn verify(&self, id_token: &str) -> Result<FederatedIdentity> {
        let response = self
            .client
            .get(&self.tokeninfo_url)
            .query(&[("id_token", id_token)])
            .send()
            .await?;

        let status = response.status();
        if status.is_client_error() {
            debug!("tokeninfo rejected ID token: HTTP {}", status);
            return Err(HeirloomError::AuthenticationRequired);
        }
        if !status.is_success() {
            return Err(HeirloomError::Upstream(format!("tokeninfo HTTP {}", status)));
        }

        let info: TokenInfo = response
            .json()
            .await
            .map_err(|e| HeirloomError::Upstream(format!("tokeninfo parse error: {}", e)))?;

        if let Some(expected) = self.client_id.as_deref() {
            if info.aud.as_deref() != Some(expected) {
                warn!("ID token issued for another client: {:?}", info.aud);
                return Err(HeirloomError::AuthenticationRequired);
            }
        }

        if !info.email_verified() {
            return Err(HeirloomError::AuthenticationRequired);
        }

        match (info.sub, info.email) {
            (Some(subject), Some(email)) if !subject.is_empty() && !email.is_empty() => {
                Ok(FederatedIdentity {
                    subject,
                    email: email.trim().to_lowercase(),
                })
            }
            _ => Err(HeirloomError::AuthenticationRequired),
        }
    }
}
