//! Owner cookie sessions
//!
//! A session row is created from a valid provider token. Together the
//! cookie and the provider token form the owner's two sessions.

use chrono::Duration;
use std::sync::Arc;
use tracing::info;

use crate::auth::{generate_session_id, ProviderJwtValidator};
use crate::db::schemas::OwnerSessionDoc;
use crate::store::Store;
use crate::types::{HeirloomError, Result};

pub struct OwnerSessions {
    store: Arc<dyn Store>,
    validator: ProviderJwtValidator,
    ttl: Duration,
}

impl OwnerSessions {
    pub fn new(store: Arc<dyn Store>, validator: ProviderJwtValidator, ttl: Duration) -> Self {
        Self {
            store,
            validator,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Open a cookie session for the owner named by `provider_token`
    pub async fn establish(&self, provider_token: &str) -> Result<OwnerSessionDoc> {
        let result = self.validator.verify_token(provider_token);
        let Some(claims) = result.claims.filter(|_| result.valid) else {
            return Err(HeirloomError::AuthenticationRequired);
        };

        let session = OwnerSessionDoc::new(generate_session_id(), claims.sub, self.ttl);
        self.store.insert_session(session.clone()).await?;
        info!(user_id = %session.user_id, "Owner session established");
        Ok(session)
    }

    pub async fn end(&self, session_id: &str) -> Result<()> {
        self.store.delete_session(session_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, OwnerSessionStore};
    use chrono::Utc;

    fn validator() -> ProviderJwtValidator {
        ProviderJwtValidator::new("test-secret-that-is-at-least-32-characters-long".into())
            .unwrap()
    }

    #[tokio::test]
    async fn test_establish_and_end() {
        let store = Arc::new(MemoryStore::new());
        let sessions = OwnerSessions::new(store.clone(), validator(), Duration::hours(24));
        let token = validator().issue("owner-1", None, 3600).unwrap();

        let session = sessions.establish(&token).await.unwrap();
        assert_eq!(session.user_id, "owner-1");
        assert_eq!(session.session_id.len(), 64);
        assert!(session.is_valid(Utc::now()));
        assert!(store.find_session(&session.session_id).await.unwrap().is_some());

        sessions.end(&session.session_id).await.unwrap();
        assert!(store.find_session(&session.session_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_provider_token_rejected() {
        let sessions = OwnerSessions::new(
            Arc::new(MemoryStore::new()),
            validator(),
            Duration::hours(24),
        );
        let err = sessions.establish("garbage").await.unwrap_err();
        assert!(matches!(err, HeirloomError::AuthenticationRequired));
    }
}
