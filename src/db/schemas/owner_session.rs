//! Owner session schema
//!
//! Server-side half of owner authentication. The random session id lives in
//! an httpOnly cookie and is joined against this collection on every request.

use bson::{doc, oid::ObjectId, Document};
use chrono::{DateTime, Duration, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use super::metadata::Metadata;
use crate::db::mongo::{IntoIndexes, MutMetadata};

/// Collection name for owner sessions
pub const OWNER_SESSION_COLLECTION: &str = "sessions";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OwnerSessionDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Opaque random id carried in the session cookie
    pub session_id: String,

    pub user_id: String,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub expires_at: DateTime<Utc>,
}

impl OwnerSessionDoc {
    pub fn new(session_id: impl Into<String>, user_id: impl Into<String>, ttl: Duration) -> Self {
        Self {
            id: None,
            metadata: Metadata::new(),
            session_id: session_id.into(),
            user_id: user_id.into(),
            expires_at: Utc::now() + ttl,
        }
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.metadata.is_deleted && now < self.expires_at
    }
}

impl IntoIndexes for OwnerSessionDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "session_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("session_id_unique".to_string())
                        .build(),
                ),
            ),
            // Expired sessions are reaped by MongoDB
            (
                doc! { "expires_at": 1 },
                Some(
                    IndexOptions::builder()
                        .expire_after(std::time::Duration::from_secs(0))
                        .name("expires_at_ttl".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for OwnerSessionDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
