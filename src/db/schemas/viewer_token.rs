//! Viewer token schema
//!
//! Single-use, time-limited login tokens emailed to invited contacts.
//! Tokens are never deleted; a consumed token stays as an audit record
//! with `used = true`.

use bson::{doc, oid::ObjectId, Document};
use chrono::{DateTime, Duration, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use super::metadata::Metadata;
use crate::db::mongo::{IntoIndexes, MutMetadata};

/// Collection name for viewer tokens
pub const VIEWER_TOKEN_COLLECTION: &str = "viewer_tokens";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ViewerTokenDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Public token record identifier (UUID), echoed in the viewer session
    pub token_id: String,

    /// Contact the token logs in as
    pub contact_id: String,

    /// Owner of that contact
    pub user_id: String,

    /// The secret token string
    pub token: String,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub expires_at: DateTime<Utc>,

    #[serde(default)]
    pub used: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_at: Option<bson::DateTime>,
}

impl ViewerTokenDoc {
    pub fn new(
        contact_id: impl Into<String>,
        user_id: impl Into<String>,
        token: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            id: None,
            metadata: Metadata::new(),
            token_id: uuid::Uuid::new_v4().to_string(),
            contact_id: contact_id.into(),
            user_id: user_id.into(),
            token: token.into(),
            expires_at: Utc::now() + ttl,
            used: false,
            used_at: None,
        }
    }

    /// Whether the token could still be consumed at `now`
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        !self.used && !self.metadata.is_deleted && now < self.expires_at
    }
}

impl IntoIndexes for ViewerTokenDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "token": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("token_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "contact_id": 1 },
                Some(
                    IndexOptions::builder()
                        .name("contact_id_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for ViewerTokenDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
