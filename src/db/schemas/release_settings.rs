//! Release settings schema
//!
//! One document per owner. `release_activated` is the single source of
//! truth for executor access and scheduled-letter delivery; it is set once
//! and never cleared.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use super::metadata::Metadata;
use crate::db::mongo::{IntoIndexes, MutMetadata};

/// Collection name for release settings
pub const RELEASE_SETTINGS_COLLECTION: &str = "release_settings";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReleaseSettingsDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub user_id: String,

    /// Whether a disclosure mechanism is configured
    #[serde(default)]
    pub is_locked: bool,

    /// Trusted contact designated as executor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_contact_id: Option<String>,

    /// Argon2 PHC hash of the unlock code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlock_code_hash: Option<String>,

    #[serde(default)]
    pub release_activated: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_activated_at: Option<bson::DateTime>,
}

impl ReleaseSettingsDoc {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            id: None,
            metadata: Metadata::new(),
            user_id: user_id.into(),
            ..Default::default()
        }
    }
}

impl IntoIndexes for ReleaseSettingsDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "user_id": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("user_id_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for ReleaseSettingsDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
