//! Letter schema
//!
//! Letters may be scheduled for automatic delivery on a release or
//! milestone date. `email_sent` is the de-duplication guard for the
//! delivery job and flips to true at most once per letter.

use bson::{doc, oid::ObjectId, Document};
use chrono::NaiveDate;
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use super::metadata::Metadata;
use crate::db::mongo::{IntoIndexes, MutMetadata};

/// Collection name for letters
pub const LETTER_COLLECTION: &str = "letters";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LetterDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub letter_id: String,

    /// Author (the owner)
    pub user_id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub body: String,

    /// Trusted contact the letter is addressed to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,

    #[serde(default)]
    pub recipient_name: String,

    /// Delivery address; falls back to the recipient contact's email
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_email: Option<String>,

    /// Stored as "YYYY-MM-DD"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestone_date: Option<NaiveDate>,

    #[serde(default)]
    pub auto_email_enabled: bool,

    #[serde(default)]
    pub email_sent: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_sent_at: Option<bson::DateTime>,
}

impl LetterDoc {
    pub fn new(user_id: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: None,
            metadata: Metadata::new(),
            letter_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            title: title.into(),
            body: body.into(),
            ..Default::default()
        }
    }

    /// Has a release or milestone date, i.e. is meant for deferred delivery
    pub fn is_scheduled(&self) -> bool {
        self.release_date.is_some() || self.milestone_date.is_some()
    }

    /// Whether the delivery job should consider this letter on `today`
    pub fn is_due_on(&self, today: NaiveDate) -> bool {
        self.auto_email_enabled
            && !self.email_sent
            && !self.metadata.is_deleted
            && (self.release_date == Some(today) || self.milestone_date == Some(today))
    }

    pub fn is_addressed_to(&self, contact_id: &str) -> bool {
        self.recipient_id.as_deref() == Some(contact_id)
    }
}

impl IntoIndexes for LetterDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "letter_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("letter_id_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "user_id": 1 },
                Some(
                    IndexOptions::builder()
                        .name("user_id_index".to_string())
                        .build(),
                ),
            ),
            // Delivery job scan
            (
                doc! { "auto_email_enabled": 1, "email_sent": 1 },
                Some(
                    IndexOptions::builder()
                        .name("pending_delivery_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for LetterDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
