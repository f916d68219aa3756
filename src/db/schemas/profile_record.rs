//! Owner profile records
//!
//! Biography, funeral preferences, documents and the rest of an owner's
//! plan are attribute bags keyed by owner. Singleton kinds have at most one
//! record per owner (enforced by a partial unique index); collection kinds
//! have any number.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::metadata::Metadata;
use crate::auth::Category;
use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::types::HeirloomError;

/// Collection name for profile records
pub const PROFILE_RECORD_COLLECTION: &str = "profile_records";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    #[default]
    PersonalDetails,
    MedicalContacts,
    FuneralPreferences,
    HouseholdInfo,
    Biography,
    EndOfLifeChecklist,
    WillQuestionnaire,
    Onboarding,
    Documents,
    LegacyMessages,
    Assets,
    DigitalAccounts,
    FamilyLegacy,
}

impl RecordKind {
    pub const ALL: [RecordKind; 13] = [
        RecordKind::PersonalDetails,
        RecordKind::MedicalContacts,
        RecordKind::FuneralPreferences,
        RecordKind::HouseholdInfo,
        RecordKind::Biography,
        RecordKind::EndOfLifeChecklist,
        RecordKind::WillQuestionnaire,
        RecordKind::Onboarding,
        RecordKind::Documents,
        RecordKind::LegacyMessages,
        RecordKind::Assets,
        RecordKind::DigitalAccounts,
        RecordKind::FamilyLegacy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::PersonalDetails => "personal_details",
            RecordKind::MedicalContacts => "medical_contacts",
            RecordKind::FuneralPreferences => "funeral_preferences",
            RecordKind::HouseholdInfo => "household_info",
            RecordKind::Biography => "biography",
            RecordKind::EndOfLifeChecklist => "end_of_life_checklist",
            RecordKind::WillQuestionnaire => "will_questionnaire",
            RecordKind::Onboarding => "onboarding",
            RecordKind::Documents => "documents",
            RecordKind::LegacyMessages => "legacy_messages",
            RecordKind::Assets => "assets",
            RecordKind::DigitalAccounts => "digital_accounts",
            RecordKind::FamilyLegacy => "family_legacy",
        }
    }

    /// At most one record of this kind per owner
    pub fn is_singleton(&self) -> bool {
        !matches!(
            self,
            RecordKind::Documents
                | RecordKind::LegacyMessages
                | RecordKind::Assets
                | RecordKind::DigitalAccounts
                | RecordKind::FamilyLegacy
        )
    }

    /// Record kind holding a shareable category's data.
    ///
    /// Letters live in their own collection, so they map to `None`.
    pub fn for_category(category: Category) -> Option<RecordKind> {
        match category {
            Category::PersonalDetails => Some(RecordKind::PersonalDetails),
            Category::MedicalContacts => Some(RecordKind::MedicalContacts),
            Category::FuneralPreferences => Some(RecordKind::FuneralPreferences),
            Category::Documents => Some(RecordKind::Documents),
            Category::LegacyMessages => Some(RecordKind::LegacyMessages),
            Category::Letters => None,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = HeirloomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| HeirloomError::BadRequest(format!("Unknown record kind: {}", s)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProfileRecordDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub record_id: String,

    pub user_id: String,

    pub kind: RecordKind,

    /// Copied from `kind` so the partial unique index can filter on it
    #[serde(default)]
    pub singleton: bool,

    #[serde(default)]
    pub fields: Document,
}

impl ProfileRecordDoc {
    pub fn new(user_id: impl Into<String>, kind: RecordKind, fields: Document) -> Self {
        Self {
            id: None,
            metadata: Metadata::new(),
            record_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            kind,
            singleton: kind.is_singleton(),
            fields,
        }
    }
}

impl IntoIndexes for ProfileRecordDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "record_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("record_id_unique".to_string())
                        .build(),
                ),
            ),
            // One singleton per owner and kind; concurrent first saves race here
            (
                doc! { "user_id": 1, "kind": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .partial_filter_expression(doc! { "singleton": true })
                        .name("singleton_per_owner".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for ProfileRecordDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
