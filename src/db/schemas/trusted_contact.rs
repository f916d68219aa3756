//! Trusted contact schema
//!
//! A person the owner shares part of their plan with. The same record backs
//! the designated executor, whose category access is evaluated against it.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::metadata::Metadata;
use crate::auth::{Category, LegacyColumns, PermissionSet, PermissionSource};
use crate::db::mongo::{IntoIndexes, MutMetadata};

/// Collection name for trusted contacts
pub const TRUSTED_CONTACT_COLLECTION: &str = "trusted_contacts";

/// Invitation status of a contact.
///
/// Ordered: a contact only ever moves to a later status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContactStatus {
    #[default]
    None,
    Invited,
    Accepted,
}

impl ContactStatus {
    /// Statuses a promotion to `self` may start from
    pub fn predecessors(&self) -> Vec<ContactStatus> {
        [ContactStatus::None, ContactStatus::Invited, ContactStatus::Accepted]
            .into_iter()
            .filter(|s| s < self)
            .collect()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContactStatus::None => "none",
            ContactStatus::Invited => "invited",
            ContactStatus::Accepted => "accepted",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TrustedContactDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Public contact identifier (UUID)
    pub contact_id: String,

    /// Owning account
    pub user_id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub email: Option<String>,

    /// Free-text relationship label ("daughter", "solicitor", ...)
    #[serde(default)]
    pub relationship: String,

    /// Role label ("viewer", "executor", ...)
    #[serde(default)]
    pub role: String,

    #[serde(default)]
    pub status: ContactStatus,

    /// Structured permission map; takes precedence over the columns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<BTreeMap<String, bool>>,

    #[serde(default)]
    pub can_view_personal_details: bool,
    #[serde(default)]
    pub can_view_medical_contacts: bool,
    #[serde(default)]
    pub can_view_funeral_preferences: bool,
    #[serde(default)]
    pub can_view_documents: bool,
    #[serde(default)]
    pub can_view_letters: bool,
    #[serde(default)]
    pub can_view_legacy_messages: bool,
}

impl TrustedContactDoc {
    pub fn new(
        user_id: impl Into<String>,
        name: impl Into<String>,
        email: Option<String>,
        relationship: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            metadata: Metadata::new(),
            contact_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            name: name.into(),
            email,
            relationship: relationship.into(),
            role: role.into(),
            status: ContactStatus::None,
            permissions: None,
            can_view_personal_details: false,
            can_view_medical_contacts: false,
            can_view_funeral_preferences: false,
            can_view_documents: false,
            can_view_letters: false,
            can_view_legacy_messages: false,
        }
    }

    /// The fixed boolean columns of this record
    pub fn legacy_columns(&self) -> LegacyColumns {
        LegacyColumns {
            can_view_personal_details: self.can_view_personal_details,
            can_view_medical_contacts: self.can_view_medical_contacts,
            can_view_funeral_preferences: self.can_view_funeral_preferences,
            can_view_documents: self.can_view_documents,
            can_view_letters: self.can_view_letters,
            can_view_legacy_messages: self.can_view_legacy_messages,
        }
    }

    /// The raw permission representation stored on this record
    pub fn permission_source(&self) -> PermissionSource {
        PermissionSource::from_record(self.permissions.as_ref(), &self.legacy_columns())
    }

    /// Normalized permissions
    pub fn permission_set(&self) -> PermissionSet {
        self.permission_source().normalize()
    }

    /// Store `set` in both shapes so the map and the columns agree
    pub fn apply_permissions(&mut self, set: &PermissionSet) {
        let mut legacy = LegacyColumns::default();
        for category in Category::ALL {
            legacy.set(category, set.allows(category));
        }
        self.permissions = Some(set.to_key_map());
        self.can_view_personal_details = legacy.can_view_personal_details;
        self.can_view_medical_contacts = legacy.can_view_medical_contacts;
        self.can_view_funeral_preferences = legacy.can_view_funeral_preferences;
        self.can_view_documents = legacy.can_view_documents;
        self.can_view_letters = legacy.can_view_letters;
        self.can_view_legacy_messages = legacy.can_view_legacy_messages;
    }

    /// Whether the record belongs to `user_id`
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }

    /// Lower-cased email, when present and non-empty
    pub fn normalized_email(&self) -> Option<String> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_lowercase)
    }
}

impl IntoIndexes for TrustedContactDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "contact_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("contact_id_unique".to_string())
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
        ]
    }
}

impl MutMetadata for TrustedContactDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_never_regresses() {
        assert!(ContactStatus::None < ContactStatus::Invited);
        assert!(ContactStatus::Invited < ContactStatus::Accepted);
        assert_eq!(ContactStatus::Invited.predecessors(), vec![ContactStatus::None]);
        assert_eq!(
            ContactStatus::Accepted.predecessors(),
            vec![ContactStatus::None, ContactStatus::Invited]
        );
        assert!(ContactStatus::None.predecessors().is_empty());
    }

    #[test]
    fn test_legacy_columns_stored_flat() {
        let mut contact = TrustedContactDoc::new("owner-1", "Ada", None, "sister", "viewer");
        contact.can_view_letters = true;

        let stored = bson::to_document(&contact).unwrap();
        assert!(stored.get_bool("can_view_letters").unwrap());
        assert_eq!(stored.get_str("status").unwrap(), "none");
        assert!(!stored.contains_key("permissions"));

        let loaded: TrustedContactDoc = bson::from_document(stored).unwrap();
        assert!(loaded.permission_set().allows(Category::Letters));
    }

    #[test]
    fn test_applied_permissions_agree_in_both_shapes() {
        let mut contact = TrustedContactDoc::new("owner-1", "Ada", None, "sister", "viewer");
        contact.can_view_documents = true;

        let set: PermissionSet = [(Category::Letters, true)].into_iter().collect();
        contact.apply_permissions(&set);

        assert!(contact.can_view_letters);
        assert!(!contact.can_view_documents);
        assert_eq!(contact.permissions.as_ref().unwrap().len(), Category::ALL.len());
        assert_eq!(
            PermissionSource::LegacyColumns(contact.legacy_columns()).normalize(),
            contact.permission_set()
        );
    }

    #[test]
    fn test_normalized_email() {
        let contact = TrustedContactDoc::new(
            "owner-1",
            "Ada",
            Some("  Ada@Example.COM ".into()),
            "sister",
            "executor",
        );
        assert_eq!(contact.normalized_email().as_deref(), Some("ada@example.com"));

        let blank = TrustedContactDoc::new("owner-1", "Bo", Some("   ".into()), "", "");
        assert!(blank.normalized_email().is_none());
    }
}
