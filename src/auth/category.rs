//! Data categories that permissions are granted over
//!
//! The set is closed: a typo'd key can never silently grant or deny
//! access, because anything outside this enum fails to parse.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::HeirloomError;

/// A data domain of an owner's plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    PersonalDetails,
    MedicalContacts,
    FuneralPreferences,
    Documents,
    Letters,
    LegacyMessages,
}

impl Category {
    /// Every category, in display order
    pub const ALL: [Category; 6] = [
        Category::PersonalDetails,
        Category::MedicalContacts,
        Category::FuneralPreferences,
        Category::Documents,
        Category::Letters,
        Category::LegacyMessages,
    ];

    /// Canonical key used by the structured permission map and the API
    pub fn key(&self) -> &'static str {
        match self {
            Category::PersonalDetails => "personalDetails",
            Category::MedicalContacts => "medicalContacts",
            Category::FuneralPreferences => "funeralPreferences",
            Category::Documents => "documents",
            Category::Letters => "letters",
            Category::LegacyMessages => "legacyMessages",
        }
    }

    /// Name of the legacy boolean column on the contact record
    pub fn legacy_column(&self) -> &'static str {
        match self {
            Category::PersonalDetails => "can_view_personal_details",
            Category::MedicalContacts => "can_view_medical_contacts",
            Category::FuneralPreferences => "can_view_funeral_preferences",
            Category::Documents => "can_view_documents",
            Category::Letters => "can_view_letters",
            Category::LegacyMessages => "can_view_legacy_messages",
        }
    }

    /// Key in the permissions object handed to executors
    pub fn executor_key(&self) -> &'static str {
        match self {
            Category::PersonalDetails => "canViewPersonalDetails",
            Category::MedicalContacts => "canViewMedicalContacts",
            Category::FuneralPreferences => "canViewFuneralPreferences",
            Category::Documents => "canViewDocuments",
            Category::Letters => "canViewLetters",
            Category::LegacyMessages => "canViewLegacyMessages",
        }
    }

    /// Parse a canonical key, returning None for anything unknown
    pub fn from_key(key: &str) -> Option<Category> {
        Category::ALL.into_iter().find(|c| c.key() == key)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Category {
    type Err = HeirloomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::from_key(s)
            .ok_or_else(|| HeirloomError::BadRequest(format!("Unknown category: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_round_trip_through_parse() {
        for category in Category::ALL {
            assert_eq!(category.key().parse::<Category>().unwrap(), category);
        }
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!("personal_details".parse::<Category>().is_err());
        assert!("Letters".parse::<Category>().is_err());
        assert!(Category::from_key("recipes").is_none());
    }

    #[test]
    fn test_serde_matches_key() {
        let json = serde_json::to_string(&Category::FuneralPreferences).unwrap();
        assert_eq!(json, "\"funeralPreferences\"");
    }

    #[test]
    fn test_column_and_executor_names() {
        assert_eq!(Category::LegacyMessages.legacy_column(), "can_view_legacy_messages");
        assert_eq!(Category::Documents.executor_key(), "canViewDocuments");
    }
}
