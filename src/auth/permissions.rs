//! Per-category view permissions for trusted contacts
//!
//! A contact record carries permissions in one of two shapes: the fixed
//! `can_view_*` boolean columns, or a flexible key→bool map layered over
//! them. Both are normalized into a single [`PermissionSet`] the moment
//! the record is loaded, and everything downstream sees only that shape.
//!
//! Resolution per category:
//! 1. an entry in the structured map, if the map exists and has the key
//! 2. otherwise the legacy column of the same category
//! 3. otherwise denied

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::auth::Category;
use crate::db::schemas::TrustedContactDoc;

/// Legacy boolean columns stored directly on the contact record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyColumns {
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

impl LegacyColumns {
    pub fn get(&self, category: Category) -> bool {
        match category {
            Category::PersonalDetails => self.can_view_personal_details,
            Category::MedicalContacts => self.can_view_medical_contacts,
            Category::FuneralPreferences => self.can_view_funeral_preferences,
            Category::Documents => self.can_view_documents,
            Category::Letters => self.can_view_letters,
            Category::LegacyMessages => self.can_view_legacy_messages,
        }
    }

    pub fn set(&mut self, category: Category, allowed: bool) {
        let column = match category {
            Category::PersonalDetails => &mut self.can_view_personal_details,
            Category::MedicalContacts => &mut self.can_view_medical_contacts,
            Category::FuneralPreferences => &mut self.can_view_funeral_preferences,
            Category::Documents => &mut self.can_view_documents,
            Category::Letters => &mut self.can_view_letters,
            Category::LegacyMessages => &mut self.can_view_legacy_messages,
        };
        *column = allowed;
    }
}

/// Where a contact's permissions come from
#[derive(Debug, Clone, PartialEq)]
pub enum PermissionSource {
    /// Only the fixed columns are populated
    LegacyColumns(LegacyColumns),
    /// A structured map exists; its keys win, columns fill the gaps
    StructuredMap {
        map: BTreeMap<String, bool>,
        legacy: LegacyColumns,
    },
}

impl PermissionSource {
    /// Pick the source shape from a stored record's fields
    pub fn from_record(map: Option<&BTreeMap<String, bool>>, legacy: &LegacyColumns) -> Self {
        match map {
            Some(map) => PermissionSource::StructuredMap {
                map: map.clone(),
                legacy: legacy.clone(),
            },
            None => PermissionSource::LegacyColumns(legacy.clone()),
        }
    }

    /// Normalize into the canonical per-category set
    pub fn normalize(&self) -> PermissionSet {
        let mut granted = BTreeMap::new();

        match self {
            PermissionSource::LegacyColumns(legacy) => {
                for category in Category::ALL {
                    granted.insert(category, legacy.get(category));
                }
            }
            PermissionSource::StructuredMap { map, legacy } => {
                for key in map.keys() {
                    if Category::from_key(key).is_none() {
                        debug!("Ignoring unknown permission key '{}'", key);
                    }
                }
                for category in Category::ALL {
                    let allowed = map
                        .get(category.key())
                        .copied()
                        .unwrap_or_else(|| legacy.get(category));
                    granted.insert(category, allowed);
                }
            }
        }

        PermissionSet { granted }
    }
}

/// Canonical permission set: one explicit decision per category
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PermissionSet {
    granted: BTreeMap<Category, bool>,
}

impl PermissionSet {
    /// A set that denies everything
    pub fn deny_all() -> Self {
        Self::default()
    }

    pub fn allows(&self, category: Category) -> bool {
        self.granted.get(&category).copied().unwrap_or(false)
    }

    /// Categories this set grants
    pub fn allowed(&self) -> impl Iterator<Item = Category> + '_ {
        self.granted
            .iter()
            .filter(|(_, allowed)| **allowed)
            .map(|(category, _)| *category)
    }

    /// Permissions keyed by canonical category key (viewer sessions)
    pub fn to_key_map(&self) -> BTreeMap<String, bool> {
        Category::ALL
            .into_iter()
            .map(|c| (c.key().to_string(), self.allows(c)))
            .collect()
    }

    /// Permissions keyed by `canView*` names (executor responses)
    pub fn to_executor_map(&self) -> BTreeMap<String, bool> {
        Category::ALL
            .into_iter()
            .map(|c| (c.executor_key().to_string(), self.allows(c)))
            .collect()
    }
}

/// Build a permission set from explicit grants
impl FromIterator<(Category, bool)> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = (Category, bool)>>(iter: I) -> Self {
        Self {
            granted: iter.into_iter().collect(),
        }
    }
}

/// Whether `contact` may view `category`.
///
/// Pure: depends only on the contact snapshot passed in.
pub fn evaluate(contact: &TrustedContactDoc, category: Category) -> bool {
    contact.permission_set().allows(category)
}
