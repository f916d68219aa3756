//! Trusted contact management for owners

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::auth::{Category, OwnerCapability, PermissionSet};
use crate::db::schemas::TrustedContactDoc;
use crate::store::Store;
use crate::types::{HeirloomError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewContact {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub relationship: String,
    #[serde(default)]
    pub role: String,
    /// Initial grants keyed by category key
    #[serde(default)]
    pub permissions: BTreeMap<String, bool>,
}

/// Contact as returned to its owner
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactView {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub relationship: String,
    pub role: String,
    pub status: String,
    pub permissions: BTreeMap<String, bool>,
}

impl From<&TrustedContactDoc> for ContactView {
    fn from(doc: &TrustedContactDoc) -> Self {
        Self {
            id: doc.contact_id.clone(),
            name: doc.name.clone(),
            email: doc.email.clone(),
            relationship: doc.relationship.clone(),
            role: doc.role.clone(),
            status: doc.status.as_str().to_string(),
            permissions: doc.permission_set().to_key_map(),
        }
    }
}

/// Parse permission updates, rejecting unknown category keys
fn parse_grants(updates: &BTreeMap<String, bool>) -> Result<Vec<(Category, bool)>> {
    updates
        .iter()
        .map(|(key, allowed)| Ok((key.parse::<Category>()?, *allowed)))
        .collect()
}

pub struct ContactService {
    store: Arc<dyn Store>,
}

impl ContactService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create(&self, owner: &OwnerCapability, input: NewContact) -> Result<TrustedContactDoc> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(HeirloomError::BadRequest("Contact name is required".into()));
        }
        let email = input
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string);
        if let Some(e) = email.as_deref() {
            if !e.contains('@') {
                return Err(HeirloomError::BadRequest(format!("Invalid email: {}", e)));
            }
        }

        let grants = parse_grants(&input.permissions)?;
        let set: PermissionSet = Category::ALL
            .into_iter()
            .map(|c| (c, grants.iter().any(|(g, allowed)| *g == c && *allowed)))
            .collect();

        let mut contact =
            TrustedContactDoc::new(owner.user_id(), name, email, input.relationship, input.role);
        contact.apply_permissions(&set);
        self.store.insert_contact(contact.clone()).await?;

        info!(user_id = %owner.user_id(), contact_id = %contact.contact_id, "Created trusted contact");
        Ok(contact)
    }

    pub async fn list(&self, owner: &OwnerCapability) -> Result<Vec<TrustedContactDoc>> {
        self.store.list_contacts(owner.user_id()).await
    }

    /// Fetch a contact, requiring that `owner` owns it
    pub async fn get_owned(&self, owner: &OwnerCapability, contact_id: &str) -> Result<TrustedContactDoc> {
        let contact = self
            .store
            .find_contact(contact_id)
            .await?
            .ok_or_else(|| HeirloomError::NotFound(format!("Contact {}", contact_id)))?;
        if !contact.is_owned_by(owner.user_id()) {
            return Err(HeirloomError::AuthorizationDenied(
                "Contact belongs to another account".into(),
            ));
        }
        Ok(contact)
    }

    /// Merge `updates` over the contact's current permissions
    pub async fn update_permissions(
        &self,
        owner: &OwnerCapability,
        contact_id: &str,
        updates: &BTreeMap<String, bool>,
    ) -> Result<TrustedContactDoc> {
        let grants = parse_grants(updates)?;
        let current = self.get_owned(owner, contact_id).await?.permission_set();

        let merged: PermissionSet = Category::ALL
            .into_iter()
            .map(|c| {
                let allowed = grants
                    .iter()
                    .find(|(g, _)| *g == c)
                    .map(|(_, allowed)| *allowed)
                    .unwrap_or_else(|| current.allows(c));
                (c, allowed)
            })
            .collect();

        let updated = self
            .store
            .set_contact_permissions(contact_id, &merged)
            .await?
            .ok_or_else(|| HeirloomError::NotFound(format!("Contact {}", contact_id)))?;

        info!(
            user_id = %owner.user_id(),
            contact_id = %contact_id,
            granted = ?merged.allowed().collect::<Vec<_>>(),
            "Updated contact permissions"
        );
        Ok(updated)
    }

    pub async fn delete(&self, owner: &OwnerCapability, contact_id: &str) -> Result<()> {
        self.get_owned(owner, contact_id).await?;
        self.store.delete_contact(contact_id).await?;
        info!(user_id = %owner.user_id(), contact_id = %contact_id, "Deleted trusted contact");
        Ok(())
    }
}
