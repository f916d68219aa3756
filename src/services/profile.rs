//! Owner profile records
//!
//! Each plan section is an attribute bag stored per owner. Singleton kinds
//! (personal details, funeral preferences, ...) hold one record per owner;
//! collection kinds (documents, assets, ...) hold any number.

use bson::Document;
use std::sync::Arc;
use tracing::{debug, info};

use crate::auth::OwnerCapability;
use crate::db::schemas::{ProfileRecordDoc, RecordKind};
use crate::store::Store;
use crate::types::{HeirloomError, Result};

/// Display name used when the owner has not filled in personal details
pub const FALLBACK_OWNER_NAME: &str = "Someone who trusts you";

pub struct ProfileService {
    store: Arc<dyn Store>,
}

impl ProfileService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Create or replace the owner's record of a singleton kind.
    ///
    /// Two first saves racing each other both land: the loser's insert
    /// hits the unique index and is applied as an update instead.
    pub async fn save_singleton(
        &self,
        owner: &OwnerCapability,
        kind: RecordKind,
        fields: Document,
    ) -> Result<ProfileRecordDoc> {
        if !kind.is_singleton() {
            return Err(HeirloomError::BadRequest(format!(
                "{} holds multiple records; add them individually",
                kind
            )));
        }
        let user_id = owner.user_id();

        if let Some(updated) = self
            .store
            .update_singleton(user_id, kind, fields.clone())
            .await?
        {
            return Ok(updated);
        }

        let record = ProfileRecordDoc::new(user_id, kind, fields.clone());
        match self.store.insert_record(record.clone()).await {
            Ok(()) => {
                info!(user_id = %user_id, kind = %kind, "Created profile record");
                Ok(record)
            }
            Err(HeirloomError::DuplicateKey(_)) => {
                debug!(user_id = %user_id, kind = %kind, "Concurrent first save, retrying as update");
                self.store
                    .update_singleton(user_id, kind, fields)
                    .await?
                    .ok_or_else(|| {
                        HeirloomError::Internal(format!("{} record vanished during save", kind))
                    })
            }
            Err(e) => Err(e),
        }
    }

    pub async fn get_singleton(
        &self,
        owner: &OwnerCapability,
        kind: RecordKind,
    ) -> Result<Option<ProfileRecordDoc>> {
        if !kind.is_singleton() {
            return Err(HeirloomError::BadRequest(format!("{} is a collection", kind)));
        }
        self.store.find_singleton(owner.user_id(), kind).await
    }

    /// Append a record to a collection kind
    pub async fn add_record(
        &self,
        owner: &OwnerCapability,
        kind: RecordKind,
        fields: Document,
    ) -> Result<ProfileRecordDoc> {
        if kind.is_singleton() {
            return Err(HeirloomError::BadRequest(format!(
                "{} holds a single record; save it instead",
                kind
            )));
        }
        let record = ProfileRecordDoc::new(owner.user_id(), kind, fields);
        self.store.insert_record(record.clone()).await?;
        Ok(record)
    }

    pub async fn list(&self, owner: &OwnerCapability, kind: RecordKind) -> Result<Vec<ProfileRecordDoc>> {
        self.store.list_records(owner.user_id(), kind).await
    }
}

/// Name to show for an owner in emails and executor listings
pub async fn owner_display_name(store: &dyn Store, user_id: &str) -> Result<String> {
    let Some(record) = store.find_singleton(user_id, RecordKind::PersonalDetails).await? else {
        return Ok(FALLBACK_OWNER_NAME.to_string());
    };
    Ok(display_name(&record.fields).unwrap_or_else(|| FALLBACK_OWNER_NAME.to_string()))
}

fn display_name(fields: &Document) -> Option<String> {
    let non_empty = |key: &str| {
        fields
            .get_str(key)
            .ok()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    if let Some(full) = non_empty("full_name") {
        return Some(full.to_string());
    }
    let parts: Vec<&str> = [non_empty("first_name"), non_empty("last_name")]
        .into_iter()
        .flatten()
        .collect();
    (!parts.is_empty()).then(|| parts.join(" "))
}
