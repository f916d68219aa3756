//! Permission-gated views of an owner's plan
//!
//! Viewers see what their contact record allows, at any time. Executors
//! see what the executor contact allows, and only after release.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::auth::{Category, PermissionSet, ViewerContext};
use crate::db::schemas::{ExecutorAccountDoc, LetterDoc, ProfileRecordDoc, RecordKind};
use crate::services::profile::owner_display_name;
use crate::store::Store;
use crate::types::{HeirloomError, Result};

/// Letter as shown to its recipient
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LetterView {
    pub id: String,
    pub title: String,
    pub body: String,
    pub recipient_name: String,
    pub release_date: Option<NaiveDate>,
    pub milestone_date: Option<NaiveDate>,
}

impl From<&LetterDoc> for LetterView {
    fn from(doc: &LetterDoc) -> Self {
        Self {
            id: doc.letter_id.clone(),
            title: doc.title.clone(),
            body: doc.body.clone(),
            recipient_name: doc.recipient_name.clone(),
            release_date: doc.release_date,
            milestone_date: doc.milestone_date,
        }
    }
}

/// Data handed to an executor
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorProjection {
    pub released: bool,
    pub released_at: Option<DateTime<Utc>>,
    pub owner_name: String,
    /// Keyed `canView*`
    pub permissions: BTreeMap<String, bool>,
    pub data: Map<String, Value>,
}

/// Data handed to a viewer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerProjection {
    pub owner_name: String,
    pub permissions: BTreeMap<String, bool>,
    pub data: Map<String, Value>,
}

fn record_json(record: &ProfileRecordDoc) -> Value {
    let mut value = bson::Bson::Document(record.fields.clone()).into_relaxed_extjson();
    if let Value::Object(map) = &mut value {
        map.insert("id".into(), Value::String(record.record_id.clone()));
    }
    value
}

/// Categories to include: the requested one, or every granted one
fn selected(permissions: &PermissionSet, requested: Option<Category>) -> Result<Vec<Category>> {
    match requested {
        Some(category) if permissions.allows(category) => Ok(vec![category]),
        Some(category) => Err(HeirloomError::AuthorizationDenied(format!(
            "No access to {}",
            category
        ))),
        None => Ok(permissions.allowed().collect()),
    }
}

pub struct DataProjection {
    store: Arc<dyn Store>,
}

impl DataProjection {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    async fn collect(
        &self,
        owner_id: &str,
        categories: &[Category],
        letter_filter: impl Fn(&LetterDoc) -> bool,
    ) -> Result<Map<String, Value>> {
        let mut data = Map::new();
        for category in categories {
            let value = match RecordKind::for_category(*category) {
                Some(kind) if kind.is_singleton() => self
                    .store
                    .find_singleton(owner_id, kind)
                    .await?
                    .map(|r| record_json(&r))
                    .unwrap_or(Value::Null),
                Some(kind) => Value::Array(
                    self.store
                        .list_records(owner_id, kind)
                        .await?
                        .iter()
                        .map(record_json)
                        .collect(),
                ),
                None => {
                    let letters: Vec<LetterView> = self
                        .store
                        .list_letters(owner_id)
                        .await?
                        .iter()
                        .filter(|l| letter_filter(*l))
                        .map(LetterView::from)
                        .collect();
                    serde_json::to_value(letters)?
                }
            };
            data.insert(category.key().to_string(), value);
        }
        Ok(data)
    }

    /// Executor view of the owner behind `account`.
    ///
    /// Before release this is a "not yet released" shape with no data.
    pub async fn project_executor_data(
        &self,
        account: &ExecutorAccountDoc,
        requested: Option<Category>,
    ) -> Result<ExecutorProjection> {
        let owner_id = account.account_user_id.as_str();
        let owner_name = owner_display_name(self.store.as_ref(), owner_id).await?;
        let settings = self.store.find_release_settings(owner_id).await?;

        let Some(settings) = settings.filter(|s| s.release_activated) else {
            debug!(user_id = %owner_id, executor = %account.executor_email, "Executor data requested before release");
            return Ok(ExecutorProjection {
                released: false,
                released_at: None,
                owner_name,
                permissions: PermissionSet::deny_all().to_executor_map(),
                data: Map::new(),
            });
        };

        let executor_contact_id = settings.executor_contact_id.as_deref().unwrap_or_default();
        if executor_contact_id != account.contact_id {
            warn!(
                user_id = %owner_id,
                executor = %account.executor_email,
                "Executor account is not bound to the current executor contact"
            );
            return Err(HeirloomError::AuthorizationDenied(
                "You are no longer the executor for this account".into(),
            ));
        }

        let permissions = match self.store.find_contact(executor_contact_id).await? {
            Some(contact) if contact.is_owned_by(owner_id) => contact.permission_set(),
            _ => PermissionSet::deny_all(),
        };
        let categories = selected(&permissions, requested)?;
        let data = self
            .collect(owner_id, &categories, |l| l.is_addressed_to(executor_contact_id))
            .await?;

        Ok(ExecutorProjection {
            released: true,
            released_at: settings.release_activated_at.map(|d| d.to_chrono()),
            owner_name,
            permissions: permissions.to_executor_map(),
            data,
        })
    }

    /// Viewer view. Scheduled letters stay hidden until they are delivered.
    pub async fn project_viewer_data(
        &self,
        viewer: &ViewerContext,
        requested: Option<Category>,
    ) -> Result<ViewerProjection> {
        let owner_id = viewer.owner_id();
        let contact_id = viewer.contact.contact_id.as_str();
        let categories = selected(&viewer.permissions, requested)?;
        let data = self
            .collect(owner_id, &categories, |l| {
                l.is_addressed_to(contact_id) && (!l.is_scheduled() || l.email_sent)
            })
            .await?;

        Ok(ViewerProjection {
            owner_name: owner_display_name(self.store.as_ref(), owner_id).await?,
            permissions: viewer.permissions.to_key_map(),
            data,
        })
    }
}
