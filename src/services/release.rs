//! Release settings and the release trigger
//!
//! Release is one-way: once activated it stays activated, and the first
//! activation's timestamp is the one kept. The unlock code is stored only
//! as an Argon2 hash.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::{hash_secret, verify_secret, OwnerCapability};
use crate::db::schemas::{ExecutorAccountDoc, ReleaseSettingsDoc};
use crate::services::executor::{AssignmentOutcome, ExecutorProvisioning};
use crate::store::Store;
use crate::types::{HeirloomError, Result};

pub const MIN_UNLOCK_CODE_LEN: usize = 6;

/// Release settings as shown to the owner
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseSettingsView {
    pub is_locked: bool,
    pub executor_contact_id: Option<String>,
    pub has_unlock_code: bool,
    pub release_activated: bool,
    pub release_activated_at: Option<DateTime<Utc>>,
}

impl From<&ReleaseSettingsDoc> for ReleaseSettingsView {
    fn from(doc: &ReleaseSettingsDoc) -> Self {
        Self {
            is_locked: doc.is_locked,
            executor_contact_id: doc.executor_contact_id.clone(),
            has_unlock_code: doc.unlock_code_hash.is_some(),
            release_activated: doc.release_activated,
            release_activated_at: doc.release_activated_at.map(|d| d.to_chrono()),
        }
    }
}

/// Owner's settings update.
///
/// `unlock_code`: absent keeps the current code, empty clears it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseSettingsUpdate {
    pub is_locked: bool,
    #[serde(default)]
    pub executor_contact_id: Option<String>,
    #[serde(default)]
    pub unlock_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedReleaseSettings {
    pub settings: ReleaseSettingsView,
    pub executor: AssignmentOutcome,
}

pub struct ReleaseService {
    store: Arc<dyn Store>,
    provisioning: Arc<ExecutorProvisioning>,
}

impl ReleaseService {
    pub fn new(store: Arc<dyn Store>, provisioning: Arc<ExecutorProvisioning>) -> Self {
        Self {
            store,
            provisioning,
        }
    }

    pub async fn get(&self, owner: &OwnerCapability) -> Result<ReleaseSettingsView> {
        let settings = self
            .store
            .find_release_settings(owner.user_id())
            .await?
            .unwrap_or_else(|| ReleaseSettingsDoc::new(owner.user_id()));
        Ok(ReleaseSettingsView::from(&settings))
    }

    pub async fn save(
        &self,
        owner: &OwnerCapability,
        update: ReleaseSettingsUpdate,
    ) -> Result<SavedReleaseSettings> {
        let user_id = owner.user_id();
        let executor_contact_id = update
            .executor_contact_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());

        if let Some(contact_id) = executor_contact_id.as_deref() {
            match self.store.find_contact(contact_id).await? {
                Some(c) if c.is_owned_by(user_id) => {}
                _ => {
                    return Err(HeirloomError::BadRequest(
                        "Executor must be one of your trusted contacts".into(),
                    ))
                }
            }
        }

        let current = self
            .store
            .find_release_settings(user_id)
            .await?
            .unwrap_or_else(|| ReleaseSettingsDoc::new(user_id));

        let unlock_code_hash = match update.unlock_code.as_deref() {
            None => current.unlock_code_hash.clone(),
            Some("") => None,
            Some(code) if code.chars().count() < MIN_UNLOCK_CODE_LEN => {
                return Err(HeirloomError::BadRequest(format!(
                    "Unlock code must be at least {} characters",
                    MIN_UNLOCK_CODE_LEN
                )))
            }
            Some(code) => Some(hash_secret(code)?),
        };

        let mut next = current.clone();
        next.is_locked = update.is_locked;
        next.executor_contact_id = executor_contact_id;
        next.unlock_code_hash = unlock_code_hash;
        let saved = self.store.save_release_settings(&next).await?;

        info!(
            user_id = %user_id,
            is_locked = saved.is_locked,
            has_executor = saved.executor_contact_id.is_some(),
            "Saved release settings"
        );

        let executor = self
            .provisioning
            .assign_executor(
                user_id,
                current.executor_contact_id.as_deref(),
                saved.executor_contact_id.as_deref(),
            )
            .await;

        Ok(SavedReleaseSettings {
            settings: ReleaseSettingsView::from(&saved),
            executor,
        })
    }

    /// Activate the owner's release. Repeat calls keep the first timestamp.
    pub async fn activate_release(&self, owner_id: &str) -> Result<ReleaseSettingsDoc> {
        let settings = self.store.activate_release(owner_id, Utc::now()).await?;
        info!(
            user_id = %owner_id,
            activated_at = ?settings.release_activated_at,
            "Release activated"
        );
        Ok(settings)
    }

    /// The named executor releases the plan with the owner's unlock code
    pub async fn unlock(&self, account: &ExecutorAccountDoc, code: &str) -> Result<ReleaseSettingsDoc> {
        let owner_id = account.account_user_id.as_str();
        let settings = self
            .store
            .find_release_settings(owner_id)
            .await?
            .ok_or_else(|| HeirloomError::ConflictingState("Release is not configured".into()))?;

        if settings.release_activated {
            return Ok(settings);
        }
        let Some(hash) = settings.unlock_code_hash.as_deref().filter(|_| settings.is_locked) else {
            return Err(HeirloomError::ConflictingState(
                "Release has no unlock code".into(),
            ));
        };
        if settings.executor_contact_id.as_deref() != Some(account.contact_id.as_str()) {
            return Err(HeirloomError::AuthorizationDenied(
                "Only the current executor can release this plan".into(),
            ));
        }
        if !verify_secret(code, hash)? {
            warn!(user_id = %owner_id, executor = %account.executor_email, "Wrong unlock code");
            return Err(HeirloomError::AuthorizationDenied("Incorrect unlock code".into()));
        }

        self.activate_release(owner_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{ContactStatus, ExecutorStatus};
    use crate::store::{ContactStore, ExecutorStore, MemoryStore, ReleaseStore};
    use crate::testing::{self, RecordingMailer};
    use tokio_test::assert_ok;

    fn service(store: Arc<MemoryStore>, mailer: Arc<RecordingMailer>) -> ReleaseService {
        let provisioning = Arc::new(ExecutorProvisioning::new(
            store.clone(),
            mailer,
            "https://app.example.com",
        ));
        ReleaseService::new(store, provisioning)
    }

    fn update(executor: Option<&str>, code: Option<&str>) -> ReleaseSettingsUpdate {
        ReleaseSettingsUpdate {
            is_locked: true,
            executor_contact_id: executor.map(str::to_string),
            unlock_code: code.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_save_hashes_code_and_invites_executor() {
        let store = Arc::new(MemoryStore::new());
        let mailer = RecordingMailer::new();
        let eve =
            testing::contact(&store, "owner-1", "Eve", Some("eve@x.com"), ContactStatus::None, &[])
                .await;
        let release = service(store.clone(), mailer.clone());
        let owner = OwnerCapability::for_tests("owner-1");

        let saved = release
            .save(&owner, update(Some(&eve.contact_id), Some("correct horse")))
            .await
            .unwrap();
        assert!(saved.settings.has_unlock_code);
        assert_eq!(saved.executor, AssignmentOutcome::Invited { email_sent: true });

        let stored = store.find_release_settings("owner-1").await.unwrap().unwrap();
        let hash = stored.unlock_code_hash.unwrap();
        assert!(!hash.contains("correct horse"));

        // Saving again without a code keeps it and does not re-invite
        let again = release
            .save(&owner, update(Some(&eve.contact_id), None))
            .await
            .unwrap();
        assert!(again.settings.has_unlock_code);
        assert_eq!(again.executor, AssignmentOutcome::Unchanged);
        assert_eq!(mailer.sent().len(), 1);

        let cleared = release
            .save(&owner, update(Some(&eve.contact_id), Some("")))
            .await
            .unwrap();
        assert!(!cleared.settings.has_unlock_code);
    }

    #[tokio::test]
    async fn test_save_rejects_foreign_executor_and_short_code() {
        let store = Arc::new(MemoryStore::new());
        let other =
            testing::contact(&store, "owner-2", "Eve", Some("eve@x.com"), ContactStatus::None, &[])
                .await;
        let release = service(store.clone(), RecordingMailer::new());
        let owner = OwnerCapability::for_tests("owner-1");

        assert!(matches!(
            release
                .save(&owner, update(Some(&other.contact_id), None))
                .await
                .unwrap_err(),
            HeirloomError::BadRequest(_)
        ));
        assert!(matches!(
            release.save(&owner, update(None, Some("123"))).await.unwrap_err(),
            HeirloomError::BadRequest(_)
        ));
    }

    #[tokio::test]
    async fn test_activation_is_one_way_and_first_wins() {
        let store = Arc::new(MemoryStore::new());
        let release = service(store.clone(), RecordingMailer::new());
        let owner = OwnerCapability::for_tests("owner-1");

        let first = assert_ok!(release.activate_release("owner-1").await);
        let second = assert_ok!(release.activate_release("owner-1").await);
        assert_eq!(first.release_activated_at, second.release_activated_at);

        // A later settings save cannot un-release
        release.save(&owner, update(None, None)).await.unwrap();
        assert!(release.get(&owner).await.unwrap().release_activated);
    }

    #[tokio::test]
    async fn test_unlock_requires_current_executor_and_code() {
        let store = Arc::new(MemoryStore::new());
        let mailer = RecordingMailer::new();
        let eve =
            testing::contact(&store, "owner-1", "Eve", Some("eve@x.com"), ContactStatus::None, &[])
                .await;
        let release = service(store.clone(), mailer.clone());
        let owner = OwnerCapability::for_tests("owner-1");
        release
            .save(&owner, update(Some(&eve.contact_id), Some("open sesame")))
            .await
            .unwrap();
        let account = store
            .find_executor_account("eve@x.com", "owner-1")
            .await
            .unwrap()
            .unwrap();

        let wrong = release.unlock(&account, "open barley").await.unwrap_err();
        assert!(matches!(wrong, HeirloomError::AuthorizationDenied(_)));

        let mut stale = account.clone();
        stale.contact_id = "someone-else".into();
        assert!(matches!(
            release.unlock(&stale, "open sesame").await.unwrap_err(),
            HeirloomError::AuthorizationDenied(_)
        ));

        let released = release.unlock(&account, "open sesame").await.unwrap();
        assert!(released.release_activated);
    }

    #[tokio::test]
    async fn test_readded_executor_contact_keeps_access() {
        use crate::auth::FederatedIdentity;
        use crate::services::projection::DataProjection;

        let store = Arc::new(MemoryStore::new());
        let mailer = RecordingMailer::new();
        let provisioning = Arc::new(ExecutorProvisioning::new(
            store.clone(),
            mailer.clone(),
            "https://app.example.com",
        ));
        let release = ReleaseService::new(store.clone(), provisioning.clone());
        let owner = OwnerCapability::for_tests("owner-1");

        let first =
            testing::contact(&store, "owner-1", "Eve", Some("eve@x.com"), ContactStatus::None, &[])
                .await;
        release
            .save(&owner, update(Some(&first.contact_id), Some("open sesame")))
            .await
            .unwrap();
        let token = testing::token_from_link(&mailer.sent()[0]);
        let eve = FederatedIdentity {
            subject: "g-1".into(),
            email: "eve@x.com".into(),
        };
        provisioning.accept_invitation(&token, &eve).await.unwrap();

        // Owner deletes Eve and adds her back as a new contact row
        store.delete_contact(&first.contact_id).await.unwrap();
        let second =
            testing::contact(&store, "owner-1", "Eve", Some("Eve@x.com"), ContactStatus::None, &[])
                .await;
        let saved = release
            .save(&owner, update(Some(&second.contact_id), None))
            .await
            .unwrap();
        assert_eq!(saved.executor, AssignmentOutcome::AlreadyAccepted);
        assert_eq!(mailer.sent().len(), 1);

        let account = store
            .find_executor_account("eve@x.com", "owner-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(account.contact_id, second.contact_id);
        assert_eq!(account.status, ExecutorStatus::Accepted);

        let released = assert_ok!(release.unlock(&account, "open sesame").await);
        assert!(released.release_activated);
        let projection = DataProjection::new(store.clone())
            .project_executor_data(&account, None)
            .await
            .unwrap();
        assert!(projection.released);
    }

    #[tokio::test]
    async fn test_unlock_without_code_is_conflict() {
        let store = Arc::new(MemoryStore::new());
        let eve =
            testing::contact(&store, "owner-1", "Eve", Some("eve@x.com"), ContactStatus::None, &[])
                .await;
        let release = service(store.clone(), RecordingMailer::new());
        release
            .save(
                &OwnerCapability::for_tests("owner-1"),
                update(Some(&eve.contact_id), None),
            )
            .await
            .unwrap();
        let account = store
            .find_executor_account("eve@x.com", "owner-1")
            .await
            .unwrap()
            .unwrap();

        assert!(matches!(
            release.unlock(&account, "anything").await.unwrap_err(),
            HeirloomError::ConflictingState(_)
        ));
    }
}
