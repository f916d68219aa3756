//! MongoDB-backed store
//!
//! Each atomic transition is one filtered `update_one` or
//! `find_one_and_update`; the filter carries the precondition, so a
//! concurrent request that already won the transition makes ours match
//! nothing.

use async_trait::async_trait;
use bson::doc;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashSet;
use tracing::{debug, info};

use super::{
    ContactStore, ExecutorStore, LetterStore, OwnerSessionStore, ProfileStore, ReleaseStore,
    ViewerTokenStore,
};
use crate::auth::{Category, PermissionSet};
use crate::db::schemas::{
    ContactStatus, ExecutorAccountDoc, ExecutorStatus, LetterDoc, OwnerSessionDoc,
    ProfileRecordDoc, RecordKind, ReleaseSettingsDoc, TrustedContactDoc, ViewerTokenDoc,
    EXECUTOR_ACCOUNT_COLLECTION, LETTER_COLLECTION, OWNER_SESSION_COLLECTION,
    PROFILE_RECORD_COLLECTION, RELEASE_SETTINGS_COLLECTION, TRUSTED_CONTACT_COLLECTION,
    VIEWER_TOKEN_COLLECTION,
};
use crate::db::{MongoClient, MongoCollection};
use crate::types::{HeirloomError, Result};

/// Store over the application's MongoDB collections
#[derive(Clone)]
pub struct MongoStore {
    sessions: MongoCollection<OwnerSessionDoc>,
    contacts: MongoCollection<TrustedContactDoc>,
    viewer_tokens: MongoCollection<ViewerTokenDoc>,
    executors: MongoCollection<ExecutorAccountDoc>,
    release: MongoCollection<ReleaseSettingsDoc>,
    letters: MongoCollection<LetterDoc>,
    records: MongoCollection<ProfileRecordDoc>,
}

impl MongoStore {
    /// Open every collection and apply its indexes
    pub async fn open(client: &MongoClient) -> Result<Self> {
        let store = Self {
            sessions: client.collection(OWNER_SESSION_COLLECTION).await?,
            contacts: client.collection(TRUSTED_CONTACT_COLLECTION).await?,
            viewer_tokens: client.collection(VIEWER_TOKEN_COLLECTION).await?,
            executors: client.collection(EXECUTOR_ACCOUNT_COLLECTION).await?,
            release: client.collection(RELEASE_SETTINGS_COLLECTION).await?,
            letters: client.collection(LETTER_COLLECTION).await?,
            records: client.collection(PROFILE_RECORD_COLLECTION).await?,
        };
        info!("Collections ready in database '{}'", client.db_name());
        Ok(store)
    }
}

fn stamp(now: DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_chrono(now)
}

fn ymd(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[async_trait]
impl OwnerSessionStore for MongoStore {
    async fn insert_session(&self, session: OwnerSessionDoc) -> Result<()> {
        self.sessions.insert_one(session).await
    }

    async fn find_session(&self, session_id: &str) -> Result<Option<OwnerSessionDoc>> {
        self.sessions.find_one(doc! { "session_id": session_id }).await
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.sessions
            .delete_one(doc! { "session_id": session_id })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ContactStore for MongoStore {
    async fn insert_contact(&self, contact: TrustedContactDoc) -> Result<()> {
        self.contacts.insert_one(contact).await
    }

    async fn find_contact(&self, contact_id: &str) -> Result<Option<TrustedContactDoc>> {
        self.contacts.find_one(doc! { "contact_id": contact_id }).await
    }

    async fn list_contacts(&self, user_id: &str) -> Result<Vec<TrustedContactDoc>> {
        self.contacts
            .find_many(
                doc! { "user_id": user_id },
                Some(doc! { "metadata.created_at": 1 }),
            )
            .await
    }

    async fn set_contact_permissions(
        &self,
        contact_id: &str,
        permissions: &PermissionSet,
    ) -> Result<Option<TrustedContactDoc>> {
        let mut set = doc! {
            "permissions": bson::to_bson(&permissions.to_key_map())?,
            "metadata.updated_at": bson::DateTime::now(),
        };
        for category in Category::ALL {
            set.insert(category.legacy_column(), permissions.allows(category));
        }

        self.contacts
            .find_one_and_update(doc! { "contact_id": contact_id }, doc! { "$set": set })
            .await
    }

    async fn promote_contact_status(&self, contact_id: &str, to: ContactStatus) -> Result<bool> {
        let from: Vec<&str> = to.predecessors().iter().map(|s| s.as_str()).collect();
        if from.is_empty() {
            return Ok(false);
        }

        let result = self
            .contacts
            .update_one(
                doc! { "contact_id": contact_id, "status": { "$in": from } },
                doc! { "$set": {
                    "status": to.as_str(),
                    "metadata.updated_at": bson::DateTime::now(),
                }},
            )
            .await?;

        Ok(result.modified_count == 1)
    }

    async fn delete_contact(&self, contact_id: &str) -> Result<bool> {
        let result = self
            .contacts
            .soft_delete(doc! { "contact_id": contact_id })
            .await?;
        Ok(result.modified_count == 1)
    }
}

#[async_trait]
impl ViewerTokenStore for MongoStore {
    async fn insert_viewer_token(&self, token: ViewerTokenDoc) -> Result<()> {
        self.viewer_tokens.insert_one(token).await
    }

    async fn consume_viewer_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ViewerTokenDoc>> {
        self.viewer_tokens
            .find_one_and_update(
                doc! {
                    "token": token,
                    "used": { "$ne": true },
                    "expires_at": { "$gt": stamp(now) },
                },
                doc! { "$set": { "used": true, "used_at": stamp(now) } },
            )
            .await
    }

    async fn list_viewer_tokens(&self, contact_id: &str) -> Result<Vec<ViewerTokenDoc>> {
        self.viewer_tokens
            .find_many(
                doc! { "contact_id": contact_id },
                Some(doc! { "metadata.created_at": -1 }),
            )
            .await
    }
}

#[async_trait]
impl ExecutorStore for MongoStore {
    async fn find_executor_account(
        &self,
        executor_email: &str,
        account_user_id: &str,
    ) -> Result<Option<ExecutorAccountDoc>> {
        self.executors
            .find_one(doc! {
                "executor_email": executor_email.trim().to_lowercase(),
                "account_user_id": account_user_id,
            })
            .await
    }

    async fn find_executor_by_token(&self, token: &str) -> Result<Option<ExecutorAccountDoc>> {
        self.executors
            .find_one(doc! { "invitation_token": token })
            .await
    }

    async fn upsert_pending_executor(&self, account: ExecutorAccountDoc) -> Result<bool> {
        let now = bson::DateTime::now();
        let filter = doc! {
            "executor_email": account.executor_email.as_str(),
            "account_user_id": account.account_user_id.as_str(),
            "status": { "$ne": ExecutorStatus::Accepted.as_str() },
        };
        let update = doc! {
            "$set": {
                "status": ExecutorStatus::Pending.as_str(),
                "contact_id": account.contact_id.as_str(),
                "invitation_token": account.invitation_token.clone(),
                "invited_at": now,
                "metadata.is_deleted": false,
                "metadata.updated_at": now,
            },
            "$setOnInsert": { "metadata.created_at": now },
        };

        // An accepted row makes the filter miss, and the upsert then
        // collides with it on the (email, owner) unique index.
        match self.executors.upsert_one(filter, update).await {
            Ok(_) => Ok(true),
            Err(HeirloomError::DuplicateKey(_)) => {
                debug!(
                    "Executor {} already accepted for {}, rebinding contact",
                    account.executor_email, account.account_user_id
                );
                self.executors
                    .update_one(
                        doc! {
                            "executor_email": account.executor_email.as_str(),
                            "account_user_id": account.account_user_id.as_str(),
                            "status": ExecutorStatus::Accepted.as_str(),
                        },
                        doc! { "$set": {
                            "contact_id": account.contact_id.as_str(),
                            "metadata.updated_at": now,
                        }},
                    )
                    .await?;
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn accept_executor(
        &self,
        token: &str,
        executor_google_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ExecutorAccountDoc>> {
        self.executors
            .find_one_and_update(
                doc! {
                    "invitation_token": token,
                    "status": ExecutorStatus::Pending.as_str(),
                },
                doc! { "$set": {
                    "status": ExecutorStatus::Accepted.as_str(),
                    "executor_google_id": executor_google_id,
                    "accepted_at": stamp(now),
                    "metadata.updated_at": stamp(now),
                }},
            )
            .await
    }

    async fn list_executor_accounts(
        &self,
        executor_email: &str,
    ) -> Result<Vec<ExecutorAccountDoc>> {
        self.executors
            .find_many(
                doc! {
                    "executor_email": executor_email.trim().to_lowercase(),
                    "status": { "$in": [
                        ExecutorStatus::Pending.as_str(),
                        ExecutorStatus::Accepted.as_str(),
                    ]},
                },
                Some(doc! { "invited_at": -1 }),
            )
            .await
    }
}

#[async_trait]
impl ReleaseStore for MongoStore {
    async fn find_release_settings(&self, user_id: &str) -> Result<Option<ReleaseSettingsDoc>> {
        self.release.find_one(doc! { "user_id": user_id }).await
    }

    async fn save_release_settings(
        &self,
        settings: &ReleaseSettingsDoc,
    ) -> Result<ReleaseSettingsDoc> {
        let now = bson::DateTime::now();
        self.release
            .upsert_one(
                doc! { "user_id": settings.user_id.as_str() },
                doc! {
                    "$set": {
                        "is_locked": settings.is_locked,
                        "executor_contact_id": settings.executor_contact_id.clone(),
                        "unlock_code_hash": settings.unlock_code_hash.clone(),
                        "metadata.is_deleted": false,
                        "metadata.updated_at": now,
                    },
                    "$setOnInsert": {
                        "release_activated": false,
                        "metadata.created_at": now,
                    },
                },
            )
            .await?;

        self.release
            .find_one(doc! { "user_id": settings.user_id.as_str() })
            .await?
            .ok_or_else(|| HeirloomError::Database("Release settings vanished after save".into()))
    }

    async fn activate_release(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ReleaseSettingsDoc> {
        // Two passes cover a concurrent first insert of the settings row
        for _ in 0..2 {
            let activated = self
                .release
                .find_one_and_update(
                    doc! { "user_id": user_id, "release_activated": { "$ne": true } },
                    doc! { "$set": {
                        "release_activated": true,
                        "release_activated_at": stamp(now),
                        "metadata.updated_at": stamp(now),
                    }},
                )
                .await?;
            if let Some(settings) = activated {
                return Ok(settings);
            }

            if let Some(existing) = self.release.find_one(doc! { "user_id": user_id }).await? {
                if existing.release_activated {
                    return Ok(existing);
                }
                continue;
            }

            let mut fresh = ReleaseSettingsDoc::new(user_id);
            fresh.release_activated = true;
            fresh.release_activated_at = Some(stamp(now));
            match self.release.insert_one(fresh.clone()).await {
                Ok(()) => return Ok(fresh),
                Err(HeirloomError::DuplicateKey(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        self.release
            .find_one(doc! { "user_id": user_id, "release_activated": true })
            .await?
            .ok_or_else(|| HeirloomError::Database("Release activation did not persist".into()))
    }

    async fn activated_owners(&self, user_ids: &[String]) -> Result<HashSet<String>> {
        if user_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let settings = self
            .release
            .find_many(
                doc! { "user_id": { "$in": user_ids.to_vec() }, "release_activated": true },
                None,
            )
            .await?;
        Ok(settings.into_iter().map(|s| s.user_id).collect())
    }
}

#[async_trait]
impl LetterStore for MongoStore {
    async fn insert_letter(&self, letter: LetterDoc) -> Result<()> {
        self.letters.insert_one(letter).await
    }

    async fn list_letters(&self, user_id: &str) -> Result<Vec<LetterDoc>> {
        self.letters
            .find_many(
                doc! { "user_id": user_id },
                Some(doc! { "metadata.created_at": -1 }),
            )
            .await
    }

    async fn letters_due(&self, today: NaiveDate) -> Result<Vec<LetterDoc>> {
        let day = ymd(today);
        self.letters
            .find_many(
                doc! {
                    "auto_email_enabled": true,
                    "email_sent": { "$ne": true },
                    "$or": [ { "release_date": day.as_str() }, { "milestone_date": day.as_str() } ],
                },
                None,
            )
            .await
    }

    async fn claim_letter(&self, letter_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let result = self
            .letters
            .update_one(
                doc! { "letter_id": letter_id, "email_sent": { "$ne": true } },
                doc! { "$set": { "email_sent": true, "email_sent_at": stamp(now) } },
            )
            .await?;
        Ok(result.modified_count == 1)
    }

    async fn release_letter_claim(&self, letter_id: &str) -> Result<()> {
        self.letters
            .update_one(
                doc! { "letter_id": letter_id },
                doc! {
                    "$set": { "email_sent": false },
                    "$unset": { "email_sent_at": "" },
                },
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for MongoStore {
    async fn find_singleton(
        &self,
        user_id: &str,
        kind: RecordKind,
    ) -> Result<Option<ProfileRecordDoc>> {
        self.records
            .find_one(doc! { "user_id": user_id, "kind": kind.as_str(), "singleton": true })
            .await
    }

    async fn insert_record(&self, record: ProfileRecordDoc) -> Result<()> {
        self.records.insert_one(record).await
    }

    async fn update_singleton(
        &self,
        user_id: &str,
        kind: RecordKind,
        fields: bson::Document,
    ) -> Result<Option<ProfileRecordDoc>> {
        self.records
            .find_one_and_update(
                doc! { "user_id": user_id, "kind": kind.as_str(), "singleton": true },
                doc! { "$set": {
                    "fields": fields,
                    "metadata.updated_at": bson::DateTime::now(),
                }},
            )
            .await
    }

    async fn list_records(&self, user_id: &str, kind: RecordKind) -> Result<Vec<ProfileRecordDoc>> {
        self.records
            .find_many(
                doc! { "user_id": user_id, "kind": kind.as_str() },
                Some(doc! { "metadata.created_at": 1 }),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dates_match_stored_letter_format() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        assert_eq!(ymd(date), "2026-03-07");

        let mut letter = LetterDoc::new("owner-1", "t", "b");
        letter.release_date = Some(date);
        let stored = bson::to_document(&letter).unwrap();
        assert_eq!(stored.get_str("release_date").unwrap(), ymd(date));
    }
}
