//! In-memory store for dev mode and tests
//!
//! Keyed the same way the MongoDB unique indexes are. Conditional
//! transitions run while holding the entry's shard lock (`get_mut` /
//! `entry`), which gives the same at-most-once guarantees per record as
//! the filtered updates in the MongoDB store. No guard is held across an
//! await point.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;

use super::{
    ContactStore, ExecutorStore, LetterStore, OwnerSessionStore, ProfileStore, ReleaseStore,
    ViewerTokenStore,
};
use crate::auth::PermissionSet;
use crate::db::schemas::{
    ContactStatus, ExecutorAccountDoc, ExecutorStatus, LetterDoc, OwnerSessionDoc,
    ProfileRecordDoc, RecordKind, ReleaseSettingsDoc, TrustedContactDoc, ViewerTokenDoc,
};
use crate::types::{HeirloomError, Result};

#[derive(Default)]
pub struct MemoryStore {
    /// By session id
    sessions: DashMap<String, OwnerSessionDoc>,
    /// By contact id
    contacts: DashMap<String, TrustedContactDoc>,
    /// By token string
    viewer_tokens: DashMap<String, ViewerTokenDoc>,
    /// By (executor email, owner id)
    executors: DashMap<(String, String), ExecutorAccountDoc>,
    /// By owner id
    release: DashMap<String, ReleaseSettingsDoc>,
    /// By letter id
    letters: DashMap<String, LetterDoc>,
    /// By record id
    records: DashMap<String, ProfileRecordDoc>,
    /// Singleton record id by (owner id, kind)
    singletons: DashMap<(String, RecordKind), String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn stamp(now: DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_chrono(now)
}

#[async_trait]
impl OwnerSessionStore for MemoryStore {
    async fn insert_session(&self, session: OwnerSessionDoc) -> Result<()> {
        match self.sessions.entry(session.session_id.clone()) {
            Entry::Occupied(_) => Err(HeirloomError::DuplicateKey("session_id".into())),
            Entry::Vacant(slot) => {
                slot.insert(session);
                Ok(())
            }
        }
    }

    async fn find_session(&self, session_id: &str) -> Result<Option<OwnerSessionDoc>> {
        Ok(self.sessions.get(session_id).map(|s| s.clone()))
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.sessions.remove(session_id);
        Ok(())
    }
}

#[async_trait]
impl ContactStore for MemoryStore {
    async fn insert_contact(&self, contact: TrustedContactDoc) -> Result<()> {
        match self.contacts.entry(contact.contact_id.clone()) {
            Entry::Occupied(_) => Err(HeirloomError::DuplicateKey("contact_id".into())),
            Entry::Vacant(slot) => {
                slot.insert(contact);
                Ok(())
            }
        }
    }

    async fn find_contact(&self, contact_id: &str) -> Result<Option<TrustedContactDoc>> {
        Ok(self
            .contacts
            .get(contact_id)
            .filter(|c| !c.metadata.is_deleted)
            .map(|c| c.clone()))
    }

    async fn list_contacts(&self, user_id: &str) -> Result<Vec<TrustedContactDoc>> {
        let mut contacts: Vec<TrustedContactDoc> = self
            .contacts
            .iter()
            .filter(|c| c.user_id == user_id && !c.metadata.is_deleted)
            .map(|c| c.clone())
            .collect();
        contacts.sort_by(|a, b| a.metadata.created_at.cmp(&b.metadata.created_at));
        Ok(contacts)
    }

    async fn set_contact_permissions(
        &self,
        contact_id: &str,
        permissions: &PermissionSet,
    ) -> Result<Option<TrustedContactDoc>> {
        let Some(mut contact) = self.contacts.get_mut(contact_id) else {
            return Ok(None);
        };
        if contact.metadata.is_deleted {
            return Ok(None);
        }
        contact.apply_permissions(permissions);
        contact.metadata.touch();
        Ok(Some(contact.clone()))
    }

    async fn promote_contact_status(&self, contact_id: &str, to: ContactStatus) -> Result<bool> {
        let Some(mut contact) = self.contacts.get_mut(contact_id) else {
            return Ok(false);
        };
        if contact.metadata.is_deleted || contact.status >= to {
            return Ok(false);
        }
        contact.status = to;
        contact.metadata.touch();
        Ok(true)
    }

    async fn delete_contact(&self, contact_id: &str) -> Result<bool> {
        let Some(mut contact) = self.contacts.get_mut(contact_id) else {
            return Ok(false);
        };
        if contact.metadata.is_deleted {
            return Ok(false);
        }
        contact.metadata.delete();
        Ok(true)
    }
}

#[async_trait]
impl ViewerTokenStore for MemoryStore {
    async fn insert_viewer_token(&self, token: ViewerTokenDoc) -> Result<()> {
        match self.viewer_tokens.entry(token.token.clone()) {
            Entry::Occupied(_) => Err(HeirloomError::DuplicateKey("token".into())),
            Entry::Vacant(slot) => {
                slot.insert(token);
                Ok(())
            }
        }
    }

    async fn consume_viewer_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ViewerTokenDoc>> {
        let Some(mut record) = self.viewer_tokens.get_mut(token) else {
            return Ok(None);
        };
        if !record.is_redeemable(now) {
            return Ok(None);
        }
        record.used = true;
        record.used_at = Some(stamp(now));
        Ok(Some(record.clone()))
    }

    async fn list_viewer_tokens(&self, contact_id: &str) -> Result<Vec<ViewerTokenDoc>> {
        Ok(self
            .viewer_tokens
            .iter()
            .filter(|t| t.contact_id == contact_id)
            .map(|t| t.clone())
            .collect())
    }
}

#[async_trait]
impl ExecutorStore for MemoryStore {
    async fn find_executor_account(
        &self,
        executor_email: &str,
        account_user_id: &str,
    ) -> Result<Option<ExecutorAccountDoc>> {
        let key = (executor_email.trim().to_lowercase(), account_user_id.to_string());
        Ok(self.executors.get(&key).map(|a| a.clone()))
    }

    async fn find_executor_by_token(&self, token: &str) -> Result<Option<ExecutorAccountDoc>> {
        Ok(self
            .executors
            .iter()
            .find(|a| a.invitation_token.as_deref() == Some(token))
            .map(|a| a.clone()))
    }

    async fn upsert_pending_executor(&self, account: ExecutorAccountDoc) -> Result<bool> {
        let key = (account.executor_email.clone(), account.account_user_id.clone());
        match self.executors.entry(key) {
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                if existing.status == ExecutorStatus::Accepted {
                    if existing.contact_id != account.contact_id {
                        existing.contact_id = account.contact_id;
                        existing.metadata.touch();
                    }
                    return Ok(false);
                }
                existing.status = ExecutorStatus::Pending;
                existing.contact_id = account.contact_id;
                existing.invitation_token = account.invitation_token;
                existing.invited_at = Some(bson::DateTime::now());
                existing.metadata.is_deleted = false;
                existing.metadata.touch();
                Ok(true)
            }
            Entry::Vacant(slot) => {
                slot.insert(account);
                Ok(true)
            }
        }
    }

    async fn accept_executor(
        &self,
        token: &str,
        executor_google_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ExecutorAccountDoc>> {
        // Find the key first; holding an iterator while taking get_mut on
        // the same map deadlocks.
        let key = self
            .executors
            .iter()
            .find(|a| a.invitation_token.as_deref() == Some(token))
            .map(|a| a.key().clone());
        let Some(key) = key else {
            return Ok(None);
        };

        let Some(mut account) = self.executors.get_mut(&key) else {
            return Ok(None);
        };
        if account.status != ExecutorStatus::Pending
            || account.invitation_token.as_deref() != Some(token)
        {
            return Ok(None);
        }
        account.status = ExecutorStatus::Accepted;
        account.executor_google_id = Some(executor_google_id.to_string());
        account.accepted_at = Some(stamp(now));
        account.metadata.touch();
        Ok(Some(account.clone()))
    }

    async fn list_executor_accounts(
        &self,
        executor_email: &str,
    ) -> Result<Vec<ExecutorAccountDoc>> {
        let email = executor_email.trim().to_lowercase();
        Ok(self
            .executors
            .iter()
            .filter(|a| a.executor_email == email && !a.metadata.is_deleted)
            .map(|a| a.clone())
            .collect())
    }
}

#[async_trait]
impl ReleaseStore for MemoryStore {
    async fn find_release_settings(&self, user_id: &str) -> Result<Option<ReleaseSettingsDoc>> {
        Ok(self.release.get(user_id).map(|s| s.clone()))
    }

    async fn save_release_settings(
        &self,
        settings: &ReleaseSettingsDoc,
    ) -> Result<ReleaseSettingsDoc> {
        let mut stored = self
            .release
            .entry(settings.user_id.clone())
            .or_insert_with(|| ReleaseSettingsDoc::new(settings.user_id.clone()));
        stored.is_locked = settings.is_locked;
        stored.executor_contact_id = settings.executor_contact_id.clone();
        stored.unlock_code_hash = settings.unlock_code_hash.clone();
        stored.metadata.touch();
        Ok(stored.clone())
    }

    async fn activate_release(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ReleaseSettingsDoc> {
        let mut stored = self
            .release
            .entry(user_id.to_string())
            .or_insert_with(|| ReleaseSettingsDoc::new(user_id));
        if !stored.release_activated {
            stored.release_activated = true;
            stored.release_activated_at = Some(stamp(now));
            stored.metadata.touch();
        }
        Ok(stored.clone())
    }

    async fn activated_owners(&self, user_ids: &[String]) -> Result<HashSet<String>> {
        Ok(user_ids
            .iter()
            .filter(|id| {
                self.release
                    .get(id.as_str())
                    .map(|s| s.release_activated)
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl LetterStore for MemoryStore {
    async fn insert_letter(&self, letter: LetterDoc) -> Result<()> {
        match self.letters.entry(letter.letter_id.clone()) {
            Entry::Occupied(_) => Err(HeirloomError::DuplicateKey("letter_id".into())),
            Entry::Vacant(slot) => {
                slot.insert(letter);
                Ok(())
            }
        }
    }

    async fn list_letters(&self, user_id: &str) -> Result<Vec<LetterDoc>> {
        let mut letters: Vec<LetterDoc> = self
            .letters
            .iter()
            .filter(|l| l.user_id == user_id && !l.metadata.is_deleted)
            .map(|l| l.clone())
            .collect();
        letters.sort_by(|a, b| b.metadata.created_at.cmp(&a.metadata.created_at));
        Ok(letters)
    }

    async fn letters_due(&self, today: NaiveDate) -> Result<Vec<LetterDoc>> {
        Ok(self
            .letters
            .iter()
            .filter(|l| l.is_due_on(today))
            .map(|l| l.clone())
            .collect())
    }

    async fn claim_letter(&self, letter_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let Some(mut letter) = self.letters.get_mut(letter_id) else {
            return Ok(false);
        };
        if letter.email_sent || letter.metadata.is_deleted {
            return Ok(false);
        }
        letter.email_sent = true;
        letter.email_sent_at = Some(stamp(now));
        Ok(true)
    }

    async fn release_letter_claim(&self, letter_id: &str) -> Result<()> {
        if let Some(mut letter) = self.letters.get_mut(letter_id) {
            letter.email_sent = false;
            letter.email_sent_at = None;
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn find_singleton(
        &self,
        user_id: &str,
        kind: RecordKind,
    ) -> Result<Option<ProfileRecordDoc>> {
        let record_id = match self.singletons.get(&(user_id.to_string(), kind)) {
            Some(id) => id.clone(),
            None => return Ok(None),
        };
        Ok(self
            .records
            .get(&record_id)
            .filter(|r| !r.metadata.is_deleted)
            .map(|r| r.clone()))
    }

    async fn insert_record(&self, record: ProfileRecordDoc) -> Result<()> {
        if record.singleton {
            match self.singletons.entry((record.user_id.clone(), record.kind)) {
                Entry::Occupied(_) => {
                    return Err(HeirloomError::DuplicateKey("singleton_per_owner".into()))
                }
                Entry::Vacant(slot) => {
                    slot.insert(record.record_id.clone());
                }
            }
        }
        self.records.insert(record.record_id.clone(), record);
        Ok(())
    }

    async fn update_singleton(
        &self,
        user_id: &str,
        kind: RecordKind,
        fields: bson::Document,
    ) -> Result<Option<ProfileRecordDoc>> {
        let record_id = match self.singletons.get(&(user_id.to_string(), kind)) {
            Some(id) => id.clone(),
            None => return Ok(None),
        };
        let Some(mut record) = self.records.get_mut(&record_id) else {
            return Ok(None);
        };
        record.fields = fields;
        record.metadata.touch();
        Ok(Some(record.clone()))
    }

    async fn list_records(&self, user_id: &str, kind: RecordKind) -> Result<Vec<ProfileRecordDoc>> {
        let mut records: Vec<ProfileRecordDoc> = self
            .records
            .iter()
            .filter(|r| r.user_id == user_id && r.kind == kind && !r.metadata.is_deleted)
            .map(|r| r.clone())
            .collect();
        records.sort_by(|a, b| a.metadata.created_at.cmp(&b.metadata.created_at));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use chrono::Duration;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_token_consumed_once_under_concurrency() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_viewer_token(ViewerTokenDoc::new("c-1", "owner-1", "tok", Duration::days(7)))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.consume_viewer_token("tok", Utc::now()).await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_duplicate_token_rejected() {
        let store = MemoryStore::new();
        let token = ViewerTokenDoc::new("c-1", "owner-1", "tok", Duration::days(7));
        store.insert_viewer_token(token.clone()).await.unwrap();
        let err = store.insert_viewer_token(token).await.unwrap_err();
        assert!(matches!(err, HeirloomError::DuplicateKey(_)));
    }

    #[tokio::test]
    async fn test_status_promotion_is_monotonic() {
        let store = MemoryStore::new();
        let contact = TrustedContactDoc::new("owner-1", "Ada", None, "sister", "viewer");
        let id = contact.contact_id.clone();
        store.insert_contact(contact).await.unwrap();

        assert!(store.promote_contact_status(&id, ContactStatus::Accepted).await.unwrap());
        assert!(!store.promote_contact_status(&id, ContactStatus::Invited).await.unwrap());

        let stored = store.find_contact(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, ContactStatus::Accepted);
    }

    #[tokio::test]
    async fn test_activation_keeps_first_stamp() {
        let store = MemoryStore::new();
        let first = Utc::now();
        let a = store.activate_release("owner-1", first).await.unwrap();
        let b = store
            .activate_release("owner-1", first + Duration::hours(1))
            .await
            .unwrap();

        assert!(b.release_activated);
        assert_eq!(a.release_activated_at, b.release_activated_at);
    }

    #[tokio::test]
    async fn test_save_settings_preserves_activation() {
        let store = MemoryStore::new();
        store.activate_release("owner-1", Utc::now()).await.unwrap();

        let mut settings = ReleaseSettingsDoc::new("owner-1");
        settings.executor_contact_id = Some("c-9".into());
        let saved = store.save_release_settings(&settings).await.unwrap();

        assert!(saved.release_activated);
        assert_eq!(saved.executor_contact_id.as_deref(), Some("c-9"));
    }

    #[tokio::test]
    async fn test_accepted_executor_not_reset() {
        let store = MemoryStore::new();
        let account = ExecutorAccountDoc::pending("a@x.com", "owner-1", "c-1", "t1");
        assert!(store.upsert_pending_executor(account).await.unwrap());
        store.accept_executor("t1", "g-1", Utc::now()).await.unwrap().unwrap();

        let again = ExecutorAccountDoc::pending("a@x.com", "owner-1", "c-2", "t2");
        assert!(!store.upsert_pending_executor(again).await.unwrap());

        let stored = store.find_executor_account("a@x.com", "owner-1").await.unwrap().unwrap();
        assert_eq!(stored.status, ExecutorStatus::Accepted);
        assert_eq!(stored.contact_id, "c-2");
        assert_eq!(stored.invitation_token.as_deref(), Some("t1"));
    }

    #[tokio::test]
    async fn test_letter_claim_is_exclusive() {
        let store = MemoryStore::new();
        let letter = LetterDoc::new("owner-1", "t", "b");
        let id = letter.letter_id.clone();
        store.insert_letter(letter).await.unwrap();

        assert!(store.claim_letter(&id, Utc::now()).await.unwrap());
        assert!(!store.claim_letter(&id, Utc::now()).await.unwrap());

        store.release_letter_claim(&id).await.unwrap();
        assert!(store.claim_letter(&id, Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_singleton_insert_conflicts() {
        let store = MemoryStore::new();
        let first = ProfileRecordDoc::new("owner-1", RecordKind::Biography, doc! { "a": 1 });
        let second = ProfileRecordDoc::new("owner-1", RecordKind::Biography, doc! { "a": 2 });

        store.insert_record(first).await.unwrap();
        let err = store.insert_record(second).await.unwrap_err();
        assert!(matches!(err, HeirloomError::DuplicateKey(_)));

        let docs = ProfileRecordDoc::new("owner-1", RecordKind::Documents, doc! {});
        let more = ProfileRecordDoc::new("owner-1", RecordKind::Documents, doc! {});
        store.insert_record(docs).await.unwrap();
        store.insert_record(more).await.unwrap();
        assert_eq!(
            store.list_records("owner-1", RecordKind::Documents).await.unwrap().len(),
            2
        );
    }
}
