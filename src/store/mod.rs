//! Persistence seams
//!
//! Every service talks to storage through these traits, so the same flows
//! run against MongoDB in production and an in-memory store in dev mode
//! and in tests. Transitions that must not race (token consume, status
//! promotion, executor accept, release activation, letter claim) are single
//! conditional operations in every implementation.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashSet;

use crate::auth::PermissionSet;
use crate::db::schemas::{
    ContactStatus, ExecutorAccountDoc, LetterDoc, OwnerSessionDoc, ProfileRecordDoc, RecordKind,
    ReleaseSettingsDoc, TrustedContactDoc, ViewerTokenDoc,
};
use crate::types::Result;

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

// =============================================================================
// Owner sessions
// =============================================================================

#[async_trait]
pub trait OwnerSessionStore: Send + Sync {
    async fn insert_session(&self, session: OwnerSessionDoc) -> Result<()>;
    /// Look up a session row; expiry is checked by the caller
    async fn find_session(&self, session_id: &str) -> Result<Option<OwnerSessionDoc>>;
    async fn delete_session(&self, session_id: &str) -> Result<()>;
}

// =============================================================================
// Trusted contacts
// =============================================================================

#[async_trait]
pub trait ContactStore: Send + Sync {
    async fn insert_contact(&self, contact: TrustedContactDoc) -> Result<()>;
    async fn find_contact(&self, contact_id: &str) -> Result<Option<TrustedContactDoc>>;
    async fn list_contacts(&self, user_id: &str) -> Result<Vec<TrustedContactDoc>>;

    /// Replace a contact's permissions, writing the map and the columns together
    async fn set_contact_permissions(
        &self,
        contact_id: &str,
        permissions: &PermissionSet,
    ) -> Result<Option<TrustedContactDoc>>;

    /// Move the contact to `to` if its current status is earlier.
    ///
    /// Returns false when the contact is missing or already at or past `to`.
    async fn promote_contact_status(&self, contact_id: &str, to: ContactStatus) -> Result<bool>;

    async fn delete_contact(&self, contact_id: &str) -> Result<bool>;
}

// =============================================================================
// Viewer tokens
// =============================================================================

#[async_trait]
pub trait ViewerTokenStore: Send + Sync {
    /// Fails with `DuplicateKey` if the token string already exists
    async fn insert_viewer_token(&self, token: ViewerTokenDoc) -> Result<()>;

    /// Atomically mark an unused, unexpired token as used.
    ///
    /// Returns the consumed record, or `None` if no such token was live at
    /// `now`. Of two concurrent calls for one token at most one gets `Some`.
    async fn consume_viewer_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ViewerTokenDoc>>;

    async fn list_viewer_tokens(&self, contact_id: &str) -> Result<Vec<ViewerTokenDoc>>;
}

// =============================================================================
// Executor accounts
// =============================================================================

#[async_trait]
pub trait ExecutorStore: Send + Sync {
    async fn find_executor_account(
        &self,
        executor_email: &str,
        account_user_id: &str,
    ) -> Result<Option<ExecutorAccountDoc>>;

    async fn find_executor_by_token(&self, token: &str) -> Result<Option<ExecutorAccountDoc>>;

    /// Create the account, or reset an existing pending one with the new
    /// contact and token.
    ///
    /// An accepted account stays accepted and keeps its token; only its
    /// `contact_id` moves to the new contact. Returns false in that case.
    async fn upsert_pending_executor(&self, account: ExecutorAccountDoc) -> Result<bool>;

    /// Move the pending account holding `token` to accepted.
    ///
    /// Returns `None` if no pending account holds the token.
    async fn accept_executor(
        &self,
        token: &str,
        executor_google_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ExecutorAccountDoc>>;

    async fn list_executor_accounts(&self, executor_email: &str)
        -> Result<Vec<ExecutorAccountDoc>>;
}

// =============================================================================
// Release settings
// =============================================================================

#[async_trait]
pub trait ReleaseStore: Send + Sync {
    async fn find_release_settings(&self, user_id: &str) -> Result<Option<ReleaseSettingsDoc>>;

    /// Write the configurable fields (lock, executor, unlock hash).
    ///
    /// The activation fields are never touched here.
    async fn save_release_settings(&self, settings: &ReleaseSettingsDoc)
        -> Result<ReleaseSettingsDoc>;

    /// Set `release_activated` once. Later calls return the stored
    /// settings with the original `release_activated_at`.
    async fn activate_release(&self, user_id: &str, now: DateTime<Utc>)
        -> Result<ReleaseSettingsDoc>;

    /// Subset of `user_ids` whose release is activated
    async fn activated_owners(&self, user_ids: &[String]) -> Result<HashSet<String>>;
}

// =============================================================================
// Letters
// =============================================================================

#[async_trait]
pub trait LetterStore: Send + Sync {
    async fn insert_letter(&self, letter: LetterDoc) -> Result<()>;
    async fn list_letters(&self, user_id: &str) -> Result<Vec<LetterDoc>>;

    /// Letters with auto email enabled, not yet sent, dated `today`
    async fn letters_due(&self, today: NaiveDate) -> Result<Vec<LetterDoc>>;

    /// Flip `email_sent` false → true. Returns false if another run got there first.
    async fn claim_letter(&self, letter_id: &str, now: DateTime<Utc>) -> Result<bool>;

    /// Undo a claim after a failed dispatch
    async fn release_letter_claim(&self, letter_id: &str) -> Result<()>;
}

// =============================================================================
// Profile records
// =============================================================================

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn find_singleton(&self, user_id: &str, kind: RecordKind)
        -> Result<Option<ProfileRecordDoc>>;

    /// Fails with `DuplicateKey` when a singleton of the same kind exists
    async fn insert_record(&self, record: ProfileRecordDoc) -> Result<()>;

    async fn update_singleton(
        &self,
        user_id: &str,
        kind: RecordKind,
        fields: bson::Document,
    ) -> Result<Option<ProfileRecordDoc>>;

    async fn list_records(&self, user_id: &str, kind: RecordKind) -> Result<Vec<ProfileRecordDoc>>;
}

/// Everything the services need from storage
pub trait Store:
    OwnerSessionStore
    + ContactStore
    + ViewerTokenStore
    + ExecutorStore
    + ReleaseStore
    + LetterStore
    + ProfileStore
{
}

impl<T> Store for T where
    T: OwnerSessionStore
        + ContactStore
        + ViewerTokenStore
        + ExecutorStore
        + ReleaseStore
        + LetterStore
        + ProfileStore
{
}
