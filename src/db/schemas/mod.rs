//! Database schemas for Heirloom
//!
//! MongoDB document structures for sessions, contacts, tokens, executors,
//! release settings, letters and profile records.

mod executor_account;
mod letter;
mod metadata;
mod owner_session;
mod profile_record;
mod release_settings;
mod trusted_contact;
mod viewer_token;

pub use executor_account::{ExecutorAccountDoc, ExecutorStatus, EXECUTOR_ACCOUNT_COLLECTION};
pub use letter::{LetterDoc, LETTER_COLLECTION};
pub use metadata::Metadata;
pub use owner_session::{OwnerSessionDoc, OWNER_SESSION_COLLECTION};
pub use profile_record::{ProfileRecordDoc, RecordKind, PROFILE_RECORD_COLLECTION};
pub use release_settings::{ReleaseSettingsDoc, RELEASE_SETTINGS_COLLECTION};
pub use trusted_contact::{ContactStatus, TrustedContactDoc, TRUSTED_CONTACT_COLLECTION};
pub use viewer_token::{ViewerTokenDoc, VIEWER_TOKEN_COLLECTION};
