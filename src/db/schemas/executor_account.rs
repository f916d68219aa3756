//! Executor account schema
//!
//! Binds an external email identity to one owner's account. Created pending
//! when the owner designates an executor, and accepted once the invited
//! person signs in with the matching federated identity and presents the
//! invitation token.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use super::metadata::Metadata;
use crate::db::mongo::{IntoIndexes, MutMetadata};

/// Collection name for executor accounts
pub const EXECUTOR_ACCOUNT_COLLECTION: &str = "executor_accounts";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorStatus {
    #[default]
    Pending,
    Accepted,
}

impl ExecutorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutorStatus::Pending => "pending",
            ExecutorStatus::Accepted => "accepted",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecutorAccountDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Invited email, stored lower-cased
    pub executor_email: String,

    /// Owner whose plan this executor may act on
    pub account_user_id: String,

    /// Trusted contact record representing the executor
    pub contact_id: String,

    #[serde(default)]
    pub status: ExecutorStatus,

    /// Token from the invitation email
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invitation_token: Option<String>,

    /// Federated subject id captured at acceptance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_google_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invited_at: Option<bson::DateTime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<bson::DateTime>,
}

impl ExecutorAccountDoc {
    /// A fresh pending invitation
    pub fn pending(
        executor_email: &str,
        account_user_id: impl Into<String>,
        contact_id: impl Into<String>,
        invitation_token: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            metadata: Metadata::new(),
            executor_email: executor_email.trim().to_lowercase(),
            account_user_id: account_user_id.into(),
            contact_id: contact_id.into(),
            status: ExecutorStatus::Pending,
            invitation_token: Some(invitation_token.into()),
            executor_google_id: None,
            invited_at: Some(bson::DateTime::now()),
            accepted_at: None,
        }
    }

    /// Whether the invited address matches `email`, ignoring case
    pub fn email_matches(&self, email: &str) -> bool {
        self.executor_email.eq_ignore_ascii_case(email.trim())
    }
}

impl IntoIndexes for ExecutorAccountDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "executor_email": 1, "account_user_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("executor_account_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "invitation_token": 1 },
                Some(
                    IndexOptions::builder()
                        .name("invitation_token_index".to_string())
                        .sparse(true)
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for ExecutorAccountDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_normalizes_email() {
        let account = ExecutorAccountDoc::pending(" A@X.com ", "owner-1", "c-1", "tok");
        assert_eq!(account.executor_email, "a@x.com");
        assert_eq!(account.status, ExecutorStatus::Pending);
        assert!(account.invited_at.is_some());
    }

    #[test]
    fn test_email_match_is_case_insensitive() {
        let account = ExecutorAccountDoc::pending("a@x.com", "owner-1", "c-1", "tok");
        assert!(account.email_matches("A@X.COM"));
        assert!(!account.email_matches("b@x.com"));
    }
}
