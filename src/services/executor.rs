//! Executor provisioning
//!
//! Naming a contact as executor in release settings creates (or refreshes)
//! a pending ExecutorAccount and emails the contact an acceptance link. The
//! executor accepts by signing in with Google under the invited address.
//!
//! Provisioning is a side effect of saving release settings, so it reports
//! what happened instead of failing the save.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::{generate_url_token, FederatedIdentity};
use crate::db::schemas::{ExecutorAccountDoc, ExecutorStatus};
use crate::services::mailer::{self, Mailer};
use crate::services::profile::owner_display_name;
use crate::store::Store;
use crate::types::{HeirloomError, Result};

/// What `assign_executor` did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AssignmentOutcome {
    /// Same contact as before
    Unchanged,
    /// Executor removed; existing accounts are left as they are
    Cleared,
    /// Pending account written and link issued
    Invited { email_sent: bool },
    /// The account for this email already accepted
    AlreadyAccepted,
    /// Nothing provisioned
    Skipped { reason: String },
}

/// An account an executor can act on
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorAccountSummary {
    pub account_user_id: String,
    pub owner_name: String,
    pub status: String,
    pub release_activated: bool,
    pub invited_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
}

pub struct ExecutorProvisioning {
    store: Arc<dyn Store>,
    mailer: Arc<dyn Mailer>,
    app_base_url: String,
}

impl ExecutorProvisioning {
    pub fn new(store: Arc<dyn Store>, mailer: Arc<dyn Mailer>, app_base_url: impl Into<String>) -> Self {
        Self {
            store,
            mailer,
            app_base_url: app_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// React to the owner's executor changing from `previous` to `new`
    pub async fn assign_executor(
        &self,
        owner_id: &str,
        previous: Option<&str>,
        new: Option<&str>,
    ) -> AssignmentOutcome {
        let Some(new) = new else {
            return if previous.is_some() {
                AssignmentOutcome::Cleared
            } else {
                AssignmentOutcome::Unchanged
            };
        };
        if previous == Some(new) {
            return AssignmentOutcome::Unchanged;
        }

        match self.provision(owner_id, new).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(user_id = %owner_id, contact_id = %new, "Executor provisioning failed: {}", e);
                AssignmentOutcome::Skipped {
                    reason: e.public_message(),
                }
            }
        }
    }

    async fn provision(&self, owner_id: &str, contact_id: &str) -> Result<AssignmentOutcome> {
        let contact = match self.store.find_contact(contact_id).await? {
            Some(c) if c.is_owned_by(owner_id) => c,
            _ => {
                return Ok(AssignmentOutcome::Skipped {
                    reason: "executor contact not found".into(),
                })
            }
        };
        let Some(email) = contact.normalized_email() else {
            return Ok(AssignmentOutcome::Skipped {
                reason: "executor contact has no email".into(),
            });
        };

        let token = generate_url_token();
        let account = ExecutorAccountDoc::pending(&email, owner_id, contact_id, token.clone());
        if !self.store.upsert_pending_executor(account).await? {
            info!(user_id = %owner_id, executor = %email, "Executor already accepted, not re-inviting");
            return Ok(AssignmentOutcome::AlreadyAccepted);
        }

        let link = format!("{}/executor/invite/accept?token={}", self.app_base_url, token);
        let owner_name = owner_display_name(self.store.as_ref(), owner_id).await?;
        let message = mailer::executor_invitation(&email, &contact.name, &owner_name, &link);
        let email_sent = match self.mailer.send(&message).await {
            Ok(()) => true,
            Err(e) => {
                warn!(user_id = %owner_id, executor = %email, "Executor invitation email failed: {}", e);
                false
            }
        };

        info!(user_id = %owner_id, contact_id = %contact_id, executor = %email, email_sent, "Executor invited");
        Ok(AssignmentOutcome::Invited { email_sent })
    }

    /// Accept an invitation as the federated identity that signed in
    pub async fn accept_invitation(
        &self,
        token: &str,
        identity: &FederatedIdentity,
    ) -> Result<ExecutorAccountDoc> {
        if token.trim().is_empty() {
            return Err(HeirloomError::InvalidOrExpiredToken);
        }

        let account = self
            .store
            .find_executor_by_token(token)
            .await?
            .ok_or(HeirloomError::InvalidOrExpiredToken)?;

        if account.status == ExecutorStatus::Accepted {
            return Err(HeirloomError::ConflictingState(
                "Invitation already accepted".into(),
            ));
        }
        if !account.email_matches(&identity.email) {
            warn!(
                account_user_id = %account.account_user_id,
                invited = %account.executor_email,
                signed_in = %identity.email,
                "Executor invitation opened by a different account"
            );
            return Err(HeirloomError::AuthorizationDenied(
                "Sign in with the email address the invitation was sent to".into(),
            ));
        }

        let accepted = self
            .store
            .accept_executor(token, &identity.subject, Utc::now())
            .await?
            .ok_or_else(|| HeirloomError::ConflictingState("Invitation already accepted".into()))?;

        info!(
            account_user_id = %accepted.account_user_id,
            executor = %accepted.executor_email,
            "Executor invitation accepted"
        );
        Ok(accepted)
    }

    pub async fn list_accounts_for_executor(&self, email: &str) -> Result<Vec<ExecutorAccountSummary>> {
        let accounts = self.store.list_executor_accounts(email).await?;
        let owner_ids: Vec<String> = accounts.iter().map(|a| a.account_user_id.clone()).collect();
        let released = self.store.activated_owners(&owner_ids).await?;

        let mut summaries = Vec::with_capacity(accounts.len());
        for account in accounts {
            summaries.push(ExecutorAccountSummary {
                owner_name: owner_display_name(self.store.as_ref(), &account.account_user_id).await?,
                release_activated: released.contains(&account.account_user_id),
                status: account.status.as_str().to_string(),
                invited_at: account.invited_at.map(|d| d.to_chrono()),
                accepted_at: account.accepted_at.map(|d| d.to_chrono()),
                account_user_id: account.account_user_id,
            });
        }
        Ok(summaries)
    }
}
