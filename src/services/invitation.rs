//! Viewer invitations
//!
//! An owner invites a trusted contact by email. The link carries a single-use
//! token; redeeming it promotes the contact to `accepted` and returns the
//! viewer session payload the browser keeps.
//!
//! Every redemption failure (unknown, used, expired, contact gone) is the
//! same `InvalidOrExpiredToken` so the endpoint can't be used to probe
//! which tokens exist.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::auth::{generate_url_token, OwnerCapability, ViewerSessionPayload};
use crate::db::schemas::{ContactStatus, ViewerTokenDoc};
use crate::services::mailer::{self, Mailer};
use crate::services::profile::owner_display_name;
use crate::store::Store;
use crate::types::{HeirloomError, Result};

const MAX_TOKEN_ATTEMPTS: usize = 3;

/// Result of issuing an invitation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedInvitation {
    pub token_id: String,
    pub expires_at: DateTime<Utc>,
    pub email_sent: bool,
}

/// One row of a contact's invitation history. Never carries the token itself.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationRecord {
    pub token_id: String,
    pub created_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
}

impl From<&ViewerTokenDoc> for InvitationRecord {
    fn from(doc: &ViewerTokenDoc) -> Self {
        Self {
            token_id: doc.token_id.clone(),
            created_at: doc.metadata.created_at.map(|d| d.to_chrono()),
            expires_at: doc.expires_at,
            used: doc.used,
            used_at: doc.used_at.map(|d| d.to_chrono()),
        }
    }
}

pub struct ViewerInvitations {
    store: Arc<dyn Store>,
    mailer: Arc<dyn Mailer>,
    app_base_url: String,
    token_ttl: Duration,
}

impl ViewerInvitations {
    pub fn new(
        store: Arc<dyn Store>,
        mailer: Arc<dyn Mailer>,
        app_base_url: impl Into<String>,
        token_ttl: Duration,
    ) -> Self {
        Self {
            store,
            mailer,
            app_base_url: app_base_url.into().trim_end_matches('/').to_string(),
            token_ttl,
        }
    }

    /// Issue a fresh login token for one of the owner's contacts and email it
    pub async fn issue(&self, owner: &OwnerCapability, contact_id: &str) -> Result<IssuedInvitation> {
        let contact = self
            .store
            .find_contact(contact_id)
            .await?
            .ok_or_else(|| HeirloomError::NotFound(format!("Contact {}", contact_id)))?;
        if !contact.is_owned_by(owner.user_id()) {
            warn!(
                user_id = %owner.user_id(),
                contact_id = %contact_id,
                "Invitation attempted for another owner's contact"
            );
            return Err(HeirloomError::AuthorizationDenied(
                "Contact belongs to another account".into(),
            ));
        }
        let Some(email) = contact.normalized_email() else {
            return Err(HeirloomError::BadRequest(
                "Contact has no email address".into(),
            ));
        };

        let mut issued = None;
        for attempt in 1..=MAX_TOKEN_ATTEMPTS {
            let record = ViewerTokenDoc::new(
                &contact.contact_id,
                owner.user_id(),
                generate_url_token(),
                self.token_ttl,
            );
            match self.store.insert_viewer_token(record.clone()).await {
                Ok(()) => {
                    issued = Some(record);
                    break;
                }
                Err(HeirloomError::DuplicateKey(_)) => {
                    debug!("Viewer token collision on attempt {}", attempt);
                }
                Err(e) => return Err(e),
            }
        }
        let record = issued.ok_or_else(|| {
            HeirloomError::Internal("Could not generate a unique viewer token".into())
        })?;

        self.store
            .promote_contact_status(&contact.contact_id, ContactStatus::Invited)
            .await?;

        let link = format!("{}/viewer/login?token={}", self.app_base_url, record.token);
        let owner_name = owner_display_name(self.store.as_ref(), owner.user_id()).await?;
        let message = mailer::viewer_invitation(&email, &contact.name, &owner_name, &link);
        let email_sent = match self.mailer.send(&message).await {
            Ok(()) => true,
            Err(e) => {
                warn!(contact_id = %contact.contact_id, "Invitation email failed: {}", e);
                false
            }
        };

        info!(
            user_id = %owner.user_id(),
            contact_id = %contact.contact_id,
            token_id = %record.token_id,
            email_sent,
            "Issued viewer invitation"
        );

        Ok(IssuedInvitation {
            token_id: record.token_id,
            expires_at: record.expires_at,
            email_sent,
        })
    }

    /// Redeem a token once and build the viewer session
    pub async fn verify(&self, token: &str) -> Result<ViewerSessionPayload> {
        if token.trim().is_empty() {
            return Err(HeirloomError::InvalidOrExpiredToken);
        }

        let record = self
            .store
            .consume_viewer_token(token, Utc::now())
            .await?
            .ok_or(HeirloomError::InvalidOrExpiredToken)?;

        let contact = match self.store.find_contact(&record.contact_id).await? {
            Some(c) if c.is_owned_by(&record.user_id) => c,
            _ => {
                warn!(token_id = %record.token_id, "Token redeemed for a missing contact");
                return Err(HeirloomError::InvalidOrExpiredToken);
            }
        };

        self.store
            .promote_contact_status(&contact.contact_id, ContactStatus::Accepted)
            .await?;

        info!(
            contact_id = %contact.contact_id,
            token_id = %record.token_id,
            "Viewer token redeemed"
        );

        Ok(ViewerSessionPayload::new(
            &contact,
            &contact.permission_set(),
            &record.token_id,
        ))
    }

    /// Invitation audit trail for one of the owner's contacts
    pub async fn history(&self, owner: &OwnerCapability, contact_id: &str) -> Result<Vec<InvitationRecord>> {
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

        let mut records: Vec<InvitationRecord> = self
            .store
            .list_viewer_tokens(contact_id)
            .await?
            .iter()
            .map(InvitationRecord::from)
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }
}
