//! Letters and scheduled delivery
//!
//! Owners write letters to their contacts. A letter with a release or
//! milestone date and auto email enabled is delivered by the daily job on
//! that date, but only once the owner's release is activated.
//!
//! Delivery claims each letter (`email_sent` false → true) before sending,
//! so overlapping runs never send the same letter twice. A failed send
//! gives the claim back for the next run.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::auth::OwnerCapability;
use crate::db::schemas::LetterDoc;
use crate::services::mailer::{self, Mailer};
use crate::services::profile::owner_display_name;
use crate::store::Store;
use crate::types::{HeirloomError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLetter {
    #[serde(default)]
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub recipient_id: Option<String>,
    #[serde(default)]
    pub recipient_email: Option<String>,
    #[serde(default)]
    pub release_date: Option<NaiveDate>,
    #[serde(default)]
    pub milestone_date: Option<NaiveDate>,
    #[serde(default)]
    pub auto_email_enabled: bool,
}

/// Letter as shown to its author
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerLetterView {
    pub id: String,
    pub title: String,
    pub body: String,
    pub recipient_id: Option<String>,
    pub recipient_name: String,
    pub recipient_email: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub milestone_date: Option<NaiveDate>,
    pub auto_email_enabled: bool,
    pub email_sent: bool,
}

impl From<&LetterDoc> for OwnerLetterView {
    fn from(doc: &LetterDoc) -> Self {
        Self {
            id: doc.letter_id.clone(),
            title: doc.title.clone(),
            body: doc.body.clone(),
            recipient_id: doc.recipient_id.clone(),
            recipient_name: doc.recipient_name.clone(),
            recipient_email: doc.recipient_email.clone(),
            release_date: doc.release_date,
            milestone_date: doc.milestone_date,
            auto_email_enabled: doc.auto_email_enabled,
            email_sent: doc.email_sent,
        }
    }
}

/// Outcome for one due letter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Sent,
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LetterDelivery {
    pub letter_id: String,
    #[serde(flatten)]
    pub outcome: DeliveryOutcome,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReport {
    pub date: Option<NaiveDate>,
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
    pub letters: Vec<LetterDelivery>,
}

impl DeliveryReport {
    fn record(&mut self, letter_id: &str, outcome: DeliveryOutcome) {
        match &outcome {
            DeliveryOutcome::Sent => self.sent += 1,
            DeliveryOutcome::Skipped { .. } => self.skipped += 1,
            DeliveryOutcome::Failed { .. } => self.failed += 1,
        }
        self.letters.push(LetterDelivery {
            letter_id: letter_id.to_string(),
            outcome,
        });
    }
}

fn skipped(reason: &str) -> DeliveryOutcome {
    DeliveryOutcome::Skipped {
        reason: reason.to_string(),
    }
}

pub struct LetterService {
    store: Arc<dyn Store>,
    mailer: Arc<dyn Mailer>,
}

impl LetterService {
    pub fn new(store: Arc<dyn Store>, mailer: Arc<dyn Mailer>) -> Self {
        Self { store, mailer }
    }

    pub async fn create_letter(&self, owner: &OwnerCapability, input: NewLetter) -> Result<LetterDoc> {
        if input.body.trim().is_empty() {
            return Err(HeirloomError::BadRequest("Letter body is required".into()));
        }

        let mut letter = LetterDoc::new(owner.user_id(), input.title.trim(), input.body);
        if let Some(recipient_id) = input.recipient_id.filter(|id| !id.is_empty()) {
            let contact = match self.store.find_contact(&recipient_id).await? {
                Some(c) if c.is_owned_by(owner.user_id()) => c,
                _ => {
                    return Err(HeirloomError::BadRequest(
                        "Recipient must be one of your trusted contacts".into(),
                    ))
                }
            };
            letter.recipient_name = contact.name.clone();
            letter.recipient_id = Some(recipient_id);
        }
        letter.recipient_email = input
            .recipient_email
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty());
        letter.release_date = input.release_date;
        letter.milestone_date = input.milestone_date;
        letter.auto_email_enabled = input.auto_email_enabled;

        if letter.auto_email_enabled && !letter.is_scheduled() {
            return Err(HeirloomError::BadRequest(
                "Automatic delivery needs a release or milestone date".into(),
            ));
        }

        self.store.insert_letter(letter.clone()).await?;
        info!(user_id = %owner.user_id(), letter_id = %letter.letter_id, "Created letter");
        Ok(letter)
    }

    pub async fn list_letters(&self, owner: &OwnerCapability) -> Result<Vec<LetterDoc>> {
        self.store.list_letters(owner.user_id()).await
    }

    /// Deliver every letter due on `today` whose owner has been released.
    ///
    /// One letter failing never stops the others.
    pub async fn check_scheduled_letters(&self, today: NaiveDate) -> Result<DeliveryReport> {
        let due = self.store.letters_due(today).await?;
        let mut owners: Vec<String> = due.iter().map(|l| l.user_id.clone()).collect();
        owners.sort();
        owners.dedup();
        let released = self.store.activated_owners(&owners).await?;

        let mut report = DeliveryReport {
            date: Some(today),
            ..Default::default()
        };
        for letter in &due {
            if !released.contains(&letter.user_id) {
                report.record(&letter.letter_id, skipped("release not activated"));
                continue;
            }
            let outcome = match self.deliver(letter).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(letter_id = %letter.letter_id, "Letter delivery error: {}", e);
                    DeliveryOutcome::Failed {
                        error: e.public_message(),
                    }
                }
            };
            report.record(&letter.letter_id, outcome);
        }

        info!(
            date = %today,
            due = due.len(),
            sent = report.sent,
            skipped = report.skipped,
            failed = report.failed,
            "Scheduled letter run finished"
        );
        Ok(report)
    }

    async fn deliver(&self, letter: &LetterDoc) -> Result<DeliveryOutcome> {
        // Release state may have been read before another run; confirm it per letter
        let released = self
            .store
            .find_release_settings(&letter.user_id)
            .await?
            .map(|s| s.release_activated)
            .unwrap_or(false);
        if !released {
            return Ok(skipped("release not activated"));
        }

        let recipient = match letter.recipient_email.clone() {
            Some(email) => Some(email),
            None => match letter.recipient_id.as_deref() {
                Some(id) => self
                    .store
                    .find_contact(id)
                    .await?
                    .filter(|c| c.is_owned_by(&letter.user_id))
                    .and_then(|c| c.normalized_email()),
                None => None,
            },
        };
        let Some(to) = recipient else {
            return Ok(skipped("no recipient email"));
        };

        if !self.store.claim_letter(&letter.letter_id, Utc::now()).await? {
            return Ok(skipped("already sent"));
        }

        let owner_name = owner_display_name(self.store.as_ref(), &letter.user_id).await?;
        let message = mailer::scheduled_letter(&to, letter, &owner_name);
        match self.mailer.send(&message).await {
            Ok(()) => {
                info!(letter_id = %letter.letter_id, user_id = %letter.user_id, "Scheduled letter sent");
                Ok(DeliveryOutcome::Sent)
            }
            Err(e) => {
                warn!(letter_id = %letter.letter_id, "Scheduled letter send failed: {}", e);
                self.store.release_letter_claim(&letter.letter_id).await?;
                Ok(DeliveryOutcome::Failed {
                    error: e.public_message(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::ContactStatus;
    use crate::store::{LetterStore, MemoryStore, ReleaseStore};
    use crate::testing::{self, RecordingMailer};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 14).unwrap()
    }

    async fn due_letter(store: &MemoryStore, owner: &str, recipient_id: Option<&str>) -> LetterDoc {
        let mut letter = LetterDoc::new(owner, "Happy birthday", "Thinking of you.");
        letter.recipient_id = recipient_id.map(str::to_string);
        letter.release_date = Some(today());
        letter.auto_email_enabled = true;
        store.insert_letter(letter.clone()).await.unwrap();
        letter
    }

    #[tokio::test]
    async fn test_only_released_owners_letters_go_out_once() {
        let store = Arc::new(MemoryStore::new());
        let mailer = RecordingMailer::new();
        let ada =
            testing::contact(&store, "owner-1", "Ada", Some("ada@x.com"), ContactStatus::None, &[])
                .await;
        let released = due_letter(&store, "owner-1", Some(&ada.contact_id)).await;
        let held = due_letter(&store, "owner-2", Some(&ada.contact_id)).await;
        store.activate_release("owner-1", Utc::now()).await.unwrap();
        let letters = LetterService::new(store.clone(), mailer.clone());

        let report = letters.check_scheduled_letters(today()).await.unwrap();
        assert_eq!(report.sent, 1);
        assert_eq!(report.skipped, 1);
        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ada@x.com");

        let outcome_for = |id: &str| {
            report
                .letters
                .iter()
                .find(|d| d.letter_id == id)
                .map(|d| d.outcome.clone())
                .unwrap()
        };
        assert_eq!(outcome_for(&released.letter_id), DeliveryOutcome::Sent);
        assert!(matches!(outcome_for(&held.letter_id), DeliveryOutcome::Skipped { .. }));

        let rerun = letters.check_scheduled_letters(today()).await.unwrap();
        assert_eq!(rerun.sent, 0);
        assert_eq!(mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_send_is_retried_next_run() {
        let store = Arc::new(MemoryStore::new());
        let mailer = RecordingMailer::new();
        let mut letter = LetterDoc::new("owner-1", "", "Hello");
        letter.recipient_email = Some("ada@x.com".into());
        letter.milestone_date = Some(today());
        letter.auto_email_enabled = true;
        store.insert_letter(letter).await.unwrap();
        store.activate_release("owner-1", Utc::now()).await.unwrap();
        let letters = LetterService::new(store.clone(), mailer.clone());

        mailer.fail(true);
        let report = letters.check_scheduled_letters(today()).await.unwrap();
        assert_eq!(report.failed, 1);
        let DeliveryOutcome::Failed { error } = &report.letters[0].outcome else {
            panic!("expected failed outcome");
        };
        assert_eq!(error, "Internal server error");
        assert!(!error.contains("mail provider down"));

        mailer.fail(false);
        let report = letters.check_scheduled_letters(today()).await.unwrap();
        assert_eq!(report.sent, 1);
    }

    #[tokio::test]
    async fn test_letter_without_email_skipped_others_continue() {
        let store = Arc::new(MemoryStore::new());
        let mailer = RecordingMailer::new();
        let no_email =
            testing::contact(&store, "owner-1", "Bo", None, ContactStatus::None, &[]).await;
        let ada =
            testing::contact(&store, "owner-1", "Ada", Some("ada@x.com"), ContactStatus::None, &[])
                .await;
        due_letter(&store, "owner-1", Some(&no_email.contact_id)).await;
        due_letter(&store, "owner-1", Some(&ada.contact_id)).await;
        store.activate_release("owner-1", Utc::now()).await.unwrap();

        let report = LetterService::new(store.clone(), mailer.clone())
            .check_scheduled_letters(today())
            .await
            .unwrap();
        assert_eq!(report.sent, 1);
        assert_eq!(report.skipped, 1);
    }

    #[tokio::test]
    async fn test_concurrent_runs_send_once() {
        let store = Arc::new(MemoryStore::new());
        let mailer = RecordingMailer::new();
        let ada =
            testing::contact(&store, "owner-1", "Ada", Some("ada@x.com"), ContactStatus::None, &[])
                .await;
        due_letter(&store, "owner-1", Some(&ada.contact_id)).await;
        store.activate_release("owner-1", Utc::now()).await.unwrap();
        let letters = Arc::new(LetterService::new(store.clone(), mailer.clone()));

        let (a, b) = tokio::join!(
            letters.check_scheduled_letters(today()),
            letters.check_scheduled_letters(today())
        );
        assert_eq!(a.unwrap().sent + b.unwrap().sent, 1);
        assert_eq!(mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_create_letter_validates_recipient() {
        let store = Arc::new(MemoryStore::new());
        let ada =
            testing::contact(&store, "owner-1", "Ada", Some("ada@x.com"), ContactStatus::None, &[])
                .await;
        let letters = LetterService::new(store.clone(), RecordingMailer::new());
        let owner = OwnerCapability::for_tests("owner-1");

        let created = letters
            .create_letter(
                &owner,
                NewLetter {
                    body: "Hi".into(),
                    recipient_id: Some(ada.contact_id.clone()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(created.recipient_name, "Ada");

        let foreign = letters
            .create_letter(
                &OwnerCapability::for_tests("owner-2"),
                NewLetter {
                    body: "Hi".into(),
                    recipient_id: Some(ada.contact_id.clone()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(foreign, Err(HeirloomError::BadRequest(_))));

        let undated = letters
            .create_letter(
                &owner,
                NewLetter {
                    body: "Hi".into(),
                    auto_email_enabled: true,
                    ..Default::default()
                },
            )
            .await;
        assert!(undated.is_err());
        assert_eq!(letters.list_letters(&owner).await.unwrap().len(), 1);
    }
}
