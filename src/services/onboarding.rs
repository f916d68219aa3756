//! Guided onboarding
//!
//! A fixed sequence of steps the owner walks through once. The current
//! step is stored in the owner's `onboarding` profile record so the flow
//! resumes where it was left.

use bson::doc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use crate::auth::OwnerCapability;
use crate::db::schemas::RecordKind;
use crate::services::profile::ProfileService;
use crate::store::Store;
use crate::types::{HeirloomError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStep {
    #[default]
    Welcome,
    PersonalDetails,
    TrustedContacts,
    FuneralPreferences,
    Documents,
    Letters,
    ReleaseSettings,
    Complete,
}

impl OnboardingStep {
    const ORDER: [OnboardingStep; 8] = [
        OnboardingStep::Welcome,
        OnboardingStep::PersonalDetails,
        OnboardingStep::TrustedContacts,
        OnboardingStep::FuneralPreferences,
        OnboardingStep::Documents,
        OnboardingStep::Letters,
        OnboardingStep::ReleaseSettings,
        OnboardingStep::Complete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OnboardingStep::Welcome => "welcome",
            OnboardingStep::PersonalDetails => "personal_details",
            OnboardingStep::TrustedContacts => "trusted_contacts",
            OnboardingStep::FuneralPreferences => "funeral_preferences",
            OnboardingStep::Documents => "documents",
            OnboardingStep::Letters => "letters",
            OnboardingStep::ReleaseSettings => "release_settings",
            OnboardingStep::Complete => "complete",
        }
    }

    /// Steps the owner may pass over without finishing
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            OnboardingStep::FuneralPreferences | OnboardingStep::Documents | OnboardingStep::Letters
        )
    }

    fn position(&self) -> usize {
        Self::ORDER.iter().position(|s| s == self).unwrap_or(0)
    }

    fn next(&self) -> Option<OnboardingStep> {
        Self::ORDER.get(self.position() + 1).copied()
    }

    fn previous(&self) -> Option<OnboardingStep> {
        self.position().checked_sub(1).map(|i| Self::ORDER[i])
    }
}

impl fmt::Display for OnboardingStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OnboardingStep {
    type Err = HeirloomError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ORDER
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| HeirloomError::BadRequest(format!("Unknown onboarding step: {}", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingEvent {
    Complete,
    Skip,
    Back,
}

/// Apply `event` at `step`
pub fn transition(step: OnboardingStep, event: OnboardingEvent) -> Result<OnboardingStep> {
    let invalid = || {
        HeirloomError::BadRequest(format!("Cannot {:?} from step {}", event, step).to_lowercase())
    };
    match event {
        OnboardingEvent::Complete => step.next().ok_or_else(invalid),
        OnboardingEvent::Skip if step.is_skippable() => step.next().ok_or_else(invalid),
        OnboardingEvent::Skip => Err(invalid()),
        OnboardingEvent::Back if step == OnboardingStep::Complete => Err(invalid()),
        OnboardingEvent::Back => step.previous().ok_or_else(invalid),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingState {
    pub step: OnboardingStep,
    pub skippable: bool,
    pub completed: bool,
}

impl From<OnboardingStep> for OnboardingState {
    fn from(step: OnboardingStep) -> Self {
        Self {
            step,
            skippable: step.is_skippable(),
            completed: step == OnboardingStep::Complete,
        }
    }
}

pub struct OnboardingService {
    store: Arc<dyn Store>,
    profile: Arc<ProfileService>,
}

impl OnboardingService {
    pub fn new(store: Arc<dyn Store>, profile: Arc<ProfileService>) -> Self {
        Self { store, profile }
    }

    pub async fn current(&self, owner: &OwnerCapability) -> Result<OnboardingState> {
        let step = match self
            .store
            .find_singleton(owner.user_id(), RecordKind::Onboarding)
            .await?
        {
            Some(record) => record
                .fields
                .get_str("step")
                .ok()
                .and_then(|s| s.parse::<OnboardingStep>().ok())
                .unwrap_or_default(),
            None => OnboardingStep::default(),
        };
        Ok(step.into())
    }

    pub async fn advance(&self, owner: &OwnerCapability, event: OnboardingEvent) -> Result<OnboardingState> {
        let current = self.current(owner).await?.step;
        let next = transition(current, event)?;
        self.profile
            .save_singleton(owner, RecordKind::Onboarding, doc! { "step": next.as_str() })
            .await?;

        info!(user_id = %owner.user_id(), from = %current, to = %next, "Onboarding step changed");
        Ok(next.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_transitions() {
        use OnboardingEvent as E;
        use OnboardingStep as S;

        assert_eq!(transition(S::Welcome, E::Complete).unwrap(), S::PersonalDetails);
        assert_eq!(transition(S::Documents, E::Skip).unwrap(), S::Letters);
        assert_eq!(transition(S::Letters, E::Back).unwrap(), S::Documents);
        assert_eq!(transition(S::ReleaseSettings, E::Complete).unwrap(), S::Complete);

        assert!(transition(S::PersonalDetails, E::Skip).is_err());
        assert!(transition(S::Welcome, E::Back).is_err());
        assert!(transition(S::Complete, E::Complete).is_err());
        assert!(transition(S::Complete, E::Back).is_err());
    }

    #[test]
    fn test_step_ids_are_snake_case() {
        for step in OnboardingStep::ORDER {
            assert_eq!(step.as_str().parse::<OnboardingStep>().unwrap(), step);
            assert_eq!(
                serde_json::to_value(step).unwrap(),
                serde_json::json!(step.as_str())
            );
        }
    }

    #[tokio::test]
    async fn test_progress_is_persisted() {
        let store = Arc::new(MemoryStore::new());
        let profile = Arc::new(ProfileService::new(store.clone()));
        let onboarding = OnboardingService::new(store.clone(), profile);
        let owner = OwnerCapability::for_tests("owner-1");

        assert_eq!(onboarding.current(&owner).await.unwrap().step, OnboardingStep::Welcome);
        onboarding.advance(&owner, OnboardingEvent::Complete).await.unwrap();
        onboarding.advance(&owner, OnboardingEvent::Complete).await.unwrap();

        let state = onboarding.current(&owner).await.unwrap();
        assert_eq!(state.step, OnboardingStep::TrustedContacts);
        assert!(!state.skippable);

        let err = onboarding.advance(&owner, OnboardingEvent::Skip).await.unwrap_err();
        assert!(matches!(err, HeirloomError::BadRequest(_)));
        assert_eq!(
            onboarding.current(&owner).await.unwrap().step,
            OnboardingStep::TrustedContacts
        );
    }
}
