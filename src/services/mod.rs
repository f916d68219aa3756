//! Services layer for Heirloom
//!
//! Business logic that sits between the HTTP routes and the store.
//!
//! ## Services
//!
//! - **ViewerInvitations**: single-use login links for trusted contacts
//! - **ExecutorProvisioning**: executor accounts, invitations and acceptance
//! - **ReleaseService**: release settings, unlock code and release activation
//! - **DataProjection**: permission-gated views for viewers and executors
//! - **LetterService**: owner letters and scheduled delivery
//! - **ContactService** / **ProfileService**: owner-managed plan data
//! - **OnboardingService**: the guided setup state machine
//! - **OwnerSessions**: cookie sessions backed by provider tokens
//! - **Mailer**: outbound email

pub mod contacts;
pub mod executor;
pub mod invitation;
pub mod letters;
pub mod mailer;
pub mod onboarding;
pub mod profile;
pub mod projection;
pub mod release;
pub mod sessions;

pub use contacts::{ContactService, ContactView, NewContact};
pub use executor::{AssignmentOutcome, ExecutorAccountSummary, ExecutorProvisioning};
pub use invitation::{InvitationRecord, IssuedInvitation, ViewerInvitations};
pub use letters::{DeliveryOutcome, DeliveryReport, LetterService, NewLetter, OwnerLetterView};
pub use mailer::{HttpMailer, LogMailer, Mailer, MailerConfig, OutboundEmail};
pub use onboarding::{OnboardingEvent, OnboardingService, OnboardingState, OnboardingStep};
pub use profile::{owner_display_name, ProfileService};
pub use projection::{DataProjection, ExecutorProjection, LetterView, ViewerProjection};
pub use release::{ReleaseService, ReleaseSettingsUpdate, ReleaseSettingsView, SavedReleaseSettings};
pub use sessions::OwnerSessions;
