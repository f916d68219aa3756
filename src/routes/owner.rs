//! Owner API endpoints
//!
//! ## Endpoints
//!
//! - `POST /api/session` - Open a cookie session from the provider token
//! - `DELETE /api/session` - Log out
//! - `GET|POST /api/contacts` - List / create trusted contacts
//! - `DELETE /api/contacts/{id}` - Remove a contact
//! - `PUT /api/contacts/{id}/permissions` - Change what a contact may view
//! - `POST /api/contacts/{id}/invite` - Email a viewer login link
//! - `GET /api/contacts/{id}/invitations` - Invitation history
//! - `GET|PUT /api/release-settings` - Lock, executor and unlock code
//! - `GET|POST /api/letters` - Letters
//! - `GET|PUT /api/profile/{kind}` - Singleton plan sections
//! - `GET|POST /api/records/{kind}` - Collection plan sections
//! - `GET|POST /api/onboarding` - Guided setup progress
//!
//! ## Authentication
//!
//! Everything except session creation and logout requires both owner
//! sessions: the session cookie and the provider bearer token.

use bytes::Bytes;
use hyper::header::{HeaderMap, AUTHORIZATION};
use hyper::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{json_response, ok_json, parse_json, with_cookies, FullBody};
use crate::auth::{
    extract_token_from_header, get_cookie, OwnerCapability, RequestCredentials,
    OWNER_SESSION_COOKIE,
};
use crate::db::schemas::{ProfileRecordDoc, RecordKind};
use crate::server::AppState;
use crate::services::{
    ContactView, NewContact, NewLetter, OnboardingEvent, OwnerLetterView, ReleaseSettingsUpdate,
};
use crate::types::{HeirloomError, Result};

async fn owner(state: &AppState, headers: &HeaderMap) -> Result<OwnerCapability> {
    state
        .resolver
        .owner(&RequestCredentials::from_headers(headers))
        .await
}

// =============================================================================
// Session
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    user_id: String,
    expires_at: chrono::DateTime<chrono::Utc>,
}

pub async fn create_session(state: &AppState, headers: &HeaderMap) -> Result<Response<FullBody>> {
    let auth_header = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let token =
        extract_token_from_header(auth_header).ok_or(HeirloomError::AuthenticationRequired)?;

    let session = state.sessions.establish(token).await?;
    let cookie = state.cookies.set(
        OWNER_SESSION_COOKIE,
        &session.session_id,
        state.sessions.ttl().num_seconds(),
    );
    with_cookies(
        json_response(
            StatusCode::CREATED,
            &SessionResponse {
                user_id: session.user_id,
                expires_at: session.expires_at,
            },
        ),
        [cookie],
    )
}

pub async fn delete_session(state: &AppState, headers: &HeaderMap) -> Result<Response<FullBody>> {
    if let Some(session_id) = get_cookie(headers, OWNER_SESSION_COOKIE) {
        state.sessions.end(&session_id).await?;
    }
    with_cookies(
        json_response(StatusCode::OK, &serde_json::json!({ "loggedOut": true })),
        [state.cookies.clear(OWNER_SESSION_COOKIE)],
    )
}

// =============================================================================
// Contacts
// =============================================================================

pub async fn list_contacts(state: &AppState, headers: &HeaderMap) -> Result<Response<FullBody>> {
    let owner = owner(state, headers).await?;
    let contacts: Vec<ContactView> = state
        .contacts
        .list(&owner)
        .await?
        .iter()
        .map(ContactView::from)
        .collect();
    ok_json(&contacts)
}

pub async fn create_contact(
    state: &AppState,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Response<FullBody>> {
    let owner = owner(state, headers).await?;
    let input: NewContact = parse_json(body)?;
    let contact = state.contacts.create(&owner, input).await?;
    Ok(json_response(StatusCode::CREATED, &ContactView::from(&contact)))
}

pub async fn delete_contact(
    state: &AppState,
    headers: &HeaderMap,
    contact_id: &str,
) -> Result<Response<FullBody>> {
    let owner = owner(state, headers).await?;
    state.contacts.delete(&owner, contact_id).await?;
    ok_json(&serde_json::json!({ "deleted": true }))
}

#[derive(Deserialize)]
struct PermissionsRequest {
    permissions: BTreeMap<String, bool>,
}

pub async fn update_permissions(
    state: &AppState,
    headers: &HeaderMap,
    contact_id: &str,
    body: &Bytes,
) -> Result<Response<FullBody>> {
    let owner = owner(state, headers).await?;
    let request: PermissionsRequest = parse_json(body)?;
    let contact = state
        .contacts
        .update_permissions(&owner, contact_id, &request.permissions)
        .await?;
    ok_json(&ContactView::from(&contact))
}

pub async fn invite_contact(
    state: &AppState,
    headers: &HeaderMap,
    contact_id: &str,
) -> Result<Response<FullBody>> {
    let owner = owner(state, headers).await?;
    let issued = state.invitations.issue(&owner, contact_id).await?;
    Ok(json_response(StatusCode::CREATED, &issued))
}

pub async fn invitation_history(
    state: &AppState,
    headers: &HeaderMap,
    contact_id: &str,
) -> Result<Response<FullBody>> {
    let owner = owner(state, headers).await?;
    ok_json(&state.invitations.history(&owner, contact_id).await?)
}

// =============================================================================
// Release settings
// =============================================================================

pub async fn get_release_settings(state: &AppState, headers: &HeaderMap) -> Result<Response<FullBody>> {
    let owner = owner(state, headers).await?;
    ok_json(&state.release.get(&owner).await?)
}

pub async fn save_release_settings(
    state: &AppState,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Response<FullBody>> {
    let owner = owner(state, headers).await?;
    let update: ReleaseSettingsUpdate = parse_json(body)?;
    ok_json(&state.release.save(&owner, update).await?)
}

// =============================================================================
// Letters
// =============================================================================

pub async fn list_letters(state: &AppState, headers: &HeaderMap) -> Result<Response<FullBody>> {
    let owner = owner(state, headers).await?;
    let letters: Vec<OwnerLetterView> = state
        .letters
        .list_letters(&owner)
        .await?
        .iter()
        .map(OwnerLetterView::from)
        .collect();
    ok_json(&letters)
}

pub async fn create_letter(
    state: &AppState,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Response<FullBody>> {
    let owner = owner(state, headers).await?;
    let input: NewLetter = parse_json(body)?;
    let letter = state.letters.create_letter(&owner, input).await?;
    Ok(json_response(StatusCode::CREATED, &OwnerLetterView::from(&letter)))
}

// =============================================================================
// Profile records
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordView {
    id: String,
    kind: RecordKind,
    fields: serde_json::Value,
}

impl From<&ProfileRecordDoc> for RecordView {
    fn from(doc: &ProfileRecordDoc) -> Self {
        Self {
            id: doc.record_id.clone(),
            kind: doc.kind,
            fields: bson::Bson::Document(doc.fields.clone()).into_relaxed_extjson(),
        }
    }
}

fn fields_from(body: &Bytes) -> Result<bson::Document> {
    let value: serde_json::Value = parse_json(body)?;
    match bson::to_bson(&value)? {
        bson::Bson::Document(doc) => Ok(doc),
        _ => Err(HeirloomError::BadRequest("Expected a JSON object".into())),
    }
}

pub async fn get_profile(state: &AppState, headers: &HeaderMap, kind: &str) -> Result<Response<FullBody>> {
    let owner = owner(state, headers).await?;
    let kind: RecordKind = kind.parse()?;
    let record = state.profile.get_singleton(&owner, kind).await?;
    ok_json(&record.as_ref().map(RecordView::from))
}

pub async fn save_profile(
    state: &AppState,
    headers: &HeaderMap,
    kind: &str,
    body: &Bytes,
) -> Result<Response<FullBody>> {
    let owner = owner(state, headers).await?;
    let kind: RecordKind = kind.parse()?;
    if kind == RecordKind::Onboarding {
        return Err(HeirloomError::BadRequest(
            "Onboarding progress changes through /api/onboarding".into(),
        ));
    }
    let record = state.profile.save_singleton(&owner, kind, fields_from(body)?).await?;
    ok_json(&RecordView::from(&record))
}

pub async fn list_records(state: &AppState, headers: &HeaderMap, kind: &str) -> Result<Response<FullBody>> {
    let owner = owner(state, headers).await?;
    let kind: RecordKind = kind.parse()?;
    let records: Vec<RecordView> = state
        .profile
        .list(&owner, kind)
        .await?
        .iter()
        .map(RecordView::from)
        .collect();
    ok_json(&records)
}

pub async fn add_record(
    state: &AppState,
    headers: &HeaderMap,
    kind: &str,
    body: &Bytes,
) -> Result<Response<FullBody>> {
    let owner = owner(state, headers).await?;
    let kind: RecordKind = kind.parse()?;
    let record = state.profile.add_record(&owner, kind, fields_from(body)?).await?;
    Ok(json_response(StatusCode::CREATED, &RecordView::from(&record)))
}

// =============================================================================
// Onboarding
// =============================================================================

#[derive(Deserialize)]
struct OnboardingRequest {
    event: OnboardingEvent,
}

pub async fn get_onboarding(state: &AppState, headers: &HeaderMap) -> Result<Response<FullBody>> {
    let owner = owner(state, headers).await?;
    ok_json(&state.onboarding.current(&owner).await?)
}

pub async fn advance_onboarding(
    state: &AppState,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Response<FullBody>> {
    let owner = owner(state, headers).await?;
    let request: OnboardingRequest = parse_json(body)?;
    ok_json(&state.onboarding.advance(&owner, request.event).await?)
}
