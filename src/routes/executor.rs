//! Executor endpoints
//!
//! ## Endpoints
//!
//! - `POST /executor/login` - Google sign-in, sets the signed executor session
//! - `POST /executor/logout` - Clears them
//! - `POST /executor/invite/accept` - Accept an invitation as the signed-in Google account
//! - `GET /executor/accounts` - Accounts this executor can act on
//! - `GET /executor/accounts/{id}/data` - Released data for one account
//! - `POST /executor/accounts/{id}/unlock` - Release with the owner's unlock code
//!
//! Only the signed `executor_session` cookie authenticates. Account-scoped
//! requests re-check the executor's binding to that account on every call.

use bytes::Bytes;
use hyper::header::HeaderMap;
use hyper::Response;
use serde::{Deserialize, Serialize};

use super::{ok_json, parse_json, parse_query, with_cookies, FullBody};
use crate::auth::{
    Category, ExecutorIdentity, FederatedIdentity, RequestCredentials, EXECUTOR_EMAIL_COOKIE,
    EXECUTOR_GOOGLE_ID_COOKIE, EXECUTOR_SESSION_COOKIE,
};
use crate::server::AppState;
use crate::types::Result;

fn executor(state: &AppState, headers: &HeaderMap) -> Result<ExecutorIdentity> {
    state
        .resolver
        .executor(&RequestCredentials::from_headers(headers))
}

fn identity_cookies(state: &AppState, identity: &FederatedIdentity) -> Result<[String; 3]> {
    let max_age = state.args.executor_cookie_max_age();
    let session = state.resolver.issue_executor_session(
        &identity.email,
        &identity.subject,
        u64::try_from(max_age).unwrap_or_default(),
    )?;
    Ok([
        state.cookies.set(EXECUTOR_SESSION_COOKIE, &session, max_age),
        state.cookies.set(EXECUTOR_EMAIL_COOKIE, &identity.email, max_age),
        state
            .cookies
            .set(EXECUTOR_GOOGLE_ID_COOKIE, &identity.subject, max_age),
    ])
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest {
    id_token: String,
}

#[derive(Serialize)]
struct LoginResponse {
    email: String,
}

pub async fn login(state: &AppState, body: &Bytes) -> Result<Response<FullBody>> {
    let request: LoginRequest = parse_json(body)?;
    let identity = state.federated.verify(&request.id_token).await?;
    let cookies = identity_cookies(state, &identity)?;
    with_cookies(
        ok_json(&LoginResponse {
            email: identity.email,
        })?,
        cookies,
    )
}

pub async fn logout(state: &AppState) -> Result<Response<FullBody>> {
    with_cookies(
        ok_json(&serde_json::json!({ "loggedOut": true }))?,
        [
            state.cookies.clear(EXECUTOR_SESSION_COOKIE),
            state.cookies.clear(EXECUTOR_EMAIL_COOKIE),
            state.cookies.clear(EXECUTOR_GOOGLE_ID_COOKIE),
        ],
    )
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AcceptRequest {
    #[serde(default)]
    token: String,
    id_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AcceptResponse {
    account_user_id: String,
    status: &'static str,
}

/// The ID token is verified here rather than trusting an existing session,
/// so the acceptance binds a subject Google has just vouched for.
pub async fn accept_invitation(state: &AppState, body: &Bytes) -> Result<Response<FullBody>> {
    let request: AcceptRequest = parse_json(body)?;
    let identity = state.federated.verify(&request.id_token).await?;
    let account = state
        .provisioning
        .accept_invitation(&request.token, &identity)
        .await?;

    let cookies = identity_cookies(state, &identity)?;
    with_cookies(
        ok_json(&AcceptResponse {
            account_user_id: account.account_user_id,
            status: account.status.as_str(),
        })?,
        cookies,
    )
}

pub async fn list_accounts(state: &AppState, headers: &HeaderMap) -> Result<Response<FullBody>> {
    let executor = executor(state, headers)?;
    ok_json(
        &state
            .provisioning
            .list_accounts_for_executor(&executor.email)
            .await?,
    )
}

#[derive(Debug, Default, Deserialize)]
struct DataQuery {
    category: Option<String>,
}

pub async fn account_data(
    state: &AppState,
    headers: &HeaderMap,
    account_user_id: &str,
    query: Option<&str>,
) -> Result<Response<FullBody>> {
    let executor = executor(state, headers)?;
    let query: DataQuery = parse_query(query)?;
    let category = query
        .category
        .as_deref()
        .map(str::parse::<Category>)
        .transpose()?;

    let account = state
        .resolver
        .authorize_account(&executor, account_user_id)
        .await?;
    ok_json(&state.projection.project_executor_data(&account, category).await?)
}

#[derive(Deserialize)]
struct UnlockRequest {
    code: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UnlockResponse {
    release_activated: bool,
    release_activated_at: Option<chrono::DateTime<chrono::Utc>>,
}

pub async fn unlock(
    state: &AppState,
    headers: &HeaderMap,
    account_user_id: &str,
    body: &Bytes,
) -> Result<Response<FullBody>> {
    let executor = executor(state, headers)?;
    let request: UnlockRequest = parse_json(body)?;
    let account = state
        .resolver
        .authorize_account(&executor, account_user_id)
        .await?;

    let settings = state.release.unlock(&account, &request.code).await?;
    ok_json(&UnlockResponse {
        release_activated: settings.release_activated,
        release_activated_at: settings.release_activated_at.map(|d| d.to_chrono()),
    })
}
