//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. Each request body is
//! collected (bounded by [`MAX_BODY_BYTES`]) before [`dispatch`] routes it,
//! so handlers work on plain `HeaderMap` + `Bytes`.

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::header::{
    HeaderMap, HeaderValue, ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS,
    ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, VARY,
};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::auth::{CookiePolicy, FederatedVerifier, IdentityResolver};
use crate::config::Args;
use crate::routes::{self, cron, executor, health, owner, viewer, FullBody};
use crate::services::{
    ContactService, DataProjection, ExecutorProvisioning, LetterService, Mailer,
    OnboardingService, OwnerSessions, ProfileService, ReleaseService, ViewerInvitations,
};
use crate::store::Store;
use crate::types::{HeirloomError, Result};

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Largest request body accepted
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub store: Arc<dyn Store>,
    /// "mongodb" or "memory", reported by /health
    pub store_kind: &'static str,
    pub started_at: Instant,
    pub resolver: IdentityResolver,
    pub sessions: OwnerSessions,
    pub contacts: ContactService,
    pub profile: Arc<ProfileService>,
    pub onboarding: OnboardingService,
    pub invitations: ViewerInvitations,
    pub provisioning: Arc<ExecutorProvisioning>,
    pub release: ReleaseService,
    pub projection: DataProjection,
    pub letters: LetterService,
    /// Google ID token verification for executors
    pub federated: Arc<dyn FederatedVerifier>,
    pub cookies: CookiePolicy,
}

impl AppState {
    pub fn new(
        args: Args,
        store: Arc<dyn Store>,
        store_kind: &'static str,
        mailer: Arc<dyn Mailer>,
        federated: Arc<dyn FederatedVerifier>,
    ) -> Result<Self> {
        let validator = args.provider_validator()?;
        let profile = Arc::new(ProfileService::new(store.clone()));
        let provisioning = Arc::new(ExecutorProvisioning::new(
            store.clone(),
            mailer.clone(),
            args.app_base_url.clone(),
        ));

        Ok(Self {
            resolver: IdentityResolver::with_default_sources(
                store.clone(),
                validator.clone(),
                args.executor_session_signer()?,
            ),
            sessions: OwnerSessions::new(store.clone(), validator, args.owner_session_ttl()),
            contacts: ContactService::new(store.clone()),
            onboarding: OnboardingService::new(store.clone(), profile.clone()),
            invitations: ViewerInvitations::new(
                store.clone(),
                mailer.clone(),
                args.app_base_url.clone(),
                args.viewer_token_ttl(),
            ),
            release: ReleaseService::new(store.clone(), provisioning.clone()),
            projection: DataProjection::new(store.clone()),
            letters: LetterService::new(store.clone(), mailer),
            cookies: args.cookie_policy(),
            started_at: Instant::now(),
            profile,
            provisioning,
            federated,
            store,
            store_kind,
            args,
        })
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Heirloom listening on {} (store: {}, app: {})",
        state.args.listen, state.store_kind, state.args.app_base_url
    );

    if state.args.dev_mode {
        warn!("Development mode enabled - insecure cookies, email may only be logged");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Collect the request and hand it to [`dispatch`]
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<BoxBody>, hyper::Error> {
    let started = Instant::now();
    let (parts, body) = req.into_parts();
    let path = parts.uri.path().to_string();

    info!("[{}] {} {}", addr, parts.method, path);

    let response = match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => {
            dispatch(
                Arc::clone(&state),
                &parts.method,
                &path,
                parts.uri.query(),
                &parts.headers,
                collected.to_bytes(),
            )
            .await
        }
        Err(e) => {
            debug!("[{}] Rejected request body: {}", addr, e);
            with_cors(
                &state,
                routes::error_response(&HeirloomError::BadRequest(format!(
                    "Request body must be at most {} bytes",
                    MAX_BODY_BYTES
                ))),
            )
        }
    };

    debug!(
        "[{}] {} {} -> {} in {:?}",
        addr,
        parts.method,
        path,
        response.status(),
        started.elapsed()
    );
    Ok(to_boxed(response))
}

/// Route a collected request
pub async fn dispatch(
    state: Arc<AppState>,
    method: &Method,
    path: &str,
    query: Option<&str>,
    headers: &HeaderMap,
    body: Bytes,
) -> Response<FullBody> {
    let decoded: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| {
            urlencoding::decode(s)
                .map(|d| d.into_owned())
                .unwrap_or_else(|_| s.to_string())
        })
        .collect();
    let segments: Vec<&str> = decoded.iter().map(String::as_str).collect();
    let s = state.as_ref();

    let result = match (method.clone(), segments.as_slice()) {
        // CORS preflight
        (Method::OPTIONS, _) => Ok(preflight_response()),

        // Liveness and build info
        (Method::GET, ["health"]) | (Method::GET, ["healthz"]) => {
            Ok(health::health_check(Arc::clone(&state)))
        }
        (Method::GET, ["version"]) => Ok(health::version_info()),
        (Method::GET, ["api", "whoami"]) => health::whoami(Arc::clone(&state), headers).await,

        // ====================================================================
        // Owner
        // ====================================================================
        (Method::POST, ["api", "session"]) => owner::create_session(s, headers).await,
        (Method::DELETE, ["api", "session"]) => owner::delete_session(s, headers).await,

        (Method::GET, ["api", "contacts"]) => owner::list_contacts(s, headers).await,
        (Method::POST, ["api", "contacts"]) => owner::create_contact(s, headers, &body).await,
        (Method::DELETE, ["api", "contacts", id]) => owner::delete_contact(s, headers, id).await,
        (Method::PUT, ["api", "contacts", id, "permissions"]) => {
            owner::update_permissions(s, headers, id, &body).await
        }
        (Method::POST, ["api", "contacts", id, "invite"]) => {
            owner::invite_contact(s, headers, id).await
        }
        (Method::GET, ["api", "contacts", id, "invitations"]) => {
            owner::invitation_history(s, headers, id).await
        }

        (Method::GET, ["api", "release-settings"]) => owner::get_release_settings(s, headers).await,
        (Method::PUT, ["api", "release-settings"]) => {
            owner::save_release_settings(s, headers, &body).await
        }

        (Method::GET, ["api", "letters"]) => owner::list_letters(s, headers).await,
        (Method::POST, ["api", "letters"]) => owner::create_letter(s, headers, &body).await,

        (Method::GET, ["api", "profile", kind]) => owner::get_profile(s, headers, kind).await,
        (Method::PUT, ["api", "profile", kind]) => owner::save_profile(s, headers, kind, &body).await,
        (Method::GET, ["api", "records", kind]) => owner::list_records(s, headers, kind).await,
        (Method::POST, ["api", "records", kind]) => owner::add_record(s, headers, kind, &body).await,

        (Method::GET, ["api", "onboarding"]) => owner::get_onboarding(s, headers).await,
        (Method::POST, ["api", "onboarding"]) => owner::advance_onboarding(s, headers, &body).await,

        // ====================================================================
        // Viewer
        // ====================================================================
        (Method::POST, ["viewer", "verify"]) => viewer::verify(s, &body).await,
        (Method::POST, ["viewer", "data"]) => viewer::data(s, &body).await,

        // ====================================================================
        // Executor
        // ====================================================================
        (Method::POST, ["executor", "login"]) => executor::login(s, &body).await,
        (Method::POST, ["executor", "logout"]) => executor::logout(s).await,
        (Method::POST, ["executor", "invite", "accept"]) => {
            executor::accept_invitation(s, &body).await
        }
        (Method::GET, ["executor", "accounts"]) => executor::list_accounts(s, headers).await,
        (Method::GET, ["executor", "accounts", id, "data"]) => {
            executor::account_data(s, headers, id, query).await
        }
        (Method::POST, ["executor", "accounts", id, "unlock"]) => {
            executor::unlock(s, headers, id, &body).await
        }

        // ====================================================================
        // Scheduled jobs
        // ====================================================================
        (Method::GET, ["cron", "check-scheduled-letters"])
        | (Method::POST, ["cron", "check-scheduled-letters"]) => {
            cron::check_scheduled_letters(s, headers, query).await
        }

        _ => Err(HeirloomError::NotFound(format!("No route for {} {}", method, path))),
    };

    with_cors(s, routes::respond(result))
}

/// Allow the web app's origin, with credentials
fn with_cors(state: &AppState, mut response: Response<FullBody>) -> Response<FullBody> {
    let headers = response.headers_mut();
    match HeaderValue::from_str(state.args.cors_origin()) {
        Ok(origin) => {
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
            headers.insert(
                ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
            headers.insert(VARY, HeaderValue::from_static("Origin"));
        }
        Err(_) => warn!("APP_BASE_URL is not a valid origin header; CORS headers omitted"),
    }
    response
}

/// Convert a Full<Bytes> body to BoxBody
fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}

/// CORS preflight response
fn preflight_response() -> Response<FullBody> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::NO_CONTENT;
    let headers = response.headers_mut();
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Authorization, Content-Type"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("600"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{FederatedIdentity, ProviderJwtValidator};
    use crate::store::MemoryStore;
    use crate::testing::{body_json, token_from_link, RecordingMailer};
    use async_trait::async_trait;
    use clap::Parser;
    use hyper::header::{AUTHORIZATION, COOKIE, SET_COOKIE};
    use serde_json::json;

    const SECRET: &str = "test-secret-that-is-at-least-32-characters-long";

    /// Accepts `google:<subject>:<email>` tokens
    struct FakeGoogle;

    #[async_trait]
    impl FederatedVerifier for FakeGoogle {
        async fn verify(&self, id_token: &str) -> Result<FederatedIdentity> {
            let mut parts = id_token.splitn(3, ':');
            match (parts.next(), parts.next(), parts.next()) {
                (Some("google"), Some(subject), Some(email)) => Ok(FederatedIdentity {
                    subject: subject.to_string(),
                    email: email.to_lowercase(),
                }),
                _ => Err(HeirloomError::AuthenticationRequired),
            }
        }
    }

    struct Harness {
        state: Arc<AppState>,
        mailer: Arc<RecordingMailer>,
    }

    impl Harness {
        fn new() -> Self {
            let args = Args::parse_from([
                "heirloom",
                "--dev-mode",
                "--provider-jwt-secret",
                SECRET,
                "--cron-secret",
                "cron-secret",
                "--app-base-url",
                "https://app.example.com",
            ]);
            let mailer = RecordingMailer::new();
            let state = AppState::new(
                args,
                Arc::new(MemoryStore::new()),
                "memory",
                mailer.clone(),
                Arc::new(FakeGoogle),
            )
            .unwrap();
            Self {
                state: Arc::new(state),
                mailer,
            }
        }

        async fn call(
            &self,
            method: Method,
            path: &str,
            headers: &HeaderMap,
            body: serde_json::Value,
        ) -> (StatusCode, HeaderMap, serde_json::Value) {
            let (path, query) = match path.split_once('?') {
                Some((p, q)) => (p, Some(q)),
                None => (path, None),
            };
            let body = if body.is_null() {
                Bytes::new()
            } else {
                Bytes::from(body.to_string())
            };
            let response =
                dispatch(Arc::clone(&self.state), &method, path, query, headers, body).await;
            let status = response.status();
            let headers = response.headers().clone();
            let json = if status == StatusCode::NO_CONTENT {
                serde_json::Value::Null
            } else {
                body_json(response).await
            };
            (status, headers, json)
        }

        /// Headers carrying both owner sessions
        async fn owner_headers(&self, user_id: &str) -> HeaderMap {
            let token = ProviderJwtValidator::new(SECRET.into())
                .unwrap()
                .issue(user_id, None, 3600)
                .unwrap();
            let mut headers = HeaderMap::new();
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
            );

            let (status, set, _) = self
                .call(Method::POST, "/api/session", &headers, serde_json::Value::Null)
                .await;
            assert_eq!(status, StatusCode::CREATED);
            headers.insert(COOKIE, cookie_header(&set));
            headers
        }
    }

    /// Turn `Set-Cookie` lines into a `Cookie` header
    fn cookie_header(set: &HeaderMap) -> HeaderValue {
        let pairs: Vec<&str> = set
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split(';').next())
            .collect();
        HeaderValue::from_str(&pairs.join("; ")).unwrap()
    }

    #[tokio::test]
    async fn test_health_and_unknown_route() {
        let h = Harness::new();
        let (status, headers, body) = h
            .call(Method::GET, "/health", &HeaderMap::new(), serde_json::Value::Null)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["store"], "memory");
        assert_eq!(
            headers.get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "https://app.example.com"
        );

        let (status, _, body) = h
            .call(Method::GET, "/nope", &HeaderMap::new(), serde_json::Value::Null)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");

        let (status, headers, _) = h
            .call(Method::OPTIONS, "/api/contacts", &HeaderMap::new(), serde_json::Value::Null)
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(headers.get(ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(), "true");
    }

    #[tokio::test]
    async fn test_owner_routes_need_both_sessions() {
        let h = Harness::new();
        let full = h.owner_headers("owner-1").await;

        let mut bearer_only = full.clone();
        bearer_only.remove(COOKIE);
        let (status, _, _) = h
            .call(Method::GET, "/api/contacts", &bearer_only, serde_json::Value::Null)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _, body) = h
            .call(Method::GET, "/api/contacts", &full, serde_json::Value::Null)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn test_viewer_invitation_flow() {
        let h = Harness::new();
        let owner = h.owner_headers("owner-1").await;

        let (status, _, contact) = h
            .call(
                Method::POST,
                "/api/contacts",
                &owner,
                json!({
                    "name": "Ada",
                    "email": "ada@example.com",
                    "relationship": "sister",
                    "role": "viewer",
                    "permissions": { "letters": true }
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let contact_id = contact["id"].as_str().unwrap().to_string();

        let (status, _, issued) = h
            .call(
                Method::POST,
                &format!("/api/contacts/{}/invite", contact_id),
                &owner,
                serde_json::Value::Null,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(issued["emailSent"], true);

        let token = token_from_link(&h.mailer.sent()[0]);
        let (status, _, session) = h
            .call(Method::POST, "/viewer/verify", &HeaderMap::new(), json!({ "token": token }))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(session["contact"]["id"], contact_id.as_str());

        let (status, _, data) = h
            .call(
                Method::POST,
                "/viewer/data",
                &HeaderMap::new(),
                json!({ "session": session.clone() }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(data["permissions"]["letters"], true);

        let (status, _, _) = h
            .call(
                Method::POST,
                "/viewer/data",
                &HeaderMap::new(),
                json!({ "session": session, "category": "documents" }),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_executor_release_flow() {
        let h = Harness::new();
        let owner = h.owner_headers("owner-1").await;

        let (_, _, contact) = h
            .call(
                Method::POST,
                "/api/contacts",
                &owner,
                json!({
                    "name": "Eli",
                    "email": "Eli@Example.com",
                    "role": "executor",
                    "permissions": { "documents": true }
                }),
            )
            .await;
        let contact_id = contact["id"].as_str().unwrap().to_string();

        let (status, _, saved) = h
            .call(
                Method::PUT,
                "/api/release-settings",
                &owner,
                json!({
                    "isLocked": true,
                    "executorContactId": contact_id,
                    "unlockCode": "correct-horse"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(saved["executor"]["outcome"], "invited");
        assert_eq!(saved["settings"]["hasUnlockCode"], true);

        let token = token_from_link(&h.mailer.sent()[0]);

        // Wrong Google account
        let (status, _, _) = h
            .call(
                Method::POST,
                "/executor/invite/accept",
                &HeaderMap::new(),
                json!({ "token": token, "idToken": "google:g-2:mallory@example.com" }),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, set, accepted) = h
            .call(
                Method::POST,
                "/executor/invite/accept",
                &HeaderMap::new(),
                json!({ "token": token, "idToken": "google:g-1:eli@example.com" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(accepted["status"], "accepted");

        let mut executor = HeaderMap::new();
        executor.insert(COOKIE, cookie_header(&set));

        let (status, _, accounts) = h
            .call(Method::GET, "/executor/accounts", &executor, serde_json::Value::Null)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(accounts.as_array().unwrap().len(), 1);

        let (status, _, before) = h
            .call(
                Method::GET,
                "/executor/accounts/owner-1/data",
                &executor,
                serde_json::Value::Null,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(before["released"], false);

        let (status, _, _) = h
            .call(
                Method::POST,
                "/executor/accounts/owner-1/unlock",
                &executor,
                json!({ "code": "wrong-code" }),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _, unlocked) = h
            .call(
                Method::POST,
                "/executor/accounts/owner-1/unlock",
                &executor,
                json!({ "code": "correct-horse" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(unlocked["releaseActivated"], true);

        let (status, _, after) = h
            .call(
                Method::GET,
                "/executor/accounts/owner-1/data?category=documents",
                &executor,
                serde_json::Value::Null,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(after["released"], true);

        // Another owner's account is out of reach
        let (status, _, _) = h
            .call(
                Method::GET,
                "/executor/accounts/owner-2/data",
                &executor,
                serde_json::Value::Null,
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_forged_executor_cookies_rejected() {
        let h = Harness::new();
        let owner = h.owner_headers("owner-1").await;
        let (_, _, contact) = h
            .call(
                Method::POST,
                "/api/contacts",
                &owner,
                json!({ "name": "Eli", "email": "eli@example.com", "role": "executor" }),
            )
            .await;
        let contact_id = contact["id"].as_str().unwrap().to_string();
        let (status, _, _) = h
            .call(
                Method::PUT,
                "/api/release-settings",
                &owner,
                json!({
                    "isLocked": true,
                    "executorContactId": contact_id,
                    "unlockCode": "correct-horse"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        // Hand-written cookies naming a pending executor
        let mut forged = HeaderMap::new();
        forged.insert(
            COOKIE,
            HeaderValue::from_static("executor_email=eli%40example.com; executor_google_id=attacker"),
        );
        let (status, _, _) = h
            .call(Method::GET, "/executor/accounts", &forged, serde_json::Value::Null)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _, _) = h
            .call(
                Method::GET,
                "/executor/accounts/owner-1/data",
                &forged,
                serde_json::Value::Null,
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _, _) = h
            .call(
                Method::POST,
                "/executor/accounts/owner-1/unlock",
                &forged,
                json!({ "code": "correct-horse" }),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        // A junk session cookie alongside them changes nothing
        forged.insert(
            COOKIE,
            HeaderValue::from_static(
                "executor_session=not.a.jwt; executor_email=eli%40example.com; executor_google_id=attacker",
            ),
        );
        let (status, _, _) = h
            .call(Method::GET, "/executor/accounts", &forged, serde_json::Value::Null)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        // Signing in with Google yields a session the same route accepts
        let (status, set, _) = h
            .call(
                Method::POST,
                "/executor/login",
                &HeaderMap::new(),
                json!({ "idToken": "google:g-1:eli@example.com" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let mut signed = HeaderMap::new();
        signed.insert(COOKIE, cookie_header(&set));
        let (status, _, accounts) = h
            .call(Method::GET, "/executor/accounts", &signed, serde_json::Value::Null)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(accounts.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cron_requires_secret() {
        let h = Harness::new();
        let (status, _, _) = h
            .call(
                Method::POST,
                "/cron/check-scheduled-letters",
                &HeaderMap::new(),
                serde_json::Value::Null,
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer cron-secret"));
        let (status, _, report) = h
            .call(
                Method::GET,
                "/cron/check-scheduled-letters?date=2030-01-01",
                &headers,
                serde_json::Value::Null,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["date"], "2030-01-01");
        assert_eq!(report["sent"], 0);
    }
}
