//! Identity resolution
//!
//! Maps request credentials to one of three actor kinds:
//!
//! - **Owner**: two independent sessions must agree. The server-side
//!   cookie session and the identity provider's access token are separate
//!   [`OwnerIdentitySource`]s combined by [`DualSession`], which is the only
//!   way to obtain an [`OwnerCapability`].
//! - **Viewer**: the client re-sends the session payload it received at
//!   token verification. Nothing in it is trusted; the contact is reloaded
//!   and its permissions re-derived on every request.
//! - **Executor**: a signed session token issued after Google sign-in
//!   names the executor, and each account-scoped request is checked
//!   against that owner's `ExecutorAccount` row. The plain email and
//!   subject cookies are never accepted on their own.
//!
//! Identity is never partially resolved: every path either yields a full
//! identity or an `AuthenticationRequired`/`AuthorizationDenied` error.

use async_trait::async_trait;
use chrono::Utc;
use hyper::header::{HeaderMap, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::auth::cookies::{
    get_cookie, EXECUTOR_EMAIL_COOKIE, EXECUTOR_GOOGLE_ID_COOKIE, EXECUTOR_SESSION_COOKIE,
    OWNER_SESSION_COOKIE,
};
use crate::auth::jwt::{extract_token_from_header, ExecutorSessionSigner, ProviderJwtValidator};
use crate::auth::PermissionSet;
use crate::db::schemas::{ContactStatus, ExecutorAccountDoc, TrustedContactDoc};
use crate::store::Store;
use crate::types::{HeirloomError, Result};

// =============================================================================
// Credentials
// =============================================================================

/// Raw credentials carried by a request
#[derive(Debug, Clone, Default)]
pub struct RequestCredentials {
    pub session_id: Option<String>,
    pub provider_token: Option<String>,
    pub executor_email: Option<String>,
    pub executor_google_id: Option<String>,
    pub executor_session: Option<String>,
}

impl RequestCredentials {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let auth_header = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
        Self {
            session_id: get_cookie(headers, OWNER_SESSION_COOKIE),
            provider_token: extract_token_from_header(auth_header).map(str::to_string),
            executor_email: get_cookie(headers, EXECUTOR_EMAIL_COOKIE),
            executor_google_id: get_cookie(headers, EXECUTOR_GOOGLE_ID_COOKIE),
            executor_session: get_cookie(headers, EXECUTOR_SESSION_COOKIE),
        }
    }
}

/// Contact block of the viewer session payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerSessionContact {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub relationship: String,
    pub owner_id: String,
}

/// Client-held viewer session, as returned by token verification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerSessionPayload {
    pub contact: ViewerSessionContact,
    /// Display hint only; never consulted for authorization
    #[serde(default)]
    pub permissions: BTreeMap<String, bool>,
    pub token_id: String,
}

impl ViewerSessionPayload {
    pub fn new(contact: &TrustedContactDoc, permissions: &PermissionSet, token_id: &str) -> Self {
        Self {
            contact: ViewerSessionContact {
                id: contact.contact_id.clone(),
                name: contact.name.clone(),
                email: contact.email.clone(),
                role: contact.role.clone(),
                relationship: contact.relationship.clone(),
                owner_id: contact.user_id.clone(),
            },
            permissions: permissions.to_key_map(),
            token_id: token_id.to_string(),
        }
    }
}

// =============================================================================
// Resolved identities
// =============================================================================

/// The actor behind a request
#[derive(Debug, Clone)]
pub enum Identity {
    Owner {
        user_id: String,
    },
    ViewerSession {
        contact_id: String,
        owner_id: String,
        permissions: PermissionSet,
    },
    ExecutorSession {
        email: String,
        google_id: String,
    },
    Unauthenticated,
}

impl Identity {
    pub fn kind(&self) -> &'static str {
        match self {
            Identity::Owner { .. } => "owner",
            Identity::ViewerSession { .. } => "viewer",
            Identity::ExecutorSession { .. } => "executor",
            Identity::Unauthenticated => "unauthenticated",
        }
    }
}

/// Proof that both owner sessions resolved to the same account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerCapability {
    user_id: String,
}

impl OwnerCapability {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    #[cfg(test)]
    pub(crate) fn for_tests(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
        }
    }
}

/// A viewer whose contact record was re-checked for this request
#[derive(Debug, Clone)]
pub struct ViewerContext {
    pub contact: TrustedContactDoc,
    pub permissions: PermissionSet,
}

impl ViewerContext {
    pub fn owner_id(&self) -> &str {
        &self.contact.user_id
    }
}

/// Executor named by a verified session token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorIdentity {
    pub email: String,
    pub google_id: String,
}

// =============================================================================
// Owner identity sources
// =============================================================================

/// One independent way of proving who the owner is
#[async_trait]
pub trait OwnerIdentitySource: Send + Sync {
    fn name(&self) -> &'static str;

    /// The owner's user id, or `None` if this source has no valid credential
    async fn resolve(&self, credentials: &RequestCredentials) -> Result<Option<String>>;
}

/// Server-side session row referenced by the session cookie
pub struct CookieSessionSource {
    store: Arc<dyn Store>,
}

impl CookieSessionSource {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl OwnerIdentitySource for CookieSessionSource {
    fn name(&self) -> &'static str {
        "cookie_session"
    }

    async fn resolve(&self, credentials: &RequestCredentials) -> Result<Option<String>> {
        let Some(session_id) = credentials.session_id.as_deref() else {
            return Ok(None);
        };
        let session = self.store.find_session(session_id).await?;
        Ok(session
            .filter(|s| s.is_valid(Utc::now()))
            .map(|s| s.user_id))
    }
}

/// Identity provider access token from the Authorization header
pub struct ProviderSessionSource {
    validator: ProviderJwtValidator,
}

impl ProviderSessionSource {
    pub fn new(validator: ProviderJwtValidator) -> Self {
        Self { validator }
    }
}

#[async_trait]
impl OwnerIdentitySource for ProviderSessionSource {
    fn name(&self) -> &'static str {
        "provider_session"
    }

    async fn resolve(&self, credentials: &RequestCredentials) -> Result<Option<String>> {
        let Some(token) = credentials.provider_token.as_deref() else {
            return Ok(None);
        };
        let result = self.validator.verify_token(token);
        if !result.valid {
            debug!("Provider token rejected: {:?}", result.error);
        }
        Ok(result.claims.filter(|_| result.valid).map(|c| c.sub))
    }
}

/// AND of two owner identity sources.
///
/// Both must resolve, and to the same user id.
pub struct DualSession {
    first: Box<dyn OwnerIdentitySource>,
    second: Box<dyn OwnerIdentitySource>,
}

impl DualSession {
    pub fn new(first: Box<dyn OwnerIdentitySource>, second: Box<dyn OwnerIdentitySource>) -> Self {
        Self { first, second }
    }

    pub async fn authenticate(&self, credentials: &RequestCredentials) -> Result<OwnerCapability> {
        let (first, second) = futures::join!(
            self.first.resolve(credentials),
            self.second.resolve(credentials)
        );

        match (first?, second?) {
            (Some(a), Some(b)) if a == b => Ok(OwnerCapability { user_id: a }),
            (Some(a), Some(b)) => {
                warn!(
                    "Owner sessions disagree: {}={} {}={}",
                    self.first.name(),
                    a,
                    self.second.name(),
                    b
                );
                Err(HeirloomError::AuthenticationRequired)
            }
            (a, b) => {
                debug!(
                    "Owner not authenticated ({}: {}, {}: {})",
                    self.first.name(),
                    a.is_some(),
                    self.second.name(),
                    b.is_some()
                );
                Err(HeirloomError::AuthenticationRequired)
            }
        }
    }
}

// =============================================================================
// Resolver
// =============================================================================

pub struct IdentityResolver {
    owner: DualSession,
    executor_sessions: ExecutorSessionSigner,
    store: Arc<dyn Store>,
}

impl IdentityResolver {
    pub fn new(
        owner: DualSession,
        executor_sessions: ExecutorSessionSigner,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            owner,
            executor_sessions,
            store,
        }
    }

    /// Cookie session AND provider token for owners
    pub fn with_default_sources(
        store: Arc<dyn Store>,
        validator: ProviderJwtValidator,
        executor_sessions: ExecutorSessionSigner,
    ) -> Self {
        let owner = DualSession::new(
            Box::new(CookieSessionSource::new(store.clone())),
            Box::new(ProviderSessionSource::new(validator)),
        );
        Self::new(owner, executor_sessions, store)
    }

    /// Require a fully authenticated owner
    pub async fn owner(&self, credentials: &RequestCredentials) -> Result<OwnerCapability> {
        self.owner.authenticate(credentials).await
    }

    /// Re-verify a client-held viewer session against the stored contact
    pub async fn viewer(&self, session: &ViewerSessionPayload) -> Result<ViewerContext> {
        let contact = self
            .store
            .find_contact(&session.contact.id)
            .await?
            .ok_or(HeirloomError::AuthenticationRequired)?;

        if !contact.is_owned_by(&session.contact.owner_id) {
            warn!(
                "Viewer session for contact {} claims wrong owner",
                contact.contact_id
            );
            return Err(HeirloomError::AuthenticationRequired);
        }
        if contact.status != ContactStatus::Accepted {
            return Err(HeirloomError::AuthenticationRequired);
        }

        let permissions = contact.permission_set();
        Ok(ViewerContext {
            contact,
            permissions,
        })
    }

    /// Executor named by the signed session cookie.
    ///
    /// The plain email and subject cookies, when sent, must agree with it.
    pub fn executor(&self, credentials: &RequestCredentials) -> Result<ExecutorIdentity> {
        let claims = credentials
            .executor_session
            .as_deref()
            .and_then(|token| self.executor_sessions.verify(token))
            .ok_or(HeirloomError::AuthenticationRequired)?;
        let email = claims.email.trim().to_lowercase();

        let email_differs = credentials
            .executor_email
            .as_deref()
            .is_some_and(|e| e.trim().to_lowercase() != email);
        let subject_differs = credentials
            .executor_google_id
            .as_deref()
            .is_some_and(|g| g != claims.sub);
        if email_differs || subject_differs {
            warn!("Executor cookies disagree with the session for {}", email);
            return Err(HeirloomError::AuthenticationRequired);
        }

        Ok(ExecutorIdentity {
            email,
            google_id: claims.sub,
        })
    }

    /// Sign a session for an executor Google has just vouched for
    pub fn issue_executor_session(
        &self,
        email: &str,
        google_id: &str,
        ttl_seconds: u64,
    ) -> Result<String> {
        self.executor_sessions.issue(google_id, email, ttl_seconds)
    }

    /// Per-account executor check.
    ///
    /// Requires an ExecutorAccount linking this email to `account_user_id`.
    /// Once acceptance recorded a federated subject, the cookie's subject
    /// must match it.
    pub async fn authorize_account(
        &self,
        executor: &ExecutorIdentity,
        account_user_id: &str,
    ) -> Result<ExecutorAccountDoc> {
        let account = self
            .store
            .find_executor_account(&executor.email, account_user_id)
            .await?
            .ok_or_else(|| {
                HeirloomError::AuthorizationDenied("Not an executor for this account".into())
            })?;

        if let Some(bound) = account.executor_google_id.as_deref() {
            if bound != executor.google_id {
                warn!(
                    "Executor {} presented a different federated subject for {}",
                    executor.email, account_user_id
                );
                return Err(HeirloomError::AuthorizationDenied(
                    "Not an executor for this account".into(),
                ));
            }
        }

        Ok(account)
    }

    /// Tagged resolution for callers that accept any actor.
    ///
    /// Owner credentials win, then the viewer payload, then the executor session.
    pub async fn resolve(
        &self,
        credentials: &RequestCredentials,
        viewer_session: Option<&ViewerSessionPayload>,
    ) -> Result<Identity> {
        match self.owner(credentials).await {
            Ok(owner) => {
                return Ok(Identity::Owner {
                    user_id: owner.user_id,
                })
            }
            Err(HeirloomError::AuthenticationRequired) => {}
            Err(e) => return Err(e),
        }

        if let Some(session) = viewer_session {
            match self.viewer(session).await {
                Ok(viewer) => {
                    return Ok(Identity::ViewerSession {
                        contact_id: viewer.contact.contact_id,
                        owner_id: viewer.contact.user_id,
                        permissions: viewer.permissions,
                    })
                }
                Err(HeirloomError::AuthenticationRequired) => {}
                Err(e) => return Err(e),
            }
        }

        if let Ok(executor) = self.executor(credentials) {
            return Ok(Identity::ExecutorSession {
                email: executor.email,
                google_id: executor.google_id,
            });
        }

        Ok(Identity::Unauthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Category;
    use crate::db::schemas::{ExecutorAccountDoc, OwnerSessionDoc};
    use crate::store::{ContactStore, ExecutorStore, MemoryStore, OwnerSessionStore};
    use chrono::Duration;

    const SECRET: &str = "test-secret-that-is-at-least-32-characters-long";

    fn validator() -> ProviderJwtValidator {
        ProviderJwtValidator::new(SECRET.into()).unwrap()
    }

    fn signer() -> ExecutorSessionSigner {
        ExecutorSessionSigner::new("executor-secret-that-is-at-least-32-characters".into())
            .unwrap()
    }

    fn resolver(store: Arc<MemoryStore>) -> IdentityResolver {
        IdentityResolver::with_default_sources(store, validator(), signer())
    }

    fn executor_creds(email: &str, google_id: &str) -> RequestCredentials {
        RequestCredentials {
            executor_email: Some(email.into()),
            executor_google_id: Some(google_id.into()),
            executor_session: Some(signer().issue(google_id, email, 3600).unwrap()),
            ..Default::default()
        }
    }

    async fn resolver_with_session(user_id: &str, ttl: Duration) -> (IdentityResolver, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_session(OwnerSessionDoc::new("sid-1", user_id, ttl))
            .await
            .unwrap();
        let resolver = resolver(store.clone());
        (resolver, store)
    }

    fn creds(session: Option<&str>, token_sub: Option<&str>) -> RequestCredentials {
        RequestCredentials {
            session_id: session.map(str::to_string),
            provider_token: token_sub.map(|sub| validator().issue(sub, None, 3600).unwrap()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_owner_requires_both_sessions() {
        let (resolver, _) = resolver_with_session("owner-1", Duration::hours(24)).await;

        let ok = resolver.owner(&creds(Some("sid-1"), Some("owner-1"))).await.unwrap();
        assert_eq!(ok.user_id(), "owner-1");

        for partial in [creds(Some("sid-1"), None), creds(None, Some("owner-1"))] {
            let err = resolver.owner(&partial).await.unwrap_err();
            assert!(matches!(err, HeirloomError::AuthenticationRequired));
        }
    }

    #[tokio::test]
    async fn test_owner_sessions_must_agree() {
        let (resolver, _) = resolver_with_session("owner-1", Duration::hours(24)).await;
        let err = resolver
            .owner(&creds(Some("sid-1"), Some("owner-2")))
            .await
            .unwrap_err();
        assert!(matches!(err, HeirloomError::AuthenticationRequired));
    }

    #[tokio::test]
    async fn test_expired_cookie_session_rejected() {
        let (resolver, _) = resolver_with_session("owner-1", Duration::seconds(-1)).await;
        let err = resolver
            .owner(&creds(Some("sid-1"), Some("owner-1")))
            .await
            .unwrap_err();
        assert!(matches!(err, HeirloomError::AuthenticationRequired));
    }

    #[tokio::test]
    async fn test_viewer_permissions_come_from_store() {
        let store = Arc::new(MemoryStore::new());
        let mut contact = TrustedContactDoc::new("owner-1", "Ada", None, "sister", "viewer");
        contact.status = ContactStatus::Accepted;
        contact.can_view_letters = true;
        store.insert_contact(contact.clone()).await.unwrap();
        let resolver = resolver(store.clone());

        // Client claims everything; only letters are actually granted
        let everything: PermissionSet = Category::ALL.into_iter().map(|c| (c, true)).collect();
        let payload = ViewerSessionPayload::new(&contact, &everything, "tok-1");

        let viewer = resolver.viewer(&payload).await.unwrap();
        assert!(viewer.permissions.allows(Category::Letters));
        assert!(!viewer.permissions.allows(Category::Documents));
    }

    #[tokio::test]
    async fn test_viewer_rejected_unless_accepted_and_owned() {
        let store = Arc::new(MemoryStore::new());
        let contact = TrustedContactDoc::new("owner-1", "Ada", None, "sister", "viewer");
        store.insert_contact(contact.clone()).await.unwrap();
        let resolver = resolver(store.clone());

        let payload = ViewerSessionPayload::new(&contact, &PermissionSet::deny_all(), "t");
        assert!(resolver.viewer(&payload).await.is_err());

        store
            .promote_contact_status(&contact.contact_id, ContactStatus::Accepted)
            .await
            .unwrap();
        assert!(resolver.viewer(&payload).await.is_ok());

        let mut forged = payload.clone();
        forged.contact.owner_id = "owner-2".into();
        assert!(resolver.viewer(&forged).await.is_err());

        store.delete_contact(&contact.contact_id).await.unwrap();
        assert!(resolver.viewer(&payload).await.is_err());
    }

    #[tokio::test]
    async fn test_executor_scoped_per_account() {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_pending_executor(ExecutorAccountDoc::pending("a@x.com", "owner-1", "c-1", "t1"))
            .await
            .unwrap();
        let resolver = resolver(store.clone());

        let executor = resolver.executor(&executor_creds("A@x.com", "g-1")).unwrap();
        assert_eq!(executor.email, "a@x.com");

        assert!(resolver.authorize_account(&executor, "owner-1").await.is_ok());
        let err = resolver
            .authorize_account(&executor, "owner-2")
            .await
            .unwrap_err();
        assert!(matches!(err, HeirloomError::AuthorizationDenied(_)));
    }

    #[tokio::test]
    async fn test_executor_subject_must_match_after_acceptance() {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_pending_executor(ExecutorAccountDoc::pending("a@x.com", "owner-1", "c-1", "t1"))
            .await
            .unwrap();
        store.accept_executor("t1", "g-1", Utc::now()).await.unwrap();
        let resolver = resolver(store.clone());

        let impostor = ExecutorIdentity {
            email: "a@x.com".into(),
            google_id: "g-2".into(),
        };
        assert!(resolver.authorize_account(&impostor, "owner-1").await.is_err());
    }

    #[tokio::test]
    async fn test_resolve_tags_each_actor() {
        let (resolver, _) = resolver_with_session("owner-1", Duration::hours(24)).await;

        let owner = resolver
            .resolve(&creds(Some("sid-1"), Some("owner-1")), None)
            .await
            .unwrap();
        assert_eq!(owner.kind(), "owner");

        let executor = resolver
            .resolve(&executor_creds("a@x.com", "g"), None)
            .await
            .unwrap();
        assert_eq!(executor.kind(), "executor");

        let nobody = resolver
            .resolve(&RequestCredentials::default(), None)
            .await
            .unwrap();
        assert!(matches!(nobody, Identity::Unauthenticated));
    }

    #[tokio::test]
    async fn test_executor_cookies_alone_are_not_a_credential() {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_pending_executor(ExecutorAccountDoc::pending("a@x.com", "owner-1", "c-1", "t1"))
            .await
            .unwrap();
        let resolver = resolver(store.clone());

        let unsigned = RequestCredentials {
            executor_email: Some("a@x.com".into()),
            executor_google_id: Some("anything".into()),
            ..Default::default()
        };
        assert!(matches!(
            resolver.executor(&unsigned).unwrap_err(),
            HeirloomError::AuthenticationRequired
        ));
        let tagged = resolver.resolve(&unsigned, None).await.unwrap();
        assert!(matches!(tagged, Identity::Unauthenticated));

        let foreign_key = RequestCredentials {
            executor_session: Some(
                ExecutorSessionSigner::new_dev()
                    .issue("g-1", "a@x.com", 3600)
                    .unwrap(),
            ),
            ..Default::default()
        };
        assert!(resolver.executor(&foreign_key).is_err());

        // A valid session for someone else does not vouch for the email cookie
        let mut swapped = executor_creds("b@x.com", "g-9");
        swapped.executor_email = Some("a@x.com".into());
        assert!(resolver.executor(&swapped).is_err());
    }

    #[test]
    fn test_credentials_from_headers() {
        let token = validator().issue("owner-1", None, 60).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            hyper::header::COOKIE,
            format!("{}=sid-9", OWNER_SESSION_COOKIE).parse().unwrap(),
        );
        headers.insert(AUTHORIZATION, format!("Bearer {}", token).parse().unwrap());

        let creds = RequestCredentials::from_headers(&headers);
        assert_eq!(creds.session_id.as_deref(), Some("sid-9"));
        assert_eq!(creds.provider_token.as_deref(), Some(token.as_str()));
        assert!(creds.executor_email.is_none());
    }
}
