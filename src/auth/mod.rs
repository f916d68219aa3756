//! Authentication and authorization for Heirloom
//!
//! Provides:
//! - The closed set of data categories and per-contact permission evaluation
//! - Identity resolution for owners, viewers and executors
//! - Identity-provider JWT validation and federated (Google) login
//! - Session cookies, random tokens, and Argon2 secret hashing

pub mod category;
pub mod cookies;
pub mod federated;
pub mod identity;
pub mod jwt;
pub mod password;
pub mod permissions;
pub mod tokens;

pub use category::Category;
pub use cookies::{
    get_cookie, CookiePolicy, EXECUTOR_EMAIL_COOKIE, EXECUTOR_GOOGLE_ID_COOKIE,
    EXECUTOR_SESSION_COOKIE, OWNER_SESSION_COOKIE,
};
pub use federated::{FederatedIdentity, FederatedVerifier, GoogleTokenVerifier};
pub use identity::{
    DualSession, ExecutorIdentity, Identity, IdentityResolver, OwnerCapability,
    OwnerIdentitySource, RequestCredentials, ViewerContext, ViewerSessionPayload,
};
pub use jwt::{
    extract_token_from_header, ExecutorClaims, ExecutorSessionSigner, ProviderClaims,
    ProviderJwtValidator,
};
pub use password::{hash_secret, verify_secret};
pub use permissions::{evaluate, LegacyColumns, PermissionSet, PermissionSource};
pub use tokens::{generate_session_id, generate_url_token};
