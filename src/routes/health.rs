//! Health and identity probes
//!
//! - /health, /healthz - liveness
//! - /version - build info for deployment verification
//! - /api/whoami - which identity the request's credentials resolve to

use hyper::header::HeaderMap;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use super::{json_response, ok_json, FullBody};
use crate::auth::{Identity, RequestCredentials};
use crate::server::AppState;
use crate::types::Result;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    /// Uptime in seconds
    pub uptime: u64,
    /// "mongodb" or "memory"
    pub store: &'static str,
    pub mode: &'static str,
    pub timestamp: String,
}

pub fn health_check(state: Arc<AppState>) -> Response<FullBody> {
    json_response(
        StatusCode::OK,
        &HealthResponse {
            healthy: true,
            version: env!("CARGO_PKG_VERSION"),
            uptime: state.started_at.elapsed().as_secs(),
            store: state.store_kind,
            mode: if state.args.dev_mode { "development" } else { "production" },
            timestamp: chrono::Utc::now().to_rfc3339(),
        },
    )
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionResponse {
    pub version: &'static str,
    pub commit: &'static str,
    pub commit_full: &'static str,
    pub build_time: &'static str,
}

pub fn version_info() -> Response<FullBody> {
    json_response(
        StatusCode::OK,
        &VersionResponse {
            version: env!("CARGO_PKG_VERSION"),
            commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
            commit_full: option_env!("GIT_COMMIT_FULL").unwrap_or("unknown"),
            build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
        },
    )
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WhoAmI {
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
}

/// Viewer sessions travel in request bodies, so this only reports owners
/// and executors.
pub async fn whoami(state: Arc<AppState>, headers: &HeaderMap) -> Result<Response<FullBody>> {
    let identity = state
        .resolver
        .resolve(&RequestCredentials::from_headers(headers), None)
        .await?;

    let (user_id, email) = match &identity {
        Identity::Owner { user_id } => (Some(user_id.clone()), None),
        Identity::ExecutorSession { email, .. } => (None, Some(email.clone())),
        _ => (None, None),
    };
    ok_json(&WhoAmI {
        kind: identity.kind(),
        user_id,
        email,
    })
}
