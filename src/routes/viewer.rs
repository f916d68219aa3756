//! Viewer endpoints
//!
//! - `POST /viewer/verify` - Redeem a login token, returns the viewer session
//! - `POST /viewer/data` - Shared data for the session's contact
//!
//! The viewer session lives in the browser and is sent back with each data
//! request. It is re-checked against the store every time.

use bytes::Bytes;
use hyper::Response;
use serde::Deserialize;

use super::{ok_json, parse_json, FullBody};
use crate::auth::{Category, ViewerSessionPayload};
use crate::server::AppState;
use crate::types::Result;

#[derive(Deserialize)]
struct VerifyRequest {
    #[serde(default)]
    token: String,
}

pub async fn verify(state: &AppState, body: &Bytes) -> Result<Response<FullBody>> {
    let request: VerifyRequest = parse_json(body)?;
    ok_json(&state.invitations.verify(&request.token).await?)
}

#[derive(Deserialize)]
struct DataRequest {
    session: ViewerSessionPayload,
    #[serde(default)]
    category: Option<String>,
}

pub async fn data(state: &AppState, body: &Bytes) -> Result<Response<FullBody>> {
    let request: DataRequest = parse_json(body)?;
    let category = request
        .category
        .as_deref()
        .map(str::parse::<Category>)
        .transpose()?;

    let viewer = state.resolver.viewer(&request.session).await?;
    ok_json(&state.projection.project_viewer_data(&viewer, category).await?)
}
