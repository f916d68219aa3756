//! Scheduled job endpoints
//!
//! `GET|POST /cron/check-scheduled-letters` is called daily by the
//! platform scheduler with `Authorization: Bearer <CRON_SECRET>`.
//! An optional `?date=YYYY-MM-DD` re-runs a past day.

use chrono::{NaiveDate, Utc};
use hyper::header::{HeaderMap, AUTHORIZATION};
use hyper::Response;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::warn;

use super::{ok_json, parse_query, FullBody};
use crate::auth::extract_token_from_header;
use crate::server::AppState;
use crate::types::{HeirloomError, Result};

/// Compare secrets by digest so the comparison time doesn't depend on
/// where the strings first differ.
fn secret_matches(presented: &str, expected: &str) -> bool {
    Sha256::digest(presented.as_bytes()) == Sha256::digest(expected.as_bytes())
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<()> {
    let expected = match state.args.cron_secret.as_deref() {
        Some(secret) if !secret.is_empty() => secret,
        _ if state.args.dev_mode => return Ok(()),
        _ => return Err(HeirloomError::Config("CRON_SECRET is not set".into())),
    };
    let auth_header = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    match extract_token_from_header(auth_header) {
        Some(presented) if secret_matches(presented, expected) => Ok(()),
        _ => {
            warn!("Rejected cron call with missing or wrong secret");
            Err(HeirloomError::AuthenticationRequired)
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct CronQuery {
    date: Option<NaiveDate>,
}

pub async fn check_scheduled_letters(
    state: &AppState,
    headers: &HeaderMap,
    query: Option<&str>,
) -> Result<Response<FullBody>> {
    authorize(state, headers)?;
    let query: CronQuery = parse_query(query)?;
    let today = query.date.unwrap_or_else(|| Utc::now().date_naive());
    ok_json(&state.letters.check_scheduled_letters(today).await?)
}
