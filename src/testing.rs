//! Shared fixtures for service tests

use async_trait::async_trait;
use http_body_util::BodyExt;
use hyper::Response;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::auth::{Category, PermissionSet};
use crate::routes::FullBody;
use crate::db::schemas::{ContactStatus, TrustedContactDoc};
use crate::services::mailer::{Mailer, OutboundEmail};
use crate::store::{ContactStore, MemoryStore};
use crate::types::{HeirloomError, Result};

/// Mailer that keeps every message it was asked to send
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutboundEmail>>,
    failing: AtomicBool,
    calls: AtomicU32,
}

impl RecordingMailer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every following send fail with an upstream error
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(HeirloomError::Upstream("mail provider down".into()));
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

/// Insert a contact for `owner` with the given status and grants
pub async fn contact(
    store: &MemoryStore,
    owner: &str,
    name: &str,
    email: Option<&str>,
    status: ContactStatus,
    grants: &[Category],
) -> TrustedContactDoc {
    let mut doc = TrustedContactDoc::new(owner, name, email.map(str::to_string), "friend", "viewer");
    doc.status = status;
    let set: PermissionSet = grants.iter().map(|c| (*c, true)).collect();
    doc.apply_permissions(&set);
    store.insert_contact(doc.clone()).await.unwrap();
    doc
}

/// Token carried by the link in an invitation email
pub fn token_from_link(email: &OutboundEmail) -> String {
    email
        .text
        .split("token=")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap_or_default()
        .to_string()
}

/// Decode a JSON response body
pub async fn body_json(response: Response<FullBody>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
