//! Outbound email
//!
//! Invitations and scheduled letters go out through a [`Mailer`]. Every
//! caller treats sending as best-effort: a failure is logged and never
//! undoes the state change that triggered it.

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::db::schemas::LetterDoc;
use crate::types::{HeirloomError, Result};

/// A rendered message ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<()>;
}

/// Configuration for the HTTP email API
#[derive(Debug, Clone)]
pub struct MailerConfig {
    pub api_url: String,
    pub api_key: String,
    pub from: String,
    pub timeout: Duration,
}

/// Transactional email API client (JSON POST with a bearer key)
pub struct HttpMailer {
    client: Client,
    config: MailerConfig,
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

impl HttpMailer {
    pub fn new(config: MailerConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| HeirloomError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<()> {
        let request = SendRequest {
            from: &self.config.from,
            to: [email.to.as_str()],
            subject: &email.subject,
            html: &email.html,
            text: &email.text,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.config.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(HeirloomError::Upstream(format!(
                "Email API HTTP {}: {}",
                status, body
            )));
        }

        debug!(to = %email.to, "Email accepted by provider");
        Ok(())
    }
}

/// Dev-mode mailer that only logs
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<()> {
        info!(to = %email.to, subject = %email.subject, "Email (not sent, dev mode)\n{}", email.text);
        Ok(())
    }
}

// =============================================================================
// Templates
// =============================================================================

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn wrap_html(paragraphs: &[String], link: Option<(&str, &str)>) -> String {
    let mut html = String::from("<div style=\"font-family:Georgia,serif;line-height:1.5\">");
    for p in paragraphs {
        html.push_str(&format!("<p>{}</p>", escape_html(p).replace('\n', "<br>")));
    }
    if let Some((label, href)) = link {
        html.push_str(&format!(
            "<p><a href=\"{}\">{}</a></p>",
            escape_html(href),
            escape_html(label)
        ));
    }
    html.push_str("</div>");
    html
}

/// Invitation for a trusted contact to view shared information
pub fn viewer_invitation(to: &str, contact_name: &str, owner_name: &str, link: &str) -> OutboundEmail {
    let greeting = format!("Hello {},", contact_name);
    let body = format!(
        "{} has shared part of their end-of-life plan with you. \
         The link below signs you in and is valid for 7 days.",
        owner_name
    );
    OutboundEmail {
        to: to.to_string(),
        subject: format!("{} has shared their plan with you", owner_name),
        html: wrap_html(&[greeting.clone(), body.clone()], Some(("View shared information", link))),
        text: format!("{}\n\n{}\n\n{}\n", greeting, body, link),
    }
}

/// Invitation for the designated executor
pub fn executor_invitation(to: &str, contact_name: &str, owner_name: &str, link: &str) -> OutboundEmail {
    let greeting = format!("Hello {},", contact_name);
    let body = format!(
        "{} has named you as the executor of their plan. Sign in with the \
         Google account for this address to accept. You will only be able \
         to see their information once it has been released.",
        owner_name
    );
    OutboundEmail {
        to: to.to_string(),
        subject: format!("{} has named you as their executor", owner_name),
        html: wrap_html(&[greeting.clone(), body.clone()], Some(("Accept invitation", link))),
        text: format!("{}\n\n{}\n\n{}\n", greeting, body, link),
    }
}

/// A scheduled letter delivered on its date
pub fn scheduled_letter(to: &str, letter: &LetterDoc, owner_name: &str) -> OutboundEmail {
    let recipient = if letter.recipient_name.is_empty() {
        "you".to_string()
    } else {
        letter.recipient_name.clone()
    };
    let intro = format!("{} left this letter for {}.", owner_name, recipient);
    let subject = if letter.title.is_empty() {
        format!("A letter from {}", owner_name)
    } else {
        format!("{} (a letter from {})", letter.title, owner_name)
    };
    OutboundEmail {
        to: to.to_string(),
        subject,
        html: wrap_html(&[intro.clone(), letter.body.clone()], None),
        text: format!("{}\n\n{}\n", intro, letter.body),
    }
}
