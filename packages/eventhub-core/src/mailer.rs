//! # Outbound Mail
//!
//! The [`Mailer`] seam and the few transactional messages the core sends.
//! The HTTP delivery lives in the server; here there is only a logging
//! mailer and an in-memory one.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::{Error, Result};

/// A message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Delivers transactional e-mail.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<()>;
}

/// Writes messages to the log instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        tracing::info!(to = %email.to, subject = %email.subject, body = %email.html, "Mail (not sent, no mail API configured)");
        Ok(())
    }
}

/// Keeps every message in memory.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
    failing: Mutex<bool>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following send fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    /// Messages sent so far.
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().clone()
    }

    /// The first `token=` query value in the most recent message to `to`.
    pub fn last_token_for(&self, to: &str) -> Option<String> {
        let sent = self.sent.lock();
        let email = sent.iter().rev().find(|e| e.to == to)?;
        let start = email.html.find("token=")? + "token=".len();
        let token: String = email.html[start..]
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        Some(token)
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        if *self.failing.lock() {
            return Err(Error::Mail("mail provider unavailable".into()));
        }
        self.sent.lock().push(email);
        Ok(())
    }
}

/// Absolute links into the public API.
#[derive(Debug, Clone)]
pub struct Links {
    base: String,
}

impl Links {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
        }
    }

    /// `{base}{path}?token={token}`
    pub fn with_token(&self, path: &str, token: &str) -> String {
        format!("{}{}?token={}", self.base, path, token)
    }
}

pub(crate) fn host_claim_email(to: &str, event_title: &str, link: &str) -> OutgoingEmail {
    OutgoingEmail {
        to: to.to_string(),
        subject: format!("Confirm you host {}", event_title),
        html: format!(
            "<p>Someone asked to manage <strong>{}</strong> on EventHub as its host.</p>\
             <p><a href=\"{}\">Confirm</a> if this was you. Otherwise ignore this message.</p>",
            escape_html(event_title),
            link
        ),
    }
}

pub(crate) fn subscription_email(to: &str, verify_link: &str, unsubscribe_link: &str) -> OutgoingEmail {
    OutgoingEmail {
        to: to.to_string(),
        subject: "Confirm your EventHub subscription".to_string(),
        html: format!(
            "<p><a href=\"{}\">Confirm your subscription</a> to the EventHub newsletter.</p>\
             <p><a href=\"{}\">Unsubscribe</a></p>",
            verify_link, unsubscribe_link
        ),
    }
}

pub(crate) fn luma_link_email(to: &str, link: &str) -> OutgoingEmail {
    OutgoingEmail {
        to: to.to_string(),
        subject: "Link your Luma account".to_string(),
        html: format!(
            "<p><a href=\"{}\">Confirm</a> that this Luma address belongs to you.</p>",
            link
        ),
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_mailer_extracts_token() {
        let mailer = MemoryMailer::new();
        let links = Links::new("https://eventhub.example/");
        let link = links.with_token("/api/verify-host", "abc_DEF-123");
        mailer.send(host_claim_email("host@example.com", "<Rust> Lima", &link)).await.unwrap();

        assert_eq!(link, "https://eventhub.example/api/verify-host?token=abc_DEF-123");
        assert_eq!(mailer.last_token_for("host@example.com").as_deref(), Some("abc_DEF-123"));
        assert!(mailer.sent()[0].html.contains("&lt;Rust&gt; Lima"));
        assert!(mailer.last_token_for("nobody@example.com").is_none());
    }
}
