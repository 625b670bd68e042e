//! Mail API client.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use eventhub_core::mailer::{Mailer, OutgoingEmail};
use eventhub_core::{Error, Result};

/// Sends mail with `POST {MAIL_API_URL}` and a JSON body of
/// `{from, to, subject, html}`.
pub struct HttpMailer {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    from: String,
}

impl HttpMailer {
    pub fn new(client: reqwest::Client, url: impl Into<String>, api_key: Option<String>, from: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            api_key,
            from: from.into(),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        let mut request = self
            .client
            .post(&self.url)
            .timeout(Duration::from_secs(15))
            .json(&json!({
                "from": self.from,
                "to": email.to,
                "subject": email.subject,
                "html": email.html,
            }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Mail(format!("mail request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(Error::Mail(format!("mail API returned {}", response.status())));
        }
        tracing::debug!(to = %email.to, subject = %email.subject, "Mail sent");
        Ok(())
    }
}
