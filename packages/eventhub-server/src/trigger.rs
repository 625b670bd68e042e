//! Task-system client for generation jobs.
//!
//! `POST {TRIGGER_API_URL}/api/v1/tasks/{task}/trigger` with a bearer secret;
//! the response carries the run id, stored as the record's job handle.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use eventhub_core::generation::{GenerationJob, GenerationKind, JobQueue};
use eventhub_core::{Error, Result};

#[derive(Debug, Deserialize)]
struct TriggerResponse {
    id: String,
}

/// [`JobQueue`] backed by the task system's HTTP API.
pub struct TriggerQueue {
    client: reqwest::Client,
    base_url: String,
    secret_key: Option<String>,
    badge_task: String,
    gift_task: String,
}

impl TriggerQueue {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        secret_key: Option<String>,
        badge_task: impl Into<String>,
        gift_task: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key,
            badge_task: badge_task.into(),
            gift_task: gift_task.into(),
        }
    }

    fn task_for(&self, kind: GenerationKind) -> &str {
        match kind {
            GenerationKind::Badge => &self.badge_task,
            GenerationKind::GiftCard => &self.gift_task,
        }
    }

    fn trigger_url(&self, kind: GenerationKind) -> String {
        format!(
            "{}/api/v1/tasks/{}/trigger",
            self.base_url,
            urlencoding::encode(self.task_for(kind))
        )
    }
}

#[async_trait]
impl JobQueue for TriggerQueue {
    async fn enqueue(&self, job: &GenerationJob) -> Result<String> {
        let mut payload = job.payload.clone();
        if let Some(obj) = payload.as_object_mut() {
            obj.insert("kind".into(), json!(job.kind));
            obj.insert("token".into(), json!(job.token));
        }

        let mut request = self
            .client
            .post(self.trigger_url(job.kind))
            .timeout(Duration::from_secs(15))
            .json(&json!({ "payload": payload }));
        if let Some(secret) = &self.secret_key {
            request = request.bearer_auth(secret);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Queue(format!("trigger request failed: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Queue(format!("trigger returned {}", status)));
        }
        let body: TriggerResponse = response
            .json()
            .await
            .map_err(|e| Error::Queue(format!("unreadable trigger response: {}", e)))?;
        Ok(body.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_url() {
        let queue = TriggerQueue::new(
            reqwest::Client::new(),
            "https://tasks.example.com/",
            None,
            "generate-badge",
            "gift card",
        );
        assert_eq!(
            queue.trigger_url(GenerationKind::Badge),
            "https://tasks.example.com/api/v1/tasks/generate-badge/trigger"
        );
        assert_eq!(
            queue.trigger_url(GenerationKind::GiftCard),
            "https://tasks.example.com/api/v1/tasks/gift%20card/trigger"
        );
    }
}
