//! # Luma Import
//!
//! Turns Luma webhooks into imported events and links user accounts to
//! their Luma e-mail.
//!
//! ## Webhook Handling
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  type              action                                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  event.created  ┐  upsert by external_id = data.api_id                  │
//! │  event.updated  ┘  sync host rows from data.hosts                       │
//! │                    run host resolution                                  │
//! │  event.canceled    ignored                                              │
//! │  anything else     ignored                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! New imports start `pending` and orphaned; updates never touch approval or
//! the owning organization.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::events::{ApprovalState, EventFormat, EventSource, EventType};
use crate::hosts::{HostResolver, Resolution};
use crate::identity::CurrentUser;
use crate::ids::{generate_id, generate_token};
use crate::mailer::{luma_link_email, Links, Mailer};
use crate::storage::{Database, EventRecord, NewHost, UserRecord};
use crate::subscriptions::normalize_email;

/// Imported events without an end time are assumed to last this long.
const DEFAULT_DURATION_SECS: i64 = 3 * 3600;

/// A webhook body: a required type and an optional payload.
#[derive(Debug, Clone, Deserialize)]
pub struct LumaWebhook {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// The event fields read from `data`.
#[derive(Debug, Clone, Deserialize)]
pub struct LumaEventData {
    pub api_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start_at: String,
    #[serde(default)]
    pub end_at: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub meeting_url: Option<String>,
    #[serde(default)]
    pub geo_address_json: Option<LumaAddress>,
    #[serde(default)]
    pub hosts: Vec<NewHost>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LumaAddress {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub full_address: Option<String>,
}

/// What a webhook did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum WebhookOutcome {
    #[serde(rename_all = "camelCase")]
    Imported { event_id: String, created: bool, matched: bool },
    Ignored,
}

/// Applies Luma webhooks.
#[derive(Clone)]
pub struct LumaSync {
    db: Database,
    resolver: HostResolver,
}

impl LumaSync {
    pub fn new(db: Database, resolver: HostResolver) -> Self {
        Self { db, resolver }
    }

    /// Process one webhook.
    pub fn handle_webhook(&self, webhook: LumaWebhook) -> Result<WebhookOutcome> {
        match webhook.kind.as_str() {
            "event.created" | "event.updated" => {
                let data = webhook
                    .data
                    .ok_or_else(|| Error::validation("Webhook has no data"))?;
                let data: LumaEventData = serde_json::from_value(data)?;
                self.import_event(data)
            }
            other => {
                tracing::debug!(kind = %other, "Ignoring Luma webhook");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }

    /// Upsert an event from its Luma payload, sync hosts and resolve.
    pub fn import_event(&self, data: LumaEventData) -> Result<WebhookOutcome> {
        let starts_at = crate::time::parse_rfc3339(&data.start_at)?;
        let ends_at = match data.end_at.as_deref() {
            Some(end) => crate::time::parse_rfc3339(end)?.max(starts_at),
            None => starts_at + DEFAULT_DURATION_SECS,
        };
        let title: String = data.name.trim().chars().take(crate::events::MAX_TITLE_LEN).collect();
        if title.is_empty() {
            return Err(Error::validation("Imported event has no name"));
        }
        let format = match (&data.meeting_url, &data.geo_address_json) {
            (Some(_), Some(_)) => EventFormat::Hybrid,
            (Some(_), None) => EventFormat::Virtual,
            _ => EventFormat::InPerson,
        };
        let city = data.geo_address_json.as_ref().and_then(|a| a.city.clone());
        let venue = data.geo_address_json.as_ref().and_then(|a| a.full_address.clone());
        let url = data.url.as_deref().map(luma_url);
        let now = crate::time::now_timestamp();

        let (event_id, created) = match self.db.get_event_by_external_id(&data.api_id)? {
            Some(mut existing) => {
                existing.title = title;
                existing.description = data.description;
                existing.format = format;
                existing.city = city;
                existing.venue = venue;
                existing.url = url;
                existing.cover_url = data.cover_url;
                existing.starts_at = starts_at;
                existing.ends_at = ends_at;
                existing.updated_at = now;
                self.db.update_event(&existing)?;
                (existing.id, false)
            }
            None => {
                let (slug, short_code) = crate::events::allocate_identifiers(&self.db, &title)?;
                let event = EventRecord {
                    id: generate_id(),
                    slug,
                    short_code,
                    organization_id: None,
                    event_type: guess_event_type(&title),
                    title,
                    description: data.description,
                    format,
                    city,
                    venue,
                    url,
                    cover_url: data.cover_url,
                    starts_at,
                    ends_at,
                    registration_opens_at: None,
                    registration_closes_at: None,
                    approval: ApprovalState::Pending,
                    source: EventSource::Luma,
                    external_id: Some(data.api_id.clone()),
                    submitted_by: None,
                    created_at: now,
                    updated_at: now,
                };
                self.db.insert_event(&event)?;
                (event.id, true)
            }
        };

        self.db.sync_event_hosts(&event_id, &data.hosts, now)?;
        let matched = match self.resolver.resolve_event(&event_id) {
            Ok(r) => r != Resolution::Unmatched,
            Err(e) => {
                tracing::warn!(event_id = %event_id, error = %e, "Host resolution failed; event stays orphaned");
                false
            }
        };

        tracing::info!(
            event_id = %event_id,
            external_id = %data.api_id,
            created,
            matched,
            hosts = data.hosts.len(),
            "Luma event imported"
        );
        Ok(WebhookOutcome::Imported {
            event_id,
            created,
            matched,
        })
    }
}

/// Luma sometimes sends a bare slug instead of a full URL.
fn luma_url(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://lu.ma/{}", url.trim_start_matches('/'))
    }
}

/// Best-effort type from the event name.
fn guess_event_type(title: &str) -> EventType {
    let t = title.to_lowercase();
    if t.contains("hackathon") || t.contains("hack day") {
        EventType::Hackathon
    } else if t.contains("workshop") || t.contains("taller") {
        EventType::Workshop
    } else if t.contains("conf") || t.contains("summit") || t.contains("congreso") {
        EventType::Conference
    } else if t.contains("meetup") || t.contains("meet up") {
        EventType::Meetup
    } else {
        EventType::Other
    }
}

/// Links a user account to the e-mail they use on Luma.
#[derive(Clone)]
pub struct LumaAccounts {
    db: Database,
    mailer: Arc<dyn Mailer>,
    links: Links,
}

impl LumaAccounts {
    pub fn new(db: Database, mailer: Arc<dyn Mailer>, links: Links) -> Self {
        Self { db, mailer, links }
    }

    /// Store the requested Luma address and mail a verification link to it.
    pub async fn request_link(&self, user: &CurrentUser, luma_email: &str) -> Result<()> {
        let luma_email = normalize_email(luma_email)?;
        let token = generate_token();
        self.db
            .set_luma_link_request(&user.id, &luma_email, &token, crate::time::now_timestamp())?;

        let link = self.links.with_token("/api/users/verify-luma", &token);
        self.mailer.send(luma_link_email(&luma_email, &link)).await?;
        tracing::info!(user = %user.id, "Luma link requested");
        Ok(())
    }

    /// Redeem a Luma verification token. The token is burned.
    pub fn verify_link(&self, token: &str) -> Result<UserRecord> {
        self.db
            .consume_luma_token(token, crate::time::now_timestamp())?
            .ok_or(Error::InvalidToken)
    }
}
