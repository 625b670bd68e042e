//! # Feed
//!
//! Filtered listings of approved events with keyset pagination.
//!
//! ## Cursor
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ORDER BY starts_at, id           (Soonest; Latest reverses both)       │
//! │                                                                         │
//! │  page 1:  e1 e2 e3 │ e4 ...       fetch limit + 1 rows                  │
//! │                 ▲                                                       │
//! │                 └── cursor = base64url({"s": e3.starts_at, "id": e3.id})│
//! │                                                                         │
//! │  page 2:  WHERE (starts_at, id) > (cursor.s, cursor.id)                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The cursor is opaque to clients; a malformed one is a validation error.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

use super::service::{EventService, EventView};
use super::status::EventStatus;
use super::types::{EventFormat, EventType};
use crate::error::{Error, Result};
use crate::identity::CurrentUser;

/// Page size when none is requested.
pub const DEFAULT_FEED_LIMIT: usize = 20;

/// Largest page size served.
pub const MAX_FEED_LIMIT: usize = 50;

/// Which events to consider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedScope {
    #[default]
    All,
    /// Only communities the viewer belongs to (followers included)
    Following,
}

/// Sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedSort {
    /// Earliest start first
    #[default]
    Soonest,
    /// Latest start first
    Latest,
}

/// Feed filters, as read from the query string.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedQuery {
    #[serde(default)]
    pub scope: FeedScope,
    #[serde(default, rename = "type")]
    pub event_type: Option<EventType>,
    #[serde(default)]
    pub format: Option<EventFormat>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub status: Option<EventStatus>,
    /// Organization slug
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default, alias = "q")]
    pub search: Option<String>,
    #[serde(default)]
    pub sort: FeedSort,
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl FeedQuery {
    /// Requested page size clamped to `1..=MAX_FEED_LIMIT`.
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_FEED_LIMIT)
            .clamp(1, MAX_FEED_LIMIT)
    }
}

/// Position after the last row of a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedCursor {
    #[serde(rename = "s")]
    pub starts_at: i64,
    pub id: String,
}

impl FeedCursor {
    pub fn encode(&self) -> String {
        // Serializing two plain fields cannot fail
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(self).unwrap_or_default())
    }

    pub fn decode(s: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(s)
            .map_err(|_| Error::validation("Invalid cursor"))?;
        serde_json::from_slice(&bytes).map_err(|_| Error::validation("Invalid cursor"))
    }
}

/// One page of the feed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPage {
    pub events: Vec<EventView>,
    /// Present iff another page exists
    pub next_cursor: Option<String>,
}

/// A sitemap entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SitemapEntry {
    pub slug: String,
    pub updated_at: i64,
}

/// Public URLs worth indexing.
#[derive(Debug, Clone, Serialize)]
pub struct Sitemap {
    pub events: Vec<SitemapEntry>,
    pub organizations: Vec<SitemapEntry>,
}

/// Positional parameter list that hands out `?N` placeholders.
struct Binds {
    values: Vec<Value>,
}

impl Binds {
    fn push(&mut self, value: impl Into<Value>) -> String {
        self.values.push(value.into());
        format!("?{}", self.values.len())
    }
}

fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

impl EventService {
    /// One page of approved events matching `query`, evaluated at `now`.
    pub fn feed(&self, viewer: Option<&CurrentUser>, query: &FeedQuery, now: i64) -> Result<FeedPage> {
        let limit = query.effective_limit();
        let cursor = query.cursor.as_deref().map(FeedCursor::decode).transpose()?;

        let mut binds = Binds { values: Vec::new() };
        let now_ref = binds.push(now);
        let mut conditions = vec!["events.approval = 'approved'".to_string()];

        if query.scope == FeedScope::Following {
            let user = viewer.ok_or_else(|| Error::forbidden("Sign in to see followed communities"))?;
            let p = binds.push(user.id.clone());
            conditions.push(format!(
                "events.organization_id IN (SELECT community_id FROM community_members WHERE user_id = {})",
                p
            ));
        }
        if let Some(t) = query.event_type {
            let p = binds.push(t.as_str().to_string());
            conditions.push(format!("events.event_type = {}", p));
        }
        if let Some(f) = query.format {
            let p = binds.push(f.as_str().to_string());
            conditions.push(format!("events.format = {}", p));
        }
        if let Some(city) = query.city.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            let p = binds.push(city.to_string());
            conditions.push(format!("events.city = {} COLLATE NOCASE", p));
        }
        if let Some(status) = query.status {
            conditions.push(status.sql_condition(&now_ref));
        }
        if let Some(slug) = query.organization.as_deref().filter(|s| !s.is_empty()) {
            let p = binds.push(slug.to_string());
            conditions.push(format!(
                "events.organization_id = (SELECT id FROM organizations WHERE slug = {})",
                p
            ));
        }
        if let Some(term) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let p = binds.push(like_pattern(term));
            conditions.push(format!(
                "(events.title LIKE {p} ESCAPE '\\' OR events.description LIKE {p} ESCAPE '\\' OR events.city LIKE {p} ESCAPE '\\')"
            ));
        }

        let (cmp, order_by) = match query.sort {
            FeedSort::Soonest => (">", "events.starts_at ASC, events.id ASC"),
            FeedSort::Latest => ("<", "events.starts_at DESC, events.id DESC"),
        };
        if let Some(c) = &cursor {
            let s = binds.push(c.starts_at);
            let id = binds.push(c.id.clone());
            conditions.push(format!(
                "(events.starts_at {cmp} {s} OR (events.starts_at = {s} AND events.id {cmp} {id}))"
            ));
        }

        let mut rows = self.db().select_events(
            &conditions.join(" AND "),
            order_by,
            limit + 1,
            binds.values,
        )?;

        let next_cursor = if rows.len() > limit {
            rows.truncate(limit);
            rows.last().map(|e| {
                FeedCursor {
                    starts_at: e.starts_at,
                    id: e.id.clone(),
                }
                .encode()
            })
        } else {
            None
        };

        Ok(FeedPage {
            events: rows.into_iter().map(|e| EventView::at(e, now)).collect(),
            next_cursor,
        })
    }

    /// Slugs of approved events and all organizations.
    pub fn sitemap(&self) -> Result<Sitemap> {
        let to_entries = |rows: Vec<(String, i64)>| {
            rows.into_iter()
                .map(|(slug, updated_at)| SitemapEntry { slug, updated_at })
                .collect()
        };
        Ok(Sitemap {
            events: to_entries(self.db().list_approved_event_slugs()?),
            organizations: to_entries(self.db().list_organization_slugs()?),
        })
    }
}
