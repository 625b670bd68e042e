//! Event, sponsor and winner persistence.

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use serde::Serialize;

use super::database::{optional, Database};
use crate::error::Result;
use crate::events::{ApprovalState, EventFormat, EventSource, EventType};

/// An event record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub id: String,
    pub slug: String,
    pub short_code: String,
    pub organization_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub event_type: EventType,
    pub format: EventFormat,
    pub city: Option<String>,
    pub venue: Option<String>,
    pub url: Option<String>,
    pub cover_url: Option<String>,
    pub starts_at: i64,
    pub ends_at: i64,
    pub registration_opens_at: Option<i64>,
    pub registration_closes_at: Option<i64>,
    #[serde(rename = "approvalStatus")]
    pub approval: ApprovalState,
    pub source: EventSource,
    pub external_id: Option<String>,
    pub submitted_by: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A sponsor shown on an event page
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SponsorRecord {
    pub id: String,
    pub event_id: String,
    pub name: String,
    pub logo_url: Option<String>,
    pub tier: Option<String>,
    pub position: i64,
}

/// A hackathon winner
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WinnerRecord {
    pub id: String,
    pub event_id: String,
    pub team_name: String,
    pub project_name: Option<String>,
    pub prize: Option<String>,
    pub position: i64,
}

pub(crate) const EVENT_COLUMNS: &str = "events.id, events.slug, events.short_code, events.organization_id, events.title, events.description, events.event_type, events.format, events.city, events.venue, events.url, events.cover_url, events.starts_at, events.ends_at, events.registration_opens_at, events.registration_closes_at, events.approval, events.source, events.external_id, events.submitted_by, events.created_at, events.updated_at";

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<EventRecord> {
    Ok(EventRecord {
        id: row.get(0)?,
        slug: row.get(1)?,
        short_code: row.get(2)?,
        organization_id: row.get(3)?,
        title: row.get(4)?,
        description: row.get(5)?,
        event_type: row.get(6)?,
        format: row.get(7)?,
        city: row.get(8)?,
        venue: row.get(9)?,
        url: row.get(10)?,
        cover_url: row.get(11)?,
        starts_at: row.get(12)?,
        ends_at: row.get(13)?,
        registration_opens_at: row.get(14)?,
        registration_closes_at: row.get(15)?,
        approval: row.get(16)?,
        source: row.get(17)?,
        external_id: row.get(18)?,
        submitted_by: row.get(19)?,
        created_at: row.get(20)?,
        updated_at: row.get(21)?,
    })
}

/// Insert an event inside an open transaction.
pub(crate) fn insert_event_tx(conn: &Connection, e: &EventRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO events (id, slug, short_code, organization_id, title, description, event_type, format, city, venue, url, cover_url,
                             starts_at, ends_at, registration_opens_at, registration_closes_at, approval, source, external_id, submitted_by, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            e.id,
            e.slug,
            e.short_code,
            e.organization_id,
            e.title,
            e.description,
            e.event_type,
            e.format,
            e.city,
            e.venue,
            e.url,
            e.cover_url,
            e.starts_at,
            e.ends_at,
            e.registration_opens_at,
            e.registration_closes_at,
            e.approval,
            e.source,
            e.external_id,
            e.submitted_by,
            e.created_at,
            e.updated_at,
        ],
    )?;
    Ok(())
}

/// Attach an organization to an event that has none, inside an open
/// transaction. Returns whether the event was orphaned.
pub(crate) fn attach_orphan_event_tx(conn: &Connection, event_id: &str, organization_id: &str, now: i64) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE events SET organization_id = ?, updated_at = ? WHERE id = ? AND organization_id IS NULL",
        params![organization_id, now, event_id],
    )?;
    Ok(changed > 0)
}

impl Database {
    // ========================================================================
    // EVENTS
    // ========================================================================

    /// Insert a new event
    pub fn insert_event(&self, event: &EventRecord) -> Result<()> {
        let conn = self.conn.lock();
        insert_event_tx(&conn, event)
    }

    /// Get an event by ID
    pub fn get_event(&self, id: &str) -> Result<Option<EventRecord>> {
        self.get_event_where("events.id = ?", id)
    }

    /// Get an event by slug
    pub fn get_event_by_slug(&self, slug: &str) -> Result<Option<EventRecord>> {
        self.get_event_where("events.slug = ?", slug)
    }

    /// Get an event by short code
    pub fn get_event_by_short_code(&self, code: &str) -> Result<Option<EventRecord>> {
        self.get_event_where("events.short_code = ?", code)
    }

    /// Get an imported event by its provider ID
    pub fn get_event_by_external_id(&self, external_id: &str) -> Result<Option<EventRecord>> {
        self.get_event_where("events.external_id = ?", external_id)
    }

    fn get_event_where(&self, condition: &str, value: &str) -> Result<Option<EventRecord>> {
        let conn = self.conn.lock();
        optional(conn.query_row(
            &format!("SELECT {} FROM events WHERE {}", EVENT_COLUMNS, condition),
            params![value],
            event_from_row,
        ))
    }

    /// Whether a slug is already taken
    pub fn event_slug_exists(&self, slug: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM events WHERE slug = ?", params![slug], |row| row.get(0))?;
        Ok(count > 0)
    }

    /// Whether a short code is already taken
    pub fn event_short_code_exists(&self, code: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM events WHERE short_code = ?",
            params![code],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Write back the editable fields of an event
    pub fn update_event(&self, e: &EventRecord) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE events SET
                title = ?, description = ?, event_type = ?, format = ?, city = ?, venue = ?, url = ?, cover_url = ?,
                starts_at = ?, ends_at = ?, registration_opens_at = ?, registration_closes_at = ?, updated_at = ?
             WHERE id = ?",
            params![
                e.title,
                e.description,
                e.event_type,
                e.format,
                e.city,
                e.venue,
                e.url,
                e.cover_url,
                e.starts_at,
                e.ends_at,
                e.registration_opens_at,
                e.registration_closes_at,
                e.updated_at,
                e.id,
            ],
        )?;
        Ok(changed > 0)
    }

    /// Set the approval state
    pub fn set_event_approval(&self, id: &str, approval: ApprovalState, now: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE events SET approval = ?, updated_at = ? WHERE id = ?",
            params![approval, now, id],
        )?;
        Ok(changed > 0)
    }

    /// Set (or clear) the owning organization
    pub fn set_event_organization(&self, id: &str, organization_id: Option<&str>, now: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE events SET organization_id = ?, updated_at = ? WHERE id = ?",
            params![organization_id, now, id],
        )?;
        Ok(changed > 0)
    }

    /// Attach an organization only if the event is still orphaned
    pub fn attach_orphan_event(&self, id: &str, organization_id: &str, now: i64) -> Result<bool> {
        let conn = self.conn.lock();
        attach_orphan_event_tx(&conn, id, organization_id, now)
    }

    /// Hard-delete an event; sponsors, winners, hosts and claims cascade
    pub fn delete_event(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let removed = conn.execute("DELETE FROM events WHERE id = ?", params![id])?;
        Ok(removed > 0)
    }

    /// Events awaiting a decision, oldest first
    pub fn list_pending_events(&self, limit: usize) -> Result<Vec<EventRecord>> {
        self.select_events(
            "events.approval = 'pending'",
            "events.created_at, events.rowid",
            limit,
            Vec::new(),
        )
    }

    /// Events without an organization that are not rejected, oldest first
    pub fn list_orphan_events(&self, limit: usize) -> Result<Vec<EventRecord>> {
        self.select_events(
            "events.organization_id IS NULL AND events.approval != 'rejected'",
            "events.created_at, events.rowid",
            limit,
            Vec::new(),
        )
    }

    /// Imported events still without an organization (reconciliation input)
    pub fn list_orphan_imported_events(&self, limit: usize) -> Result<Vec<EventRecord>> {
        self.select_events(
            "events.organization_id IS NULL AND events.source = 'luma'",
            "events.created_at, events.rowid",
            limit,
            Vec::new(),
        )
    }

    /// Run a filtered event query. `condition` and `order_by` are trusted SQL
    /// fragments; all user input travels in `values`.
    pub(crate) fn select_events(
        &self,
        condition: &str,
        order_by: &str,
        limit: usize,
        values: Vec<Value>,
    ) -> Result<Vec<EventRecord>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM events WHERE {} ORDER BY {} LIMIT {}",
            EVENT_COLUMNS, condition, order_by, limit
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), event_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Slugs and last update of every approved event (sitemap)
    pub fn list_approved_event_slugs(&self) -> Result<Vec<(String, i64)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT slug, updated_at FROM events WHERE approval = 'approved' ORDER BY starts_at DESC, id",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ========================================================================
    // SPONSORS & WINNERS
    // ========================================================================

    /// Add a sponsor
    pub fn insert_sponsor(&self, s: &SponsorRecord) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO event_sponsors (id, event_id, name, logo_url, tier, position) VALUES (?, ?, ?, ?, ?, ?)",
            params![s.id, s.event_id, s.name, s.logo_url, s.tier, s.position],
        )?;
        Ok(())
    }

    /// Sponsors of an event in display order
    pub fn list_sponsors(&self, event_id: &str) -> Result<Vec<SponsorRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, event_id, name, logo_url, tier, position FROM event_sponsors WHERE event_id = ? ORDER BY position, name",
        )?;
        let rows = stmt.query_map(params![event_id], |row| {
            Ok(SponsorRecord {
                id: row.get(0)?,
                event_id: row.get(1)?,
                name: row.get(2)?,
                logo_url: row.get(3)?,
                tier: row.get(4)?,
                position: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Add a winner
    pub fn insert_winner(&self, w: &WinnerRecord) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO event_winners (id, event_id, team_name, project_name, prize, position) VALUES (?, ?, ?, ?, ?, ?)",
            params![w.id, w.event_id, w.team_name, w.project_name, w.prize, w.position],
        )?;
        Ok(())
    }

    /// Winners of an event by placement
    pub fn list_winners(&self, event_id: &str) -> Result<Vec<WinnerRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, event_id, team_name, project_name, prize, position FROM event_winners WHERE event_id = ? ORDER BY position, team_name",
        )?;
        let rows = stmt.query_map(params![event_id], |row| {
            Ok(WinnerRecord {
                id: row.get(0)?,
                event_id: row.get(1)?,
                team_name: row.get(2)?,
                project_name: row.get(3)?,
                prize: row.get(4)?,
                position: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}
