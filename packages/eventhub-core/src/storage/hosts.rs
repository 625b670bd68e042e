//! Host rows attached to imported events.

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use super::database::{optional, Database};
use crate::error::Result;
use crate::ids::generate_id;

/// A host identity attached to an event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostRecord {
    pub id: String,
    pub event_id: String,
    pub name: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub is_primary: bool,
    pub organization_id: Option<String>,
    pub match_score: Option<i64>,
    pub created_at: i64,
}

/// Host fields as delivered by the event provider
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewHost {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

const HOST_COLUMNS: &str =
    "id, event_id, name, email, avatar_url, is_primary, organization_id, match_score, created_at";

fn host_from_row(row: &Row<'_>) -> rusqlite::Result<HostRecord> {
    Ok(HostRecord {
        id: row.get(0)?,
        event_id: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        avatar_url: row.get(4)?,
        is_primary: row.get(5)?,
        organization_id: row.get(6)?,
        match_score: row.get(7)?,
        created_at: row.get(8)?,
    })
}

/// Flag a host as the event's primary match, inside an open transaction.
pub(crate) fn mark_host_primary_tx(conn: &Connection, host_id: &str, organization_id: &str, score: u8) -> Result<()> {
    conn.execute(
        "UPDATE event_hosts SET is_primary = 1, organization_id = ?, match_score = ? WHERE id = ?",
        params![organization_id, score, host_id],
    )?;
    Ok(())
}

/// Link a host to an organization without a score (claimed by hand).
pub(crate) fn link_host_tx(conn: &Connection, host_id: &str, organization_id: Option<&str>) -> Result<()> {
    conn.execute(
        "UPDATE event_hosts SET organization_id = COALESCE(?, organization_id) WHERE id = ?",
        params![organization_id, host_id],
    )?;
    Ok(())
}

impl Database {
    /// Hosts of an event in provider order
    pub fn list_event_hosts(&self, event_id: &str) -> Result<Vec<HostRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM event_hosts WHERE event_id = ? ORDER BY rowid",
            HOST_COLUMNS
        ))?;
        let rows = stmt.query_map(params![event_id], host_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Get one host row
    pub fn get_event_host(&self, id: &str) -> Result<Option<HostRecord>> {
        let conn = self.conn.lock();
        optional(conn.query_row(
            &format!("SELECT {} FROM event_hosts WHERE id = ?", HOST_COLUMNS),
            params![id],
            host_from_row,
        ))
    }

    /// Make the event's hosts match `hosts`.
    ///
    /// Rows are keyed by case-insensitive name: existing rows keep their ID
    /// (so pending claims stay attached) and get fresh contact fields, new
    /// names are inserted, names no longer present are deleted.
    pub fn sync_event_hosts(&self, event_id: &str, hosts: &[NewHost], now: i64) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let existing: Vec<(String, String)> = {
            let mut stmt = tx.prepare("SELECT id, name FROM event_hosts WHERE event_id = ?")?;
            let rows = stmt.query_map(params![event_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let wanted: Vec<String> = hosts.iter().map(|h| h.name.trim().to_lowercase()).collect();
        for (id, name) in &existing {
            if !wanted.contains(&name.trim().to_lowercase()) {
                tx.execute("DELETE FROM event_hosts WHERE id = ?", params![id])?;
            }
        }

        for (host, key) in hosts.iter().zip(&wanted) {
            if key.is_empty() {
                continue;
            }
            let found = existing
                .iter()
                .find(|(_, name)| name.trim().to_lowercase() == *key);
            match found {
                Some((id, _)) => {
                    tx.execute(
                        "UPDATE event_hosts SET name = ?, email = ?, avatar_url = ? WHERE id = ?",
                        params![host.name.trim(), host.email, host.avatar_url, id],
                    )?;
                }
                None => {
                    tx.execute(
                        "INSERT INTO event_hosts (id, event_id, name, email, avatar_url, created_at) VALUES (?, ?, ?, ?, ?, ?)",
                        params![generate_id(), event_id, host.name.trim(), host.email, host.avatar_url, now],
                    )?;
                }
            }
        }

        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ApprovalState, EventFormat, EventSource, EventType};
    use crate::storage::EventRecord;

    fn host(name: &str, email: Option<&str>) -> NewHost {
        NewHost {
            name: name.to_string(),
            email: email.map(str::to_string),
            avatar_url: None,
        }
    }

    fn insert_event(db: &Database) -> String {
        let event = EventRecord {
            id: "ev1".into(),
            slug: "ev1".into(),
            short_code: "AAAAAAA".into(),
            organization_id: None,
            title: "Imported".into(),
            description: None,
            event_type: EventType::Other,
            format: EventFormat::InPerson,
            city: None,
            venue: None,
            url: None,
            cover_url: None,
            starts_at: 0,
            ends_at: 0,
            registration_opens_at: None,
            registration_closes_at: None,
            approval: ApprovalState::Pending,
            source: EventSource::Luma,
            external_id: Some("evt-1".into()),
            submitted_by: None,
            created_at: 0,
            updated_at: 0,
        };
        db.insert_event(&event).unwrap();
        event.id
    }

    #[test]
    fn test_sync_keeps_ids_and_order() {
        let db = Database::open(None).unwrap();
        let event_id = insert_event(&db);

        db.sync_event_hosts(&event_id, &[host("Ana", None), host("GDG Lima", None)], 1)
            .unwrap();
        let before = db.list_event_hosts(&event_id).unwrap();
        assert_eq!(before.len(), 2);
        assert_eq!(before[0].name, "Ana");

        db.sync_event_hosts(
            &event_id,
            &[host("gdg lima", Some("gdg@example.com")), host("Bruno", None)],
            2,
        )
        .unwrap();
        let after = db.list_event_hosts(&event_id).unwrap();
        assert_eq!(after.len(), 2);
        let gdg = after.iter().find(|h| h.name == "gdg lima").unwrap();
        assert_eq!(gdg.id, before[1].id);
        assert_eq!(gdg.email.as_deref(), Some("gdg@example.com"));
        assert!(after.iter().all(|h| h.name != "Ana"));
    }
}
