//! Host and organizer claim persistence.

use rusqlite::{params, Connection, Row};
use serde::Serialize;

use super::database::{optional, Database};
use crate::claims::{ClaimKind, ClaimStatus};
use crate::error::Result;

/// A claim record. The token is never serialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRecord {
    pub id: String,
    pub kind: ClaimKind,
    pub event_id: String,
    pub host_id: Option<String>,
    pub user_id: String,
    pub organization_id: Option<String>,
    pub email: Option<String>,
    #[serde(skip)]
    pub token: Option<String>,
    pub status: ClaimStatus,
    pub note: Option<String>,
    pub created_at: i64,
    pub resolved_at: Option<i64>,
}

const CLAIM_COLUMNS: &str =
    "id, kind, event_id, host_id, user_id, organization_id, email, token, status, note, created_at, resolved_at";

fn claim_from_row(row: &Row<'_>) -> rusqlite::Result<ClaimRecord> {
    Ok(ClaimRecord {
        id: row.get(0)?,
        kind: row.get(1)?,
        event_id: row.get(2)?,
        host_id: row.get(3)?,
        user_id: row.get(4)?,
        organization_id: row.get(5)?,
        email: row.get(6)?,
        token: row.get(7)?,
        status: row.get(8)?,
        note: row.get(9)?,
        created_at: row.get(10)?,
        resolved_at: row.get(11)?,
    })
}

/// Close a pending claim and burn its token, inside an open transaction.
/// Returns false if the claim was no longer pending.
pub(crate) fn resolve_claim_tx(
    conn: &Connection,
    id: &str,
    status: ClaimStatus,
    note: Option<&str>,
    now: i64,
) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE claims SET status = ?, token = NULL, note = COALESCE(?, note), resolved_at = ?
         WHERE id = ? AND status = 'pending'",
        params![status, note, now, id],
    )?;
    Ok(changed > 0)
}

impl Database {
    /// Store a new claim
    pub fn insert_claim(&self, c: &ClaimRecord) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            &format!(
                "INSERT INTO claims ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                CLAIM_COLUMNS
            ),
            params![
                c.id,
                c.kind,
                c.event_id,
                c.host_id,
                c.user_id,
                c.organization_id,
                c.email,
                c.token,
                c.status,
                c.note,
                c.created_at,
                c.resolved_at,
            ],
        )?;
        Ok(())
    }

    /// Delete a claim. Returns false if it was already gone.
    pub fn delete_claim(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let deleted = conn.execute("DELETE FROM claims WHERE id = ?", params![id])?;
        Ok(deleted > 0)
    }

    /// Get a claim by ID
    pub fn get_claim(&self, id: &str) -> Result<Option<ClaimRecord>> {
        let conn = self.conn.lock();
        optional(conn.query_row(
            &format!("SELECT {} FROM claims WHERE id = ?", CLAIM_COLUMNS),
            params![id],
            claim_from_row,
        ))
    }

    /// Get a pending claim by its e-mailed token
    pub fn get_claim_by_token(&self, token: &str) -> Result<Option<ClaimRecord>> {
        let conn = self.conn.lock();
        optional(conn.query_row(
            &format!(
                "SELECT {} FROM claims WHERE token = ? AND status = 'pending'",
                CLAIM_COLUMNS
            ),
            params![token],
            claim_from_row,
        ))
    }

    /// Claims, newest first, optionally filtered by status
    pub fn list_claims(&self, status: Option<ClaimStatus>, limit: usize) -> Result<Vec<ClaimRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM claims WHERE (?1 IS NULL OR status = ?1) ORDER BY created_at DESC, rowid DESC LIMIT ?2",
            CLAIM_COLUMNS
        ))?;
        let rows = stmt.query_map(params![status, limit as i64], claim_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}
