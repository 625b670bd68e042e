//! Badge, gift card and generation outbox persistence.
//!
//! Badges and gift cards share the generation columns (`status`,
//! `job_handle`, `generated_*`, `error_message`), so the status updates below
//! take a [`GenerationKind`] and pick the table from it.

use rusqlite::{params, Connection, Row};
use serde::Serialize;

use super::database::{optional, Database};
use crate::community::MemberRole;
use crate::error::Result;
use crate::generation::{GenerationKind, GenerationStatus};

/// A generated community badge. The share token is the public handle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeRecord {
    pub id: String,
    pub token: String,
    pub community_id: String,
    pub user_id: String,
    pub badge_number: i64,
    pub member_name: String,
    pub member_role: MemberRole,
    pub photo_url: String,
    pub status: GenerationStatus,
    pub job_handle: Option<String>,
    pub generated_image_url: Option<String>,
    pub generated_background_url: Option<String>,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A generated gift card.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftCardRecord {
    pub id: String,
    pub token: String,
    pub user_id: String,
    pub recipient_name: String,
    pub message: Option<String>,
    pub style: String,
    pub photo_url: String,
    pub status: GenerationStatus,
    pub job_handle: Option<String>,
    pub generated_image_url: Option<String>,
    pub generated_background_url: Option<String>,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A job dispatch that has not reached the task system yet.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxRecord {
    pub id: String,
    pub kind: GenerationKind,
    pub record_id: String,
    pub token: String,
    /// JSON job payload
    pub payload: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: i64,
}

const BADGE_COLUMNS: &str = "id, token, community_id, user_id, badge_number, member_name, member_role, \
     photo_url, status, job_handle, generated_image_url, generated_background_url, error_message, \
     created_at, updated_at";

const GIFT_CARD_COLUMNS: &str = "id, token, user_id, recipient_name, message, style, photo_url, status, \
     job_handle, generated_image_url, generated_background_url, error_message, created_at, updated_at";

const OUTBOX_COLUMNS: &str = "id, kind, record_id, token, payload, attempts, last_error, created_at";

fn badge_from_row(row: &Row<'_>) -> rusqlite::Result<BadgeRecord> {
    Ok(BadgeRecord {
        id: row.get(0)?,
        token: row.get(1)?,
        community_id: row.get(2)?,
        user_id: row.get(3)?,
        badge_number: row.get(4)?,
        member_name: row.get(5)?,
        member_role: row.get(6)?,
        photo_url: row.get(7)?,
        status: row.get(8)?,
        job_handle: row.get(9)?,
        generated_image_url: row.get(10)?,
        generated_background_url: row.get(11)?,
        error_message: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

fn gift_card_from_row(row: &Row<'_>) -> rusqlite::Result<GiftCardRecord> {
    Ok(GiftCardRecord {
        id: row.get(0)?,
        token: row.get(1)?,
        user_id: row.get(2)?,
        recipient_name: row.get(3)?,
        message: row.get(4)?,
        style: row.get(5)?,
        photo_url: row.get(6)?,
        status: row.get(7)?,
        job_handle: row.get(8)?,
        generated_image_url: row.get(9)?,
        generated_background_url: row.get(10)?,
        error_message: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

fn outbox_from_row(row: &Row<'_>) -> rusqlite::Result<OutboxRecord> {
    Ok(OutboxRecord {
        id: row.get(0)?,
        kind: row.get(1)?,
        record_id: row.get(2)?,
        token: row.get(3)?,
        payload: row.get(4)?,
        attempts: row.get(5)?,
        last_error: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn table(kind: GenerationKind) -> &'static str {
    match kind {
        GenerationKind::Badge => "badges",
        GenerationKind::GiftCard => "gift_cards",
    }
}

/// Next badge number for a community (1 for the first badge).
pub(crate) fn next_badge_number_tx(conn: &Connection, community_id: &str) -> Result<i64> {
    let n: i64 = conn.query_row(
        "SELECT COALESCE(MAX(badge_number), 0) + 1 FROM badges WHERE community_id = ?",
        params![community_id],
        |row| row.get(0),
    )?;
    Ok(n)
}

/// Insert a badge inside an open transaction.
pub(crate) fn insert_badge_tx(conn: &Connection, b: &BadgeRecord) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO badges ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            BADGE_COLUMNS
        ),
        params![
            b.id,
            b.token,
            b.community_id,
            b.user_id,
            b.badge_number,
            b.member_name,
            b.member_role,
            b.photo_url,
            b.status,
            b.job_handle,
            b.generated_image_url,
            b.generated_background_url,
            b.error_message,
            b.created_at,
            b.updated_at,
        ],
    )?;
    Ok(())
}

/// Insert a gift card inside an open transaction.
pub(crate) fn insert_gift_card_tx(conn: &Connection, g: &GiftCardRecord) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO gift_cards ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            GIFT_CARD_COLUMNS
        ),
        params![
            g.id,
            g.token,
            g.user_id,
            g.recipient_name,
            g.message,
            g.style,
            g.photo_url,
            g.status,
            g.job_handle,
            g.generated_image_url,
            g.generated_background_url,
            g.error_message,
            g.created_at,
            g.updated_at,
        ],
    )?;
    Ok(())
}

/// Queue a dispatch inside an open transaction.
pub(crate) fn insert_outbox_tx(conn: &Connection, o: &OutboxRecord) -> Result<()> {
    conn.execute(
        &format!("INSERT INTO generation_outbox ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)", OUTBOX_COLUMNS),
        params![o.id, o.kind, o.record_id, o.token, o.payload, o.attempts, o.last_error, o.created_at],
    )?;
    Ok(())
}

impl Database {
    // ========================================================================
    // BADGES & GIFT CARDS
    // ========================================================================

    /// Get a badge by its share token
    pub fn get_badge_by_token(&self, token: &str) -> Result<Option<BadgeRecord>> {
        let conn = self.conn.lock();
        optional(conn.query_row(
            &format!("SELECT {} FROM badges WHERE token = ?", BADGE_COLUMNS),
            params![token],
            badge_from_row,
        ))
    }

    /// Get a gift card by its share token
    pub fn get_gift_card_by_token(&self, token: &str) -> Result<Option<GiftCardRecord>> {
        let conn = self.conn.lock();
        optional(conn.query_row(
            &format!("SELECT {} FROM gift_cards WHERE token = ?", GIFT_CARD_COLUMNS),
            params![token],
            gift_card_from_row,
        ))
    }

    /// Current status of a badge or gift card by record id
    pub fn generation_status(&self, kind: GenerationKind, record_id: &str) -> Result<Option<GenerationStatus>> {
        let conn = self.conn.lock();
        optional(conn.query_row(
            &format!("SELECT status FROM {} WHERE id = ?", table(kind)),
            params![record_id],
            |row| row.get(0),
        ))
    }

    /// Move a record from `from` to `to`, storing the worker's results.
    ///
    /// Compare-and-set on `from`: returns false if another writer moved the
    /// record first. `None` result fields keep their stored values.
    #[allow(clippy::too_many_arguments)]
    pub fn update_generation(
        &self,
        kind: GenerationKind,
        record_id: &str,
        from: GenerationStatus,
        to: GenerationStatus,
        image_url: Option<&str>,
        background_url: Option<&str>,
        error_message: Option<&str>,
        now: i64,
    ) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            &format!(
                "UPDATE {} SET status = ?,
                    generated_image_url = COALESCE(?, generated_image_url),
                    generated_background_url = COALESCE(?, generated_background_url),
                    error_message = COALESCE(?, error_message),
                    updated_at = ?
                 WHERE id = ? AND status = ?",
                table(kind)
            ),
            params![to, image_url, background_url, error_message, now, record_id, from],
        )?;
        Ok(changed > 0)
    }

    /// Fail every `pending`/`generating` record last touched before `cutoff`.
    /// Returns how many records were expired.
    pub fn expire_generations(&self, kind: GenerationKind, cutoff: i64, message: &str, now: i64) -> Result<usize> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            &format!(
                "UPDATE {} SET status = 'failed', error_message = ?, updated_at = ?
                 WHERE status IN ('pending', 'generating') AND updated_at < ?",
                table(kind)
            ),
            params![message, now, cutoff],
        )?;
        Ok(changed)
    }

    // ========================================================================
    // OUTBOX
    // ========================================================================

    /// Every outbox row, oldest first
    pub fn list_outbox(&self, limit: usize) -> Result<Vec<OutboxRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM generation_outbox ORDER BY created_at, rowid LIMIT ?",
            OUTBOX_COLUMNS
        ))?;
        let rows = stmt.query_map(params![limit as i64], outbox_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Outbox rows that still have attempts left and are not leased to a
    /// dispatcher at `now`, oldest first
    pub fn list_due_outbox(&self, max_attempts: i64, now: i64, limit: usize) -> Result<Vec<OutboxRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM generation_outbox
             WHERE attempts < ? AND claimed_until <= ?
             ORDER BY created_at, rowid LIMIT ?",
            OUTBOX_COLUMNS
        ))?;
        let rows = stmt.query_map(params![max_attempts, now, limit as i64], outbox_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Lease an outbox row until `until`. Compare-and-set: returns false if
    /// the row is gone, exhausted, or already leased at `now`.
    pub fn claim_outbox_entry(&self, id: &str, max_attempts: i64, now: i64, until: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE generation_outbox SET claimed_until = ?
             WHERE id = ? AND attempts < ? AND claimed_until <= ?",
            params![until, id, max_attempts, now],
        )?;
        Ok(changed > 0)
    }

    /// Get one outbox row
    pub fn get_outbox_entry(&self, id: &str) -> Result<Option<OutboxRecord>> {
        let conn = self.conn.lock();
        optional(conn.query_row(
            &format!("SELECT {} FROM generation_outbox WHERE id = ?", OUTBOX_COLUMNS),
            params![id],
            outbox_from_row,
        ))
    }

    /// Store the job handle on the record and drop the outbox row, atomically.
    /// Returns false if the row was already gone.
    pub fn complete_dispatch(&self, entry: &OutboxRecord, job_handle: &str, now: i64) -> Result<bool> {
        self.transaction(|tx| {
            let deleted = tx.execute("DELETE FROM generation_outbox WHERE id = ?", params![entry.id])?;
            if deleted == 0 {
                return Ok(false);
            }
            tx.execute(
                &format!("UPDATE {} SET job_handle = ?, updated_at = ? WHERE id = ?", table(entry.kind)),
                params![job_handle, now, entry.record_id],
            )?;
            Ok(true)
        })
    }

    /// Count a failed attempt and release the lease. Returns the attempt
    /// total.
    pub fn record_dispatch_failure(&self, id: &str, error: &str) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE generation_outbox SET attempts = attempts + 1, last_error = ?, claimed_until = 0 WHERE id = ?",
            params![error, id],
        )?;
        let attempts = optional(conn.query_row(
            "SELECT attempts FROM generation_outbox WHERE id = ?",
            params![id],
            |row| row.get(0),
        ))?;
        Ok(attempts.unwrap_or(0))
    }

    /// Park an outbox row so it is never retried, keeping it for inspection.
    pub fn retire_outbox_entry(&self, id: &str, max_attempts: i64, reason: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE generation_outbox SET attempts = MAX(attempts, ?), last_error = ? WHERE id = ?",
            params![max_attempts, reason, id],
        )?;
        Ok(())
    }
}
