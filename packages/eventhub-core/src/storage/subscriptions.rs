//! Newsletter subscription persistence.

use rusqlite::{params, Row};
use serde::Serialize;

use super::database::{optional, Database};
use crate::error::Result;

/// A newsletter subscription. Tokens are never serialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRecord {
    pub id: String,
    pub email: String,
    #[serde(skip)]
    pub verify_token: Option<String>,
    #[serde(skip)]
    pub unsubscribe_token: String,
    pub is_verified: bool,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

const SUBSCRIPTION_COLUMNS: &str =
    "id, email, verify_token, unsubscribe_token, is_verified, is_active, created_at, updated_at";

fn subscription_from_row(row: &Row<'_>) -> rusqlite::Result<SubscriptionRecord> {
    Ok(SubscriptionRecord {
        id: row.get(0)?,
        email: row.get(1)?,
        verify_token: row.get(2)?,
        unsubscribe_token: row.get(3)?,
        is_verified: row.get(4)?,
        is_active: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

impl Database {
    /// Store a new subscription
    pub fn insert_subscription(&self, s: &SubscriptionRecord) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            &format!(
                "INSERT INTO subscriptions ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                SUBSCRIPTION_COLUMNS
            ),
            params![
                s.id,
                s.email,
                s.verify_token,
                s.unsubscribe_token,
                s.is_verified,
                s.is_active,
                s.created_at,
                s.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Look up a subscription by (normalized) e-mail
    pub fn get_subscription_by_email(&self, email: &str) -> Result<Option<SubscriptionRecord>> {
        let conn = self.conn.lock();
        optional(conn.query_row(
            &format!("SELECT {} FROM subscriptions WHERE email = ?", SUBSCRIPTION_COLUMNS),
            params![email],
            subscription_from_row,
        ))
    }

    /// Look up a subscription by its unsubscribe token
    pub fn get_subscription_by_unsubscribe_token(&self, token: &str) -> Result<Option<SubscriptionRecord>> {
        let conn = self.conn.lock();
        optional(conn.query_row(
            &format!(
                "SELECT {} FROM subscriptions WHERE unsubscribe_token = ?",
                SUBSCRIPTION_COLUMNS
            ),
            params![token],
            subscription_from_row,
        ))
    }

    /// Re-arm a subscription with a fresh verify token and mark it active
    pub fn rearm_subscription(&self, id: &str, verify_token: &str, now: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE subscriptions SET verify_token = ?, is_active = 1, updated_at = ? WHERE id = ?",
            params![verify_token, now, id],
        )?;
        Ok(())
    }

    /// Consume a verify token; returns the verified subscription, or `None`
    /// for an unknown token
    pub fn consume_subscription_verify_token(&self, token: &str, now: i64) -> Result<Option<SubscriptionRecord>> {
        let conn = self.conn.lock();
        let id: Option<String> = optional(conn.query_row(
            "SELECT id FROM subscriptions WHERE verify_token = ?",
            params![token],
            |row| row.get(0),
        ))?;
        let id = match id {
            Some(id) => id,
            None => return Ok(None),
        };

        conn.execute(
            "UPDATE subscriptions SET is_verified = 1, is_active = 1, verify_token = NULL, updated_at = ? WHERE id = ?",
            params![now, id],
        )?;
        optional(conn.query_row(
            &format!("SELECT {} FROM subscriptions WHERE id = ?", SUBSCRIPTION_COLUMNS),
            params![id],
            subscription_from_row,
        ))
    }

    /// Flip `is_active` off; returns whether it was active
    pub fn deactivate_subscription(&self, id: &str, now: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE subscriptions SET is_active = 0, updated_at = ? WHERE id = ? AND is_active = 1",
            params![now, id],
        )?;
        Ok(changed > 0)
    }
}
