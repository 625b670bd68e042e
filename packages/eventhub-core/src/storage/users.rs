//! Cached user profiles and the Luma account link.

use rusqlite::{params, Row};
use serde::Serialize;

use super::database::{optional, Database};
use crate::error::Result;
use crate::identity::CurrentUser;

/// A cached user profile
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub luma_email: Option<String>,
    pub luma_verified: bool,
    pub updated_at: i64,
}

const USER_COLUMNS: &str =
    "id, email, email_verified, display_name, avatar_url, luma_email, luma_verified, updated_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        id: row.get(0)?,
        email: row.get(1)?,
        email_verified: row.get(2)?,
        display_name: row.get(3)?,
        avatar_url: row.get(4)?,
        luma_email: row.get(5)?,
        luma_verified: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

impl Database {
    /// Insert or refresh the cached profile of an authenticated user
    pub fn upsert_user(&self, user: &CurrentUser, now: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO users (id, email, email_verified, display_name, avatar_url, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (id) DO UPDATE SET
                email = excluded.email,
                email_verified = excluded.email_verified,
                display_name = COALESCE(excluded.display_name, users.display_name),
                avatar_url = COALESCE(excluded.avatar_url, users.avatar_url),
                updated_at = excluded.updated_at",
            params![
                user.id,
                user.email,
                user.email_verified,
                user.display_name,
                user.avatar_url,
                now,
            ],
        )?;
        Ok(())
    }

    /// Get a cached profile
    pub fn get_user(&self, id: &str) -> Result<Option<UserRecord>> {
        let conn = self.conn.lock();
        optional(conn.query_row(
            &format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS),
            params![id],
            user_from_row,
        ))
    }

    /// Store a pending Luma link; resets any earlier verification
    pub fn set_luma_link_request(&self, user_id: &str, luma_email: &str, token: &str, now: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO users (id, luma_email, luma_verified, luma_verify_token, updated_at)
             VALUES (?, ?, 0, ?, ?)
             ON CONFLICT (id) DO UPDATE SET
                luma_email = excluded.luma_email,
                luma_verified = 0,
                luma_verify_token = excluded.luma_verify_token,
                updated_at = excluded.updated_at",
            params![user_id, luma_email, token, now],
        )?;
        Ok(())
    }

    /// Consume a Luma verification token; returns the verified user, or
    /// `None` for an unknown token
    pub fn consume_luma_token(&self, token: &str, now: i64) -> Result<Option<UserRecord>> {
        let conn = self.conn.lock();
        let user_id: Option<String> = optional(conn.query_row(
            "SELECT id FROM users WHERE luma_verify_token = ?",
            params![token],
            |row| row.get(0),
        ))?;
        let user_id = match user_id {
            Some(id) => id,
            None => return Ok(None),
        };

        conn.execute(
            "UPDATE users SET luma_verified = 1, luma_verify_token = NULL, updated_at = ? WHERE id = ?",
            params![now, user_id],
        )?;
        optional(conn.query_row(
            &format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS),
            params![user_id],
            user_from_row,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_keeps_profile_fields() {
        let db = Database::open(None).unwrap();
        let mut user = CurrentUser::verified("u1", "u1@example.com");
        user.display_name = Some("Uno".into());
        db.upsert_user(&user, 1).unwrap();

        user.display_name = None;
        db.upsert_user(&user, 2).unwrap();

        let cached = db.get_user("u1").unwrap().unwrap();
        assert_eq!(cached.display_name.as_deref(), Some("Uno"));
        assert_eq!(cached.updated_at, 2);
    }

    #[test]
    fn test_luma_token_is_single_use() {
        let db = Database::open(None).unwrap();
        db.set_luma_link_request("u1", "host@lu.ma", "tok", 1).unwrap();

        let user = db.consume_luma_token("tok", 2).unwrap().unwrap();
        assert!(user.luma_verified);
        assert_eq!(user.luma_email.as_deref(), Some("host@lu.ma"));
        assert!(db.consume_luma_token("tok", 3).unwrap().is_none());
    }
}
