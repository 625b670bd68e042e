//! Organization and membership persistence.

use rusqlite::{params, Connection, Row};
use serde::Serialize;

use super::database::{optional, Database};
use crate::community::{MemberRole, OrgType};
use crate::error::Result;

/// An organization (community) record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationRecord {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub owner_user_id: String,
    pub is_verified: bool,
    pub is_personal_org: bool,
    pub org_type: OrgType,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A community membership record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRecord {
    pub community_id: String,
    pub user_id: String,
    pub role: MemberRole,
    pub joined_at: i64,
}

const ORG_COLUMNS: &str = "id, slug, name, description, logo_url, owner_user_id, is_verified, is_personal_org, org_type, created_at, updated_at";

fn org_from_row(row: &Row<'_>) -> rusqlite::Result<OrganizationRecord> {
    Ok(OrganizationRecord {
        id: row.get(0)?,
        slug: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        logo_url: row.get(4)?,
        owner_user_id: row.get(5)?,
        is_verified: row.get(6)?,
        is_personal_org: row.get(7)?,
        org_type: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn member_from_row(row: &Row<'_>) -> rusqlite::Result<MemberRecord> {
    Ok(MemberRecord {
        community_id: row.get(0)?,
        user_id: row.get(1)?,
        role: row.get(2)?,
        joined_at: row.get(3)?,
    })
}

/// Insert an organization inside an open transaction.
pub(crate) fn insert_organization_tx(conn: &Connection, org: &OrganizationRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO organizations (id, slug, name, description, logo_url, owner_user_id, is_verified, is_personal_org, org_type, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            org.id,
            org.slug,
            org.name,
            org.description,
            org.logo_url,
            org.owner_user_id,
            org.is_verified,
            org.is_personal_org,
            org.org_type,
            org.created_at,
            org.updated_at,
        ],
    )?;
    Ok(())
}

/// Insert a membership row inside an open transaction.
pub(crate) fn insert_member_tx(
    conn: &Connection,
    community_id: &str,
    user_id: &str,
    role: MemberRole,
    joined_at: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO community_members (community_id, user_id, role, joined_at) VALUES (?, ?, ?, ?)",
        params![community_id, user_id, role, joined_at],
    )?;
    Ok(())
}

/// Upsert a member's role inside an open transaction.
pub(crate) fn set_member_role_tx(
    conn: &Connection,
    community_id: &str,
    user_id: &str,
    role: MemberRole,
    now: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO community_members (community_id, user_id, role, joined_at) VALUES (?, ?, ?, ?)
         ON CONFLICT (community_id, user_id) DO UPDATE SET role = excluded.role",
        params![community_id, user_id, role, now],
    )?;
    Ok(())
}

/// Point an organization at a new owner inside an open transaction.
pub(crate) fn set_organization_owner_tx(conn: &Connection, community_id: &str, owner_user_id: &str, now: i64) -> Result<()> {
    conn.execute(
        "UPDATE organizations SET owner_user_id = ?, updated_at = ? WHERE id = ?",
        params![owner_user_id, now, community_id],
    )?;
    Ok(())
}

impl Database {
    // ========================================================================
    // ORGANIZATIONS
    // ========================================================================

    /// Get an organization by ID
    pub fn get_organization(&self, id: &str) -> Result<Option<OrganizationRecord>> {
        let conn = self.conn.lock();
        optional(conn.query_row(
            &format!("SELECT {} FROM organizations WHERE id = ?", ORG_COLUMNS),
            params![id],
            org_from_row,
        ))
    }

    /// Get an organization by slug
    pub fn get_organization_by_slug(&self, slug: &str) -> Result<Option<OrganizationRecord>> {
        let conn = self.conn.lock();
        optional(conn.query_row(
            &format!("SELECT {} FROM organizations WHERE slug = ?", ORG_COLUMNS),
            params![slug],
            org_from_row,
        ))
    }

    /// Whether a slug is already taken
    pub fn organization_slug_exists(&self, slug: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM organizations WHERE slug = ?",
            params![slug],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// All verified organizations, oldest first (host-resolution candidates)
    pub fn list_verified_organizations(&self) -> Result<Vec<OrganizationRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM organizations WHERE is_verified = 1 ORDER BY created_at, rowid",
            ORG_COLUMNS
        ))?;
        let rows = stmt.query_map([], org_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// All organization slugs with their last update (sitemap)
    pub fn list_organization_slugs(&self) -> Result<Vec<(String, i64)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT slug, updated_at FROM organizations ORDER BY slug")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Update an organization's editable fields (None leaves a field unchanged)
    pub fn update_organization(
        &self,
        id: &str,
        name: Option<&str>,
        description: Option<&str>,
        logo_url: Option<&str>,
        org_type: Option<OrgType>,
        now: i64,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE organizations SET
                name = COALESCE(?, name),
                description = COALESCE(?, description),
                logo_url = COALESCE(?, logo_url),
                org_type = COALESCE(?, org_type),
                updated_at = ?
             WHERE id = ?",
            params![name, description, logo_url, org_type, now, id],
        )?;
        Ok(())
    }

    /// Set the verified flag
    pub fn set_organization_verified(&self, id: &str, verified: bool, now: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE organizations SET is_verified = ?, updated_at = ? WHERE id = ?",
            params![verified, now, id],
        )?;
        Ok(changed > 0)
    }

    /// Organizations the user belongs to in any role
    pub fn get_organizations_for_user(&self, user_id: &str) -> Result<Vec<(OrganizationRecord, MemberRole)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT o.id, o.slug, o.name, o.description, o.logo_url, o.owner_user_id, o.is_verified, o.is_personal_org, o.org_type, o.created_at, o.updated_at, cm.role
             FROM organizations o
             INNER JOIN community_members cm ON o.id = cm.community_id
             WHERE cm.user_id = ?
             ORDER BY o.name",
        )?;
        let rows = stmt.query_map(params![user_id], |row| Ok((org_from_row(row)?, row.get(11)?)))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ========================================================================
    // MEMBERS
    // ========================================================================

    /// Get one membership row
    pub fn get_community_member(&self, community_id: &str, user_id: &str) -> Result<Option<MemberRecord>> {
        let conn = self.conn.lock();
        optional(conn.query_row(
            "SELECT community_id, user_id, role, joined_at FROM community_members WHERE community_id = ? AND user_id = ?",
            params![community_id, user_id],
            member_from_row,
        ))
    }

    /// All members of a community, by join date
    pub fn get_community_members(&self, community_id: &str) -> Result<Vec<MemberRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT community_id, user_id, role, joined_at FROM community_members WHERE community_id = ? ORDER BY joined_at, user_id",
        )?;
        let rows = stmt.query_map(params![community_id], member_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Insert a membership row; returns false if one already exists
    pub fn add_community_member(&self, community_id: &str, user_id: &str, role: MemberRole, now: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO community_members (community_id, user_id, role, joined_at) VALUES (?, ?, ?, ?)",
            params![community_id, user_id, role, now],
        )?;
        Ok(inserted > 0)
    }

    /// Change a member's role (insert if missing)
    pub fn set_community_member_role(&self, community_id: &str, user_id: &str, role: MemberRole, now: i64) -> Result<()> {
        let conn = self.conn.lock();
        set_member_role_tx(&conn, community_id, user_id, role, now)
    }

    /// Remove a membership row; returns whether one existed
    pub fn remove_community_member(&self, community_id: &str, user_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM community_members WHERE community_id = ? AND user_id = ?",
            params![community_id, user_id],
        )?;
        Ok(removed > 0)
    }

    /// Number of membership rows in a community (any role)
    pub fn count_community_members(&self, community_id: &str) -> Result<i64> {
        let conn = self.conn.lock();
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM community_members WHERE community_id = ?",
            params![community_id],
            |row| row.get(0),
        )?)
    }
}
