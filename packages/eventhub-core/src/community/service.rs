//! # Community Service
//!
//! Organization CRUD. Membership operations live in `members.rs` as a
//! second `impl` block on the same service.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::Permissions;
use crate::community::MemberRole;
use crate::error::{Error, Result};
use crate::identity::CurrentUser;
use crate::ids::{generate_id, generate_short_code, slugify};
use crate::storage::{insert_member_tx, insert_organization_tx, Database, OrganizationRecord};

/// Maximum organization name length.
const MAX_NAME_LEN: usize = 120;

/// Numeric suffixes tried before falling back to a random one.
const SLUG_ATTEMPTS: u32 = 50;

/// Kind of organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrgType {
    #[default]
    Community,
    Company,
    University,
    Government,
    Other,
}

impl OrgType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrgType::Community => "community",
            OrgType::Company => "company",
            OrgType::University => "university",
            OrgType::Government => "government",
            OrgType::Other => "other",
        }
    }
}

impl FromStr for OrgType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "community" => Ok(OrgType::Community),
            "company" => Ok(OrgType::Company),
            "university" => Ok(OrgType::University),
            "government" => Ok(OrgType::Government),
            "other" => Ok(OrgType::Other),
            other => Err(Error::validation(format!("Unknown organization type '{}'", other))),
        }
    }
}

/// Input for [`CommunityService::create_organization`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrganization {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub org_type: OrgType,
    #[serde(default)]
    pub is_personal_org: bool,
}

impl NewOrganization {
    /// An organization with only a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Editable organization fields; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub org_type: Option<OrgType>,
}

/// Coordinates organization and membership operations.
///
/// Every mutating method re-resolves the caller's role through
/// [`Permissions`] before writing.
#[derive(Clone)]
pub struct CommunityService {
    db: Database,
    perms: Permissions,
}

impl CommunityService {
    /// Create a new community service backed by the given database.
    pub fn new(db: Database, perms: Permissions) -> Self {
        Self { db, perms }
    }

    pub(crate) fn db(&self) -> &Database {
        &self.db
    }

    pub(crate) fn perms(&self) -> &Permissions {
        &self.perms
    }

    /// Create an organization owned by `user`.
    ///
    /// The organization row and the owner's membership row are written in
    /// one transaction. New organizations start unverified.
    pub fn create_organization(&self, user: &CurrentUser, input: NewOrganization) -> Result<OrganizationRecord> {
        let name = input.name.trim();
        validate_name(name)?;
        if let Some(logo) = input.logo_url.as_deref() {
            validate_http_url(logo, "logoUrl")?;
        }

        let now = crate::time::now_timestamp();
        let org = OrganizationRecord {
            id: generate_id(),
            slug: self.unique_slug(name)?,
            name: name.to_string(),
            description: input.description.filter(|d| !d.trim().is_empty()),
            logo_url: input.logo_url,
            owner_user_id: user.id.clone(),
            is_verified: false,
            is_personal_org: input.is_personal_org,
            org_type: input.org_type,
            created_at: now,
            updated_at: now,
        };

        self.db.transaction(|tx| {
            insert_organization_tx(tx, &org)?;
            insert_member_tx(tx, &org.id, &user.id, MemberRole::Owner, now)
        })?;

        tracing::info!(org_id = %org.id, slug = %org.slug, owner = %user.id, "Organization created");
        Ok(org)
    }

    /// Get an organization by ID.
    pub fn get_organization(&self, id: &str) -> Result<OrganizationRecord> {
        self.db.get_organization(id)?.ok_or(Error::NotFound("Organization"))
    }

    /// Get an organization by slug.
    pub fn get_organization_by_slug(&self, slug: &str) -> Result<OrganizationRecord> {
        self.db
            .get_organization_by_slug(slug)?
            .ok_or(Error::NotFound("Organization"))
    }

    /// Update an organization's editable fields (managers only).
    pub fn update_organization(
        &self,
        user: &CurrentUser,
        id: &str,
        update: OrganizationUpdate,
    ) -> Result<OrganizationRecord> {
        self.get_organization(id)?;
        self.perms.require_manage_organization(user, id)?;

        let name = update.name.as_deref().map(str::trim);
        if let Some(name) = name {
            validate_name(name)?;
        }
        if let Some(logo) = update.logo_url.as_deref() {
            validate_http_url(logo, "logoUrl")?;
        }

        self.db.update_organization(
            id,
            name,
            update.description.as_deref(),
            update.logo_url.as_deref(),
            update.org_type,
            crate::time::now_timestamp(),
        )?;
        self.get_organization(id)
    }

    /// Set or clear the verified flag (god mode only).
    pub fn set_verified(&self, user: &CurrentUser, id: &str, verified: bool) -> Result<OrganizationRecord> {
        self.perms.require_god(user)?;
        if !self
            .db
            .set_organization_verified(id, verified, crate::time::now_timestamp())?
        {
            return Err(Error::NotFound("Organization"));
        }
        tracing::info!(org_id = %id, verified, by = %user.id, "Organization verification changed");
        self.get_organization(id)
    }

    /// Organizations the user belongs to, with their role in each.
    pub fn organizations_for_user(&self, user_id: &str) -> Result<Vec<(OrganizationRecord, MemberRole)>> {
        self.db.get_organizations_for_user(user_id)
    }

    fn unique_slug(&self, name: &str) -> Result<String> {
        let base = slugify(name);
        if !self.db.organization_slug_exists(&base)? {
            return Ok(base);
        }
        for n in 2..=SLUG_ATTEMPTS {
            let candidate = format!("{}-{}", base, n);
            if !self.db.organization_slug_exists(&candidate)? {
                return Ok(candidate);
            }
        }
        Ok(format!("{}-{}", base, generate_short_code().to_lowercase()))
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::validation("Name is required"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(Error::validation(format!(
            "Name must be at most {} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(())
}

/// Accept only absolute http(s) URLs.
pub(crate) fn validate_http_url(url: &str, field: &str) -> Result<()> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    match rest {
        Some(rest) if !rest.is_empty() && !rest.starts_with('/') && !rest.contains(char::is_whitespace) => Ok(()),
        _ => Err(Error::validation(format!("{} must be an http(s) URL", field))),
    }
}
