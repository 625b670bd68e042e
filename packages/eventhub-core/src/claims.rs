//! # Claims
//!
//! Two ways for a community to take over an event it did not create:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              CLAIMS                                     │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Host claim       user ──► token mailed to the host's address           │
//! │                        ──► /api/verify-host?token=… ──► approved        │
//! │                                                                         │
//! │  Organizer claim  manager submits ──► god-mode review ──► approved /    │
//! │                                                           rejected      │
//! │                                                                         │
//! │  approved ⇒ event.organization_id = claim.organization_id               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::community::Permissions;
use crate::error::{Error, Result};
use crate::identity::CurrentUser;
use crate::ids::{generate_id, generate_token};
use crate::mailer::{host_claim_email, Links, Mailer};
use crate::storage::{
    attach_orphan_event_tx, link_host_tx, resolve_claim_tx, ClaimRecord, Database, EventRecord,
};

/// Which claim flow a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimKind {
    Host,
    Organizer,
}

impl ClaimKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimKind::Host => "host",
            ClaimKind::Organizer => "organizer",
        }
    }
}

impl FromStr for ClaimKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "host" => Ok(ClaimKind::Host),
            "organizer" => Ok(ClaimKind::Organizer),
            other => Err(Error::validation(format!("Unknown claim kind '{}'", other))),
        }
    }
}

/// Review state of a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimStatus {
    Pending,
    Approved,
    Rejected,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Pending => "pending",
            ClaimStatus::Approved => "approved",
            ClaimStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for ClaimStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ClaimStatus::Pending),
            "approved" => Ok(ClaimStatus::Approved),
            "rejected" => Ok(ClaimStatus::Rejected),
            other => Err(Error::validation(format!("Unknown claim status '{}'", other))),
        }
    }
}

/// Claim workflows.
#[derive(Clone)]
pub struct ClaimService {
    db: Database,
    perms: Permissions,
    mailer: Arc<dyn Mailer>,
    links: Links,
}

impl ClaimService {
    pub fn new(db: Database, perms: Permissions, mailer: Arc<dyn Mailer>, links: Links) -> Self {
        Self {
            db,
            perms,
            mailer,
            links,
        }
    }

    /// Start a host claim: mail a single-use link to the host's address.
    ///
    /// When `organization_id` is given the caller must manage it; on
    /// verification the event is attached to that organization.
    pub async fn initiate_host_claim(
        &self,
        user: &CurrentUser,
        event_id: &str,
        host_id: &str,
        organization_id: Option<String>,
    ) -> Result<ClaimRecord> {
        let event = self.get_event(event_id)?;
        let host = self
            .db
            .get_event_host(host_id)?
            .filter(|h| h.event_id == event.id)
            .ok_or(Error::NotFound("Host"))?;
        if let Some(org_id) = organization_id.as_deref() {
            self.perms.require_manage_organization(user, org_id)?;
        }
        let email = host
            .email
            .clone()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| Error::validation("This host has no e-mail address to verify"))?;

        let token = generate_token();
        let claim = ClaimRecord {
            id: generate_id(),
            kind: ClaimKind::Host,
            event_id: event.id.clone(),
            host_id: Some(host.id.clone()),
            user_id: user.id.clone(),
            organization_id,
            email: Some(email.clone()),
            token: Some(token.clone()),
            status: ClaimStatus::Pending,
            note: None,
            created_at: crate::time::now_timestamp(),
            resolved_at: None,
        };
        self.db.insert_claim(&claim)?;

        let link = self.links.with_token("/api/verify-host", &token);
        if let Err(e) = self.mailer.send(host_claim_email(&email, &event.title, &link)).await {
            // Undelivered token: the claim could never be redeemed
            self.db.delete_claim(&claim.id)?;
            tracing::warn!(claim_id = %claim.id, error = %e, "Host claim e-mail failed; claim dropped");
            return Err(e);
        }

        tracing::info!(claim_id = %claim.id, event_id = %event.id, host = %host.name, by = %user.id, "Host claim initiated");
        Ok(claim)
    }

    /// Redeem a host-claim token.
    ///
    /// Approves the claim, burns the token, links the host row and attaches
    /// the event if it is still orphaned. Returns the claim and the event.
    pub fn verify_host_claim(&self, token: &str) -> Result<(ClaimRecord, EventRecord)> {
        let claim = self
            .db
            .get_claim_by_token(token)?
            .filter(|c| c.kind == ClaimKind::Host)
            .ok_or(Error::InvalidToken)?;

        self.apply_approval(&claim, None)?;
        tracing::info!(claim_id = %claim.id, event_id = %claim.event_id, "Host claim verified");

        let claim = self.db.get_claim(&claim.id)?.ok_or(Error::NotFound("Claim"))?;
        let event = self.get_event(&claim.event_id)?;
        Ok((claim, event))
    }

    /// Ask the admins to attach an event to an organization the caller
    /// manages.
    pub fn submit_organizer_claim(
        &self,
        user: &CurrentUser,
        event_id: &str,
        organization_id: &str,
        note: Option<String>,
    ) -> Result<ClaimRecord> {
        let event = self.get_event(event_id)?;
        self.db
            .get_organization(organization_id)?
            .ok_or(Error::NotFound("Organization"))?;
        self.perms.require_manage_organization(user, organization_id)?;
        if event.organization_id.as_deref() == Some(organization_id) {
            return Err(Error::Conflict("The event already belongs to this organization".into()));
        }

        let claim = ClaimRecord {
            id: generate_id(),
            kind: ClaimKind::Organizer,
            event_id: event.id,
            host_id: None,
            user_id: user.id.clone(),
            organization_id: Some(organization_id.to_string()),
            email: user.email.clone(),
            token: None,
            status: ClaimStatus::Pending,
            note: note.filter(|n| !n.trim().is_empty()),
            created_at: crate::time::now_timestamp(),
            resolved_at: None,
        };
        self.db.insert_claim(&claim)?;
        tracing::info!(claim_id = %claim.id, event_id = %event_id, organization_id = %organization_id, "Organizer claim submitted");
        Ok(claim)
    }

    /// Claims for review (god mode only).
    pub fn list_claims(&self, user: &CurrentUser, status: Option<ClaimStatus>, limit: usize) -> Result<Vec<ClaimRecord>> {
        self.perms.require_god(user)?;
        self.db.list_claims(status, limit)
    }

    /// Approve a pending claim (god mode only).
    ///
    /// Organizer claims move the event to the claimed organization even if
    /// it already had one.
    pub fn approve_claim(&self, user: &CurrentUser, claim_id: &str) -> Result<ClaimRecord> {
        self.perms.require_god(user)?;
        let claim = self.pending_claim(claim_id, ClaimStatus::Approved)?;
        self.apply_approval(&claim, Some(&user.id))?;
        self.db.get_claim(claim_id)?.ok_or(Error::NotFound("Claim"))
    }

    /// Reject a pending claim (god mode only).
    pub fn reject_claim(&self, user: &CurrentUser, claim_id: &str, note: Option<&str>) -> Result<ClaimRecord> {
        self.perms.require_god(user)?;
        let claim = self.pending_claim(claim_id, ClaimStatus::Rejected)?;
        let now = crate::time::now_timestamp();
        self.db
            .transaction(|tx| resolve_claim_tx(tx, &claim.id, ClaimStatus::Rejected, note, now))?;
        tracing::info!(claim_id = %claim_id, by = %user.id, "Claim rejected");
        self.db.get_claim(claim_id)?.ok_or(Error::NotFound("Claim"))
    }

    fn pending_claim(&self, claim_id: &str, next: ClaimStatus) -> Result<ClaimRecord> {
        let claim = self.db.get_claim(claim_id)?.ok_or(Error::NotFound("Claim"))?;
        if claim.status != ClaimStatus::Pending {
            return Err(Error::InvalidTransition {
                from: claim.status.as_str(),
                to: next.as_str(),
            });
        }
        Ok(claim)
    }

    fn apply_approval(&self, claim: &ClaimRecord, admin: Option<&str>) -> Result<()> {
        let now = crate::time::now_timestamp();
        let kind = claim.kind;
        self.db.transaction(|tx| {
            if !resolve_claim_tx(tx, &claim.id, ClaimStatus::Approved, None, now)? {
                return Err(Error::InvalidToken);
            }
            if let Some(host_id) = claim.host_id.as_deref() {
                link_host_tx(tx, host_id, claim.organization_id.as_deref())?;
            }
            if let Some(org_id) = claim.organization_id.as_deref() {
                match kind {
                    ClaimKind::Host => {
                        attach_orphan_event_tx(tx, &claim.event_id, org_id, now)?;
                    }
                    ClaimKind::Organizer => {
                        tx.execute(
                            "UPDATE events SET organization_id = ?, updated_at = ? WHERE id = ?",
                            rusqlite::params![org_id, now, claim.event_id],
                        )?;
                    }
                }
            }
            Ok(())
        })?;
        if let Some(admin) = admin {
            tracing::info!(claim_id = %claim.id, by = %admin, "Claim approved");
        }
        Ok(())
    }

    fn get_event(&self, event_id: &str) -> Result<EventRecord> {
        self.db.get_event(event_id)?.ok_or(Error::NotFound("Event"))
    }
}
