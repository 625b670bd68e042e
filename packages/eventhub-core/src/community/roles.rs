//! # Role Resolution
//!
//! Effective role of a user in a community and the management checks built
//! on top of it.
//!
//! ## Resolution Order
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      ROLE RESOLUTION ORDER                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  1. No user (anonymous)            → NonMember                          │
//! │  2. organizations.owner_user_id    → Owner (even without a member row)  │
//! │  3. community_members row          → its role                           │
//! │  4. Otherwise                      → NonMember                          │
//! │                                                                         │
//! │  can_manage = god_mode(user) || role ∈ {Owner, Admin}                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing here is cached: every mutating service call resolves again.

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::identity::{CurrentUser, GodMode};
use crate::storage::{Database, EventRecord};

/// A user's role in a community.
///
/// `NonMember` is a real variant: "no membership row" is never folded into
/// `Follower`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Owner,
    Admin,
    Member,
    Follower,
    NonMember,
}

impl MemberRole {
    /// Stable string form (also the database value).
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Owner => "owner",
            MemberRole::Admin => "admin",
            MemberRole::Member => "member",
            MemberRole::Follower => "follower",
            MemberRole::NonMember => "non_member",
        }
    }

    /// Owners and admins manage the community and its events.
    pub fn can_manage(&self) -> bool {
        matches!(self, MemberRole::Owner | MemberRole::Admin)
    }

    /// Any membership row at all, followers included.
    pub fn is_member(&self) -> bool {
        !matches!(self, MemberRole::NonMember)
    }

    /// Roles that may be granted through a role change (owner moves only
    /// through ownership transfer; non-member means "remove").
    pub fn is_assignable(&self) -> bool {
        matches!(
            self,
            MemberRole::Admin | MemberRole::Member | MemberRole::Follower
        )
    }
}

impl FromStr for MemberRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "owner" => Ok(MemberRole::Owner),
            "admin" => Ok(MemberRole::Admin),
            "member" => Ok(MemberRole::Member),
            "follower" => Ok(MemberRole::Follower),
            "non_member" => Ok(MemberRole::NonMember),
            other => Err(Error::validation(format!("Unknown role '{}'", other))),
        }
    }
}

impl std::fmt::Display for MemberRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Permission resolver.
///
/// Holds the database and the injected [`GodMode`] policy. Cheap to clone.
#[derive(Clone)]
pub struct Permissions {
    db: Database,
    god_mode: Arc<GodMode>,
}

impl Permissions {
    /// Create a resolver over `db` with the given god-mode policy.
    pub fn new(db: Database, god_mode: GodMode) -> Self {
        Self {
            db,
            god_mode: Arc::new(god_mode),
        }
    }

    /// The god-mode policy in force.
    pub fn god_mode(&self) -> &GodMode {
        &self.god_mode
    }

    /// Whether this user bypasses all checks.
    pub fn is_god(&self, user: Option<&CurrentUser>) -> bool {
        self.god_mode.applies_to_opt(user)
    }

    /// Effective role of `user_id` in `community_id`.
    ///
    /// Unknown communities resolve to `NonMember`.
    pub fn role_for(&self, user_id: Option<&str>, community_id: &str) -> Result<MemberRole> {
        let user_id = match user_id {
            Some(id) => id,
            None => return Ok(MemberRole::NonMember),
        };

        if let Some(org) = self.db.get_organization(community_id)? {
            if org.owner_user_id == user_id {
                return Ok(MemberRole::Owner);
            }
        }

        Ok(self
            .db
            .get_community_member(community_id, user_id)?
            .map(|m| m.role)
            .unwrap_or(MemberRole::NonMember))
    }

    /// Owner/admin of the organization, or god mode.
    pub fn can_manage_organization(&self, user: Option<&CurrentUser>, community_id: &str) -> Result<bool> {
        let user = match user {
            Some(u) => u,
            None => return Ok(false),
        };
        if self.god_mode.applies_to(user) {
            return Ok(true);
        }
        Ok(self.role_for(Some(&user.id), community_id)?.can_manage())
    }

    /// Manager of the event's organization, or god mode. Orphan events are
    /// god-mode only.
    pub fn can_manage_event(&self, user: Option<&CurrentUser>, event: &EventRecord) -> Result<bool> {
        let user = match user {
            Some(u) => u,
            None => return Ok(false),
        };
        if self.god_mode.applies_to(user) {
            return Ok(true);
        }
        match event.organization_id.as_deref() {
            Some(org_id) => Ok(self.role_for(Some(&user.id), org_id)?.can_manage()),
            None => Ok(false),
        }
    }

    /// [`Permissions::can_manage_event`] by event ID; unknown events are
    /// not manageable.
    pub fn can_manage_event_by_id(&self, user: Option<&CurrentUser>, event_id: &str) -> Result<bool> {
        if user.is_none() {
            return Ok(false);
        }
        match self.db.get_event(event_id)? {
            Some(event) => self.can_manage_event(user, &event),
            None => Ok(false),
        }
    }

    /// Fail with `Forbidden` unless the user manages the organization.
    pub fn require_manage_organization(&self, user: &CurrentUser, community_id: &str) -> Result<()> {
        if self.can_manage_organization(Some(user), community_id)? {
            Ok(())
        } else {
            Err(Error::forbidden("You cannot manage this organization"))
        }
    }

    /// Fail with `Forbidden` unless the user manages the event.
    pub fn require_manage_event(&self, user: &CurrentUser, event: &EventRecord) -> Result<()> {
        if self.can_manage_event(Some(user), event)? {
            Ok(())
        } else {
            Err(Error::forbidden("You cannot manage this event"))
        }
    }

    /// Fail with `Forbidden` unless the user is in god mode.
    pub fn require_god(&self, user: &CurrentUser) -> Result<()> {
        if self.god_mode.applies_to(user) {
            Ok(())
        } else {
            Err(Error::forbidden("Administrator access required"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::community::{CommunityService, NewOrganization};
    use crate::events::{EventService, NewEvent};

    fn setup() -> (Database, Permissions, CommunityService) {
        let db = Database::open(None).unwrap();
        let perms = Permissions::new(db.clone(), GodMode::from_list("root@example.com"));
        let communities = CommunityService::new(db.clone(), perms.clone());
        (db, perms, communities)
    }

    fn owner() -> CurrentUser {
        CurrentUser::verified("owner-1", "owner@example.com")
    }

    #[test]
    fn test_role_strings() {
        for role in [
            MemberRole::Owner,
            MemberRole::Admin,
            MemberRole::Member,
            MemberRole::Follower,
            MemberRole::NonMember,
        ] {
            assert_eq!(role.as_str().parse::<MemberRole>().unwrap(), role);
        }
        assert!("moderator".parse::<MemberRole>().is_err());
    }

    #[test]
    fn test_can_manage_matrix() {
        assert!(MemberRole::Owner.can_manage());
        assert!(MemberRole::Admin.can_manage());
        assert!(!MemberRole::Member.can_manage());
        assert!(!MemberRole::Follower.can_manage());
        assert!(!MemberRole::NonMember.can_manage());
        assert!(MemberRole::Follower.is_member());
        assert!(!MemberRole::NonMember.is_member());
    }

    #[test]
    fn test_role_for_resolution() {
        let (_db, perms, communities) = setup();
        let org = communities
            .create_organization(&owner(), NewOrganization::named("Lima Devs"))
            .unwrap();

        assert_eq!(perms.role_for(None, &org.id).unwrap(), MemberRole::NonMember);
        assert_eq!(perms.role_for(Some("owner-1"), &org.id).unwrap(), MemberRole::Owner);
        assert_eq!(perms.role_for(Some("stranger"), &org.id).unwrap(), MemberRole::NonMember);
        assert_eq!(perms.role_for(Some("owner-1"), "missing").unwrap(), MemberRole::NonMember);

        let fan = CurrentUser::verified("fan", "fan@example.com");
        communities.follow(&fan, &org.id).unwrap();
        assert_eq!(perms.role_for(Some("fan"), &org.id).unwrap(), MemberRole::Follower);
        // Idempotent for unchanged data
        assert_eq!(perms.role_for(Some("fan"), &org.id).unwrap(), MemberRole::Follower);
    }

    #[test]
    fn test_god_mode_manages_everything() {
        let (db, perms, communities) = setup();
        let org = communities
            .create_organization(&owner(), NewOrganization::named("Cusco Tech"))
            .unwrap();
        let god = CurrentUser::verified("admin", "ROOT@example.com");

        assert!(perms.can_manage_organization(Some(&god), &org.id).unwrap());
        assert!(perms.can_manage_organization(Some(&owner()), &org.id).unwrap());
        assert!(!perms.can_manage_organization(None, &org.id).unwrap());

        let events = EventService::new(db, perms.clone());
        let orphan = events
            .create_event(&god, NewEvent::sample("Orphan meetup", None))
            .unwrap();
        assert!(perms.can_manage_event(Some(&god), &orphan).unwrap());
        assert!(!perms.can_manage_event(Some(&owner()), &orphan).unwrap());
    }

    #[test]
    fn test_stranger_cannot_manage_other_org_event() {
        let (db, perms, communities) = setup();
        let org = communities
            .create_organization(&owner(), NewOrganization::named("Arequipa JS"))
            .unwrap();
        let events = EventService::new(db, perms.clone());
        let event = events
            .create_event(&owner(), NewEvent::sample("JS Night", Some(&org.id)))
            .unwrap();

        let stranger = CurrentUser::verified("stranger", "stranger@example.com");
        assert!(!perms.can_manage_event_by_id(Some(&stranger), &event.id).unwrap());
        assert!(perms.can_manage_event_by_id(Some(&owner()), &event.id).unwrap());
        assert!(!perms.can_manage_event_by_id(None, &event.id).unwrap());
        assert!(!perms.can_manage_event_by_id(Some(&owner()), "missing").unwrap());
    }
}
