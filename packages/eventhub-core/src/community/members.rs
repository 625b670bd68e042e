//! # Member Management
//!
//! Follow, unfollow, role changes, removal and ownership transfer.

use serde::Serialize;

use super::MemberRole;
use crate::error::{Error, Result};
use crate::identity::CurrentUser;
use crate::storage::{set_member_role_tx, set_organization_owner_tx, MemberRecord};

/// A member as listed to clients, with cached profile fields.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberView {
    pub user_id: String,
    pub role: MemberRole,
    pub joined_at: i64,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl super::CommunityService {
    /// Follow a community.
    ///
    /// Never downgrades an existing membership; returns the caller's role
    /// after the call.
    pub fn follow(&self, user: &CurrentUser, community_id: &str) -> Result<MemberRole> {
        self.get_organization(community_id)?;

        let current = self.perms().role_for(Some(&user.id), community_id)?;
        if current.is_member() {
            return Ok(current);
        }

        self.db().add_community_member(
            community_id,
            &user.id,
            MemberRole::Follower,
            crate::time::now_timestamp(),
        )?;
        tracing::debug!(community_id = %community_id, user = %user.id, "Followed community");
        Ok(MemberRole::Follower)
    }

    /// Stop following a community. Only a `follower` row is removed.
    pub fn unfollow(&self, user: &CurrentUser, community_id: &str) -> Result<bool> {
        match self.db().get_community_member(community_id, &user.id)? {
            Some(m) if m.role == MemberRole::Follower => {
                self.db().remove_community_member(community_id, &user.id)
            }
            _ => Ok(false),
        }
    }

    /// Change a member's role.
    ///
    /// `owner` cannot be granted here (see [`Self::transfer_ownership`]), the
    /// organization owner's role is fixed, and only the owner or god mode may
    /// change another admin.
    pub fn set_member_role(
        &self,
        actor: &CurrentUser,
        community_id: &str,
        target_user_id: &str,
        role: MemberRole,
    ) -> Result<MemberRecord> {
        let org = self.get_organization(community_id)?;
        self.perms().require_manage_organization(actor, community_id)?;

        if !role.is_assignable() {
            return Err(Error::validation(format!("Role '{}' cannot be assigned", role)));
        }
        if org.owner_user_id == target_user_id {
            return Err(Error::forbidden("The owner's role cannot be changed"));
        }

        let target_role = self.perms().role_for(Some(target_user_id), community_id)?;
        if target_role == MemberRole::Admin && !self.is_owner_or_god(actor, &org.owner_user_id) {
            return Err(Error::forbidden("Only the owner can change an admin"));
        }

        self.db()
            .set_community_member_role(community_id, target_user_id, role, crate::time::now_timestamp())?;
        tracing::info!(
            community_id = %community_id,
            target = %target_user_id,
            from = %target_role,
            to = %role,
            by = %actor.id,
            "Member role changed"
        );

        self.db()
            .get_community_member(community_id, target_user_id)?
            .ok_or(Error::NotFound("Member"))
    }

    /// Remove a member. Members may remove themselves; the owner cannot be
    /// removed.
    pub fn remove_member(&self, actor: &CurrentUser, community_id: &str, target_user_id: &str) -> Result<()> {
        let org = self.get_organization(community_id)?;
        if org.owner_user_id == target_user_id {
            return Err(Error::forbidden("The owner cannot be removed"));
        }

        if actor.id != target_user_id {
            self.perms().require_manage_organization(actor, community_id)?;
            let target_role = self.perms().role_for(Some(target_user_id), community_id)?;
            if target_role == MemberRole::Admin && !self.is_owner_or_god(actor, &org.owner_user_id) {
                return Err(Error::forbidden("Only the owner can remove an admin"));
            }
        }

        if !self.db().remove_community_member(community_id, target_user_id)? {
            return Err(Error::NotFound("Member"));
        }
        tracing::info!(community_id = %community_id, target = %target_user_id, by = %actor.id, "Member removed");
        Ok(())
    }

    /// Hand the organization to an existing member.
    ///
    /// The new owner gets `owner`, the previous owner becomes `admin`; both
    /// rows and `owner_user_id` change in one transaction.
    pub fn transfer_ownership(&self, actor: &CurrentUser, community_id: &str, new_owner_id: &str) -> Result<()> {
        let org = self.get_organization(community_id)?;
        if !self.is_owner_or_god(actor, &org.owner_user_id) {
            return Err(Error::forbidden("Only the owner can transfer ownership"));
        }
        if org.owner_user_id == new_owner_id {
            return Ok(());
        }
        if self.db().get_community_member(community_id, new_owner_id)?.is_none() {
            return Err(Error::validation("The new owner must already be a member"));
        }

        let now = crate::time::now_timestamp();
        let previous = org.owner_user_id.clone();
        self.db().transaction(|tx| {
            set_organization_owner_tx(tx, community_id, new_owner_id, now)?;
            set_member_role_tx(tx, community_id, new_owner_id, MemberRole::Owner, now)?;
            set_member_role_tx(tx, community_id, &previous, MemberRole::Admin, now)
        })?;

        tracing::info!(community_id = %community_id, from = %previous, to = %new_owner_id, "Ownership transferred");
        Ok(())
    }

    /// All members with their cached profiles, by join date.
    pub fn list_members(&self, community_id: &str) -> Result<Vec<MemberView>> {
        self.get_organization(community_id)?;
        let members = self.db().get_community_members(community_id)?;

        let mut views = Vec::with_capacity(members.len());
        for m in members {
            let profile = self.db().get_user(&m.user_id)?;
            views.push(MemberView {
                user_id: m.user_id,
                role: m.role,
                joined_at: m.joined_at,
                display_name: profile.as_ref().and_then(|p| p.display_name.clone()),
                avatar_url: profile.and_then(|p| p.avatar_url),
            });
        }
        Ok(views)
    }

    fn is_owner_or_god(&self, actor: &CurrentUser, owner_user_id: &str) -> bool {
        actor.id == owner_user_id || self.perms().is_god(Some(actor))
    }
}

#[cfg(test)]
mod tests {
    use crate::community::{CommunityService, MemberRole, NewOrganization, Permissions};
    use crate::error::Error;
    use crate::identity::{CurrentUser, GodMode};
    use crate::storage::{Database, OrganizationRecord};

    fn user(id: &str) -> CurrentUser {
        CurrentUser::verified(id, format!("{}@example.com", id))
    }

    fn setup() -> (CommunityService, OrganizationRecord) {
        let db = Database::open(None).unwrap();
        let perms = Permissions::new(db.clone(), GodMode::from_list("root@example.com"));
        let svc = CommunityService::new(db, perms);
        let org = svc
            .create_organization(&user("owner"), NewOrganization::named("Lima Rust"))
            .unwrap();
        (svc, org)
    }

    #[test]
    fn test_follow_never_downgrades() {
        let (svc, org) = setup();
        assert_eq!(svc.follow(&user("owner"), &org.id).unwrap(), MemberRole::Owner);
        assert_eq!(svc.follow(&user("fan"), &org.id).unwrap(), MemberRole::Follower);
        assert_eq!(svc.follow(&user("fan"), &org.id).unwrap(), MemberRole::Follower);
        assert!(matches!(svc.follow(&user("fan"), "missing"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_unfollow_only_removes_followers() {
        let (svc, org) = setup();
        svc.follow(&user("fan"), &org.id).unwrap();
        svc.set_member_role(&user("owner"), &org.id, "dev", MemberRole::Member).unwrap();

        assert!(svc.unfollow(&user("fan"), &org.id).unwrap());
        assert!(!svc.unfollow(&user("fan"), &org.id).unwrap());
        assert!(!svc.unfollow(&user("dev"), &org.id).unwrap());
        assert!(!svc.unfollow(&user("owner"), &org.id).unwrap());
    }

    #[test]
    fn test_set_role_rules() {
        let (svc, org) = setup();
        let owner = user("owner");

        svc.set_member_role(&owner, &org.id, "ana", MemberRole::Admin).unwrap();
        svc.set_member_role(&owner, &org.id, "ben", MemberRole::Admin).unwrap();

        // Owner cannot be granted or changed
        assert!(matches!(
            svc.set_member_role(&owner, &org.id, "ana", MemberRole::Owner),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            svc.set_member_role(&user("ana"), &org.id, "owner", MemberRole::Member),
            Err(Error::Forbidden(_))
        ));
        // Admins cannot change other admins
        assert!(matches!(
            svc.set_member_role(&user("ana"), &org.id, "ben", MemberRole::Member),
            Err(Error::Forbidden(_))
        ));
        // but can manage regular members
        let carl = svc.set_member_role(&user("ana"), &org.id, "carl", MemberRole::Member).unwrap();
        assert_eq!(carl.role, MemberRole::Member);
        // Non-managers cannot change anything
        assert!(matches!(
            svc.set_member_role(&user("carl"), &org.id, "dan", MemberRole::Member),
            Err(Error::Forbidden(_))
        ));
        // God mode can demote an admin
        let root = CurrentUser::verified("root", "root@example.com");
        let ben = svc.set_member_role(&root, &org.id, "ben", MemberRole::Follower).unwrap();
        assert_eq!(ben.role, MemberRole::Follower);
    }

    #[test]
    fn test_remove_member() {
        let (svc, org) = setup();
        svc.follow(&user("fan"), &org.id).unwrap();
        svc.set_member_role(&user("owner"), &org.id, "ana", MemberRole::Admin).unwrap();

        assert!(matches!(
            svc.remove_member(&user("ana"), &org.id, "owner"),
            Err(Error::Forbidden(_))
        ));
        assert!(matches!(
            svc.remove_member(&user("fan"), &org.id, "ana"),
            Err(Error::Forbidden(_))
        ));
        svc.remove_member(&user("fan"), &org.id, "fan").unwrap();
        assert!(matches!(
            svc.remove_member(&user("owner"), &org.id, "fan"),
            Err(Error::NotFound(_))
        ));
        svc.remove_member(&user("owner"), &org.id, "ana").unwrap();
    }

    #[test]
    fn test_transfer_ownership() {
        let (svc, org) = setup();
        svc.set_member_role(&user("owner"), &org.id, "ana", MemberRole::Member).unwrap();

        assert!(matches!(
            svc.transfer_ownership(&user("ana"), &org.id, "ana"),
            Err(Error::Forbidden(_))
        ));
        assert!(matches!(
            svc.transfer_ownership(&user("owner"), &org.id, "stranger"),
            Err(Error::Validation(_))
        ));

        svc.transfer_ownership(&user("owner"), &org.id, "ana").unwrap();

        let org = svc.get_organization(&org.id).unwrap();
        assert_eq!(org.owner_user_id, "ana");
        assert_eq!(svc.perms().role_for(Some("ana"), &org.id).unwrap(), MemberRole::Owner);
        assert_eq!(svc.perms().role_for(Some("owner"), &org.id).unwrap(), MemberRole::Admin);
    }

    #[test]
    fn test_list_members_includes_profiles() {
        let (svc, org) = setup();
        let mut fan = user("fan");
        fan.display_name = Some("Fan Person".into());
        svc.db().upsert_user(&fan, 10).unwrap();
        svc.follow(&fan, &org.id).unwrap();

        let members = svc.list_members(&org.id).unwrap();
        assert_eq!(members.len(), 2);
        let listed = members.iter().find(|m| m.user_id == "fan").unwrap();
        assert_eq!(listed.role, MemberRole::Follower);
        assert_eq!(listed.display_name.as_deref(), Some("Fan Person"));
    }
}
