//! # Event Service
//!
//! Submission, lookup, editing and moderation of events.

use serde::{Deserialize, Serialize};

use super::approval::initial_state;
use super::status::EventStatus;
use super::types::{validate_dates, validate_title, EventSource, EventUpdate, NewEvent};
use super::ApprovalState;
use crate::community::{validate_http_url, Permissions};
use crate::error::{Error, Result};
use crate::identity::CurrentUser;
use crate::ids::{generate_id, generate_short_code, slugify};
use crate::storage::{Database, EventRecord, SponsorRecord, WinnerRecord};

/// Attempts at drawing an unused short code before giving up.
const SHORT_CODE_ATTEMPTS: usize = 10;

/// An event as returned to clients: the record plus derived fields.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventView {
    #[serde(flatten)]
    pub event: EventRecord,
    pub status: EventStatus,
    pub is_approved: bool,
}

impl EventView {
    /// Derive the view at `now`.
    pub fn at(event: EventRecord, now: i64) -> Self {
        let status = EventStatus::derive(
            event.starts_at,
            event.ends_at,
            event.registration_opens_at,
            event.registration_closes_at,
            now,
        );
        let is_approved = event.approval.is_approved();
        Self {
            event,
            status,
            is_approved,
        }
    }
}

/// Input for adding a sponsor.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSponsor {
    pub name: String,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub tier: Option<String>,
    #[serde(default)]
    pub position: i64,
}

/// Input for adding a winner.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWinner {
    pub team_name: String,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub prize: Option<String>,
    #[serde(default)]
    pub position: i64,
}

/// Event operations. Every mutation re-checks permissions.
#[derive(Clone)]
pub struct EventService {
    db: Database,
    perms: Permissions,
}

impl EventService {
    pub fn new(db: Database, perms: Permissions) -> Self {
        Self { db, perms }
    }

    pub(crate) fn db(&self) -> &Database {
        &self.db
    }

    /// Submit an event.
    ///
    /// With an organization the caller must manage it; without one the
    /// event is an orphan, which any authenticated user may submit.
    pub fn create_event(&self, user: &CurrentUser, input: NewEvent) -> Result<EventRecord> {
        validate_title(&input.title)?;
        validate_dates(
            input.starts_at,
            input.ends_at,
            input.registration_opens_at,
            input.registration_closes_at,
        )?;
        validate_optional_url(input.url.as_deref(), "url")?;
        validate_optional_url(input.cover_url.as_deref(), "coverUrl")?;

        let is_god = self.perms.is_god(Some(user));
        let organization_verified = match input.organization_id.as_deref() {
            Some(org_id) => {
                let org = self
                    .db
                    .get_organization(org_id)?
                    .ok_or(Error::NotFound("Organization"))?;
                self.perms.require_manage_organization(user, org_id)?;
                org.is_verified
            }
            None => false,
        };

        let title = input.title.trim().to_string();
        let (slug, short_code) = allocate_identifiers(&self.db, &title)?;
        let now = crate::time::now_timestamp();
        let event = EventRecord {
            id: generate_id(),
            slug,
            short_code,
            organization_id: input.organization_id,
            title,
            description: input.description,
            event_type: input.event_type,
            format: input.format,
            city: input.city,
            venue: input.venue,
            url: input.url,
            cover_url: input.cover_url,
            starts_at: input.starts_at,
            ends_at: input.ends_at,
            registration_opens_at: input.registration_opens_at,
            registration_closes_at: input.registration_closes_at,
            approval: initial_state(is_god, organization_verified),
            source: EventSource::Manual,
            external_id: None,
            submitted_by: Some(user.id.clone()),
            created_at: now,
            updated_at: now,
        };
        self.db.insert_event(&event)?;

        tracing::info!(
            event_id = %event.id,
            slug = %event.slug,
            approval = %event.approval,
            orphan = event.organization_id.is_none(),
            by = %user.id,
            "Event submitted"
        );
        Ok(event)
    }

    /// Find an event by ID, slug or short code (in that order).
    pub fn find_event(&self, key: &str) -> Result<Option<EventRecord>> {
        if let Some(e) = self.db.get_event(key)? {
            return Ok(Some(e));
        }
        if let Some(e) = self.db.get_event_by_slug(key)? {
            return Ok(Some(e));
        }
        self.db.get_event_by_short_code(key)
    }

    /// Public lookup: events that are not approved are only visible to
    /// their managers.
    pub fn get_event(&self, viewer: Option<&CurrentUser>, key: &str) -> Result<EventView> {
        let event = self.find_event(key)?.ok_or(Error::NotFound("Event"))?;
        if !event.approval.is_approved() && !self.perms.can_manage_event(viewer, &event)? {
            return Err(Error::NotFound("Event"));
        }
        Ok(EventView::at(event, crate::time::now_timestamp()))
    }

    /// Whether the viewer may manage the event.
    pub fn can_manage(&self, viewer: Option<&CurrentUser>, event_id: &str) -> Result<bool> {
        self.perms.can_manage_event_by_id(viewer, event_id)
    }

    /// Edit an event (managers only).
    pub fn update_event(&self, user: &CurrentUser, id: &str, update: EventUpdate) -> Result<EventRecord> {
        let mut event = self.db.get_event(id)?.ok_or(Error::NotFound("Event"))?;
        self.perms.require_manage_event(user, &event)?;

        if let Some(title) = update.title {
            validate_title(&title)?;
            event.title = title.trim().to_string();
        }
        if let Some(url) = update.url {
            validate_http_url(&url, "url")?;
            event.url = Some(url);
        }
        if let Some(cover) = update.cover_url {
            validate_http_url(&cover, "coverUrl")?;
            event.cover_url = Some(cover);
        }
        if update.description.is_some() {
            event.description = update.description;
        }
        if update.city.is_some() {
            event.city = update.city;
        }
        if update.venue.is_some() {
            event.venue = update.venue;
        }
        if let Some(t) = update.event_type {
            event.event_type = t;
        }
        if let Some(f) = update.format {
            event.format = f;
        }
        event.starts_at = update.starts_at.unwrap_or(event.starts_at);
        event.ends_at = update.ends_at.unwrap_or(event.ends_at);
        if update.registration_opens_at.is_some() {
            event.registration_opens_at = update.registration_opens_at;
        }
        if update.registration_closes_at.is_some() {
            event.registration_closes_at = update.registration_closes_at;
        }
        validate_dates(
            event.starts_at,
            event.ends_at,
            event.registration_opens_at,
            event.registration_closes_at,
        )?;

        event.updated_at = crate::time::now_timestamp();
        self.db.update_event(&event)?;
        tracing::info!(event_id = %event.id, by = %user.id, "Event updated");
        Ok(event)
    }

    /// Hard-delete an event (god mode only).
    pub fn delete_event(&self, user: &CurrentUser, id: &str) -> Result<()> {
        self.perms.require_god(user)?;
        if !self.db.delete_event(id)? {
            return Err(Error::NotFound("Event"));
        }
        tracing::warn!(event_id = %id, by = %user.id, "Event deleted");
        Ok(())
    }

    /// Move an event to a new approval state (god mode only).
    ///
    /// Leaving a decided state requires `admin_override`.
    pub fn set_approval(
        &self,
        user: &CurrentUser,
        id: &str,
        next: ApprovalState,
        admin_override: bool,
    ) -> Result<EventRecord> {
        self.perms.require_god(user)?;
        let mut event = self.db.get_event(id)?.ok_or(Error::NotFound("Event"))?;
        let next = event.approval.transition(next, admin_override)?;

        if next != event.approval {
            let now = crate::time::now_timestamp();
            self.db.set_event_approval(id, next, now)?;
            tracing::info!(event_id = %id, from = %event.approval, to = %next, by = %user.id, "Event moderated");
            event.approval = next;
            event.updated_at = now;
        }
        Ok(event)
    }

    /// Approve a pending event.
    pub fn approve(&self, user: &CurrentUser, id: &str) -> Result<EventRecord> {
        self.set_approval(user, id, ApprovalState::Approved, false)
    }

    /// Reject a pending event.
    pub fn reject(&self, user: &CurrentUser, id: &str) -> Result<EventRecord> {
        self.set_approval(user, id, ApprovalState::Rejected, false)
    }

    /// Attach an event to an organization (god mode only).
    pub fn assign_organization(&self, user: &CurrentUser, event_id: &str, organization_id: &str) -> Result<EventRecord> {
        self.perms.require_god(user)?;
        self.db
            .get_organization(organization_id)?
            .ok_or(Error::NotFound("Organization"))?;
        if !self
            .db
            .set_event_organization(event_id, Some(organization_id), crate::time::now_timestamp())?
        {
            return Err(Error::NotFound("Event"));
        }
        tracing::info!(event_id = %event_id, organization_id = %organization_id, by = %user.id, "Event assigned");
        self.db.get_event(event_id)?.ok_or(Error::NotFound("Event"))
    }

    /// Moderation queues: pending events and orphans (god mode only).
    pub fn admin_queues(&self, user: &CurrentUser, limit: usize) -> Result<(Vec<EventRecord>, Vec<EventRecord>)> {
        self.perms.require_god(user)?;
        Ok((
            self.db.list_pending_events(limit)?,
            self.db.list_orphan_events(limit)?,
        ))
    }

    // ========================================================================
    // SPONSORS & WINNERS
    // ========================================================================

    /// Add a sponsor (managers only).
    pub fn add_sponsor(&self, user: &CurrentUser, event_id: &str, input: NewSponsor) -> Result<SponsorRecord> {
        self.require_managed_event(user, event_id)?;
        if input.name.trim().is_empty() {
            return Err(Error::validation("Sponsor name is required"));
        }
        validate_optional_url(input.logo_url.as_deref(), "logoUrl")?;

        let sponsor = SponsorRecord {
            id: generate_id(),
            event_id: event_id.to_string(),
            name: input.name.trim().to_string(),
            logo_url: input.logo_url,
            tier: input.tier,
            position: input.position,
        };
        self.db.insert_sponsor(&sponsor)?;
        Ok(sponsor)
    }

    /// Sponsors of an event.
    pub fn list_sponsors(&self, event_id: &str) -> Result<Vec<SponsorRecord>> {
        self.db.list_sponsors(event_id)
    }

    /// Add a winner (managers only).
    pub fn add_winner(&self, user: &CurrentUser, event_id: &str, input: NewWinner) -> Result<WinnerRecord> {
        self.require_managed_event(user, event_id)?;
        if input.team_name.trim().is_empty() {
            return Err(Error::validation("Team name is required"));
        }

        let winner = WinnerRecord {
            id: generate_id(),
            event_id: event_id.to_string(),
            team_name: input.team_name.trim().to_string(),
            project_name: input.project_name,
            prize: input.prize,
            position: input.position,
        };
        self.db.insert_winner(&winner)?;
        Ok(winner)
    }

    /// Winners of an event.
    pub fn list_winners(&self, event_id: &str) -> Result<Vec<WinnerRecord>> {
        self.db.list_winners(event_id)
    }

    fn require_managed_event(&self, user: &CurrentUser, event_id: &str) -> Result<EventRecord> {
        let event = self.db.get_event(event_id)?.ok_or(Error::NotFound("Event"))?;
        self.perms.require_manage_event(user, &event)?;
        Ok(event)
    }
}

fn validate_optional_url(url: Option<&str>, field: &str) -> Result<()> {
    match url {
        Some(u) => validate_http_url(u, field),
        None => Ok(()),
    }
}

/// Pick an unused slug and short code for a new event.
///
/// The slug comes from the title; on collision the short code is appended.
pub(crate) fn allocate_identifiers(db: &Database, title: &str) -> Result<(String, String)> {
    let mut short_code = None;
    for _ in 0..SHORT_CODE_ATTEMPTS {
        let candidate = generate_short_code();
        if !db.event_short_code_exists(&candidate)? {
            short_code = Some(candidate);
            break;
        }
    }
    let short_code =
        short_code.ok_or_else(|| Error::Internal("Could not allocate a short code".into()))?;

    let base = slugify(title);
    let slug = if db.event_slug_exists(&base)? {
        format!("{}-{}", base, short_code.to_lowercase())
    } else {
        base
    };
    Ok((slug, short_code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::community::{CommunityService, NewOrganization};
    use crate::identity::GodMode;

    struct Fixture {
        events: EventService,
        communities: CommunityService,
    }

    fn fixture() -> Fixture {
        let db = Database::open(None).unwrap();
        let perms = Permissions::new(db.clone(), GodMode::from_list("root@example.com"));
        Fixture {
            events: EventService::new(db.clone(), perms.clone()),
            communities: CommunityService::new(db, perms),
        }
    }

    fn user(id: &str) -> CurrentUser {
        CurrentUser::verified(id, format!("{}@example.com", id))
    }

    fn root() -> CurrentUser {
        CurrentUser::verified("root", "root@example.com")
    }

    #[test]
    fn test_god_orphan_event_is_approved() {
        let f = fixture();
        let event = f
            .events
            .create_event(&root(), NewEvent::sample("Hack Lima", None))
            .unwrap();
        assert_eq!(event.approval, ApprovalState::Approved);
        assert!(event.organization_id.is_none());

        // Visible to anonymous readers without further action
        let view = f.events.get_event(None, &event.slug).unwrap();
        assert!(view.is_approved);
        assert_eq!(view.status, EventStatus::Open);
    }

    #[test]
    fn test_verified_org_auto_approves() {
        let f = fixture();
        let org = f
            .communities
            .create_organization(&user("owner"), NewOrganization::named("AWS UG Lima"))
            .unwrap();

        let pending = f
            .events
            .create_event(&user("owner"), NewEvent::sample("Before verify", Some(&org.id)))
            .unwrap();
        assert_eq!(pending.approval, ApprovalState::Pending);

        f.communities.set_verified(&root(), &org.id, true).unwrap();
        let approved = f
            .events
            .create_event(&user("owner"), NewEvent::sample("After verify", Some(&org.id)))
            .unwrap();
        assert_eq!(approved.approval, ApprovalState::Approved);
    }

    #[test]
    fn test_create_for_foreign_org_is_forbidden() {
        let f = fixture();
        let org = f
            .communities
            .create_organization(&user("owner"), NewOrganization::named("Rust Peru"))
            .unwrap();
        assert!(matches!(
            f.events
                .create_event(&user("mallory"), NewEvent::sample("Hijack", Some(&org.id))),
            Err(Error::Forbidden(_))
        ));
    }

    #[test]
    fn test_create_validates() {
        let f = fixture();
        let mut input = NewEvent::sample("Bad dates", None);
        input.ends_at = input.starts_at - 1;
        assert!(matches!(
            f.events.create_event(&user("u"), input),
            Err(Error::Validation(_))
        ));

        let mut input = NewEvent::sample("Bad url", None);
        input.url = Some("lu.ma/abc".into());
        assert!(matches!(
            f.events.create_event(&user("u"), input),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_pending_event_hidden_from_public() {
        let f = fixture();
        let event = f
            .events
            .create_event(&user("u"), NewEvent::sample("Community submission", None))
            .unwrap();
        assert_eq!(event.approval, ApprovalState::Pending);

        assert!(matches!(f.events.get_event(None, &event.id), Err(Error::NotFound(_))));
        // Submitter of an orphan is not a manager
        assert!(matches!(
            f.events.get_event(Some(&user("u")), &event.id),
            Err(Error::NotFound(_))
        ));
        assert!(f.events.get_event(Some(&root()), &event.short_code).is_ok());

        f.events.approve(&root(), &event.id).unwrap();
        assert!(f.events.get_event(None, &event.id).is_ok());
    }

    #[test]
    fn test_lookup_by_any_key_and_slug_collision() {
        let f = fixture();
        let a = f.events.create_event(&root(), NewEvent::sample("Rust Night", None)).unwrap();
        let b = f.events.create_event(&root(), NewEvent::sample("Rust Night", None)).unwrap();
        assert_eq!(a.slug, "rust-night");
        assert_ne!(a.slug, b.slug);
        assert!(b.slug.starts_with("rust-night-"));

        for key in [&b.id, &b.slug, &b.short_code] {
            assert_eq!(f.events.find_event(key).unwrap().unwrap().id, b.id);
        }
    }

    #[test]
    fn test_moderation_transitions() {
        let f = fixture();
        let event = f
            .events
            .create_event(&user("u"), NewEvent::sample("Queue me", None))
            .unwrap();

        assert!(matches!(f.events.approve(&user("u"), &event.id), Err(Error::Forbidden(_))));
        assert_eq!(f.events.reject(&root(), &event.id).unwrap().approval, ApprovalState::Rejected);
        assert_eq!(f.events.reject(&root(), &event.id).unwrap().approval, ApprovalState::Rejected);
        assert!(matches!(
            f.events.approve(&root(), &event.id),
            Err(Error::InvalidTransition { .. })
        ));
        let overridden = f
            .events
            .set_approval(&root(), &event.id, ApprovalState::Approved, true)
            .unwrap();
        assert_eq!(overridden.approval, ApprovalState::Approved);
    }

    #[test]
    fn test_update_and_delete() {
        let f = fixture();
        let org = f
            .communities
            .create_organization(&user("owner"), NewOrganization::named("Lima JS"))
            .unwrap();
        let event = f
            .events
            .create_event(&user("owner"), NewEvent::sample("JS Conf", Some(&org.id)))
            .unwrap();

        let update = EventUpdate {
            venue: Some("UTEC".into()),
            ..Default::default()
        };
        assert!(matches!(
            f.events.update_event(&user("other"), &event.id, update.clone()),
            Err(Error::Forbidden(_))
        ));
        let updated = f.events.update_event(&user("owner"), &event.id, update).unwrap();
        assert_eq!(updated.venue.as_deref(), Some("UTEC"));

        let bad = EventUpdate {
            ends_at: Some(event.starts_at - 10),
            ..Default::default()
        };
        assert!(f.events.update_event(&user("owner"), &event.id, bad).is_err());

        f.events
            .add_sponsor(
                &user("owner"),
                &event.id,
                NewSponsor {
                    name: "Acme".into(),
                    logo_url: None,
                    tier: Some("gold".into()),
                    position: 0,
                },
            )
            .unwrap();

        assert!(matches!(f.events.delete_event(&user("owner"), &event.id), Err(Error::Forbidden(_))));
        f.events.delete_event(&root(), &event.id).unwrap();
        assert!(f.events.find_event(&event.id).unwrap().is_none());
        assert!(f.events.list_sponsors(&event.id).unwrap().is_empty());
    }

    #[test]
    fn test_assign_orphan_and_queues() {
        let f = fixture();
        let org = f
            .communities
            .create_organization(&user("owner"), NewOrganization::named("Cloud Lima"))
            .unwrap();
        let event = f
            .events
            .create_event(&user("u"), NewEvent::sample("Orphaned", None))
            .unwrap();

        let (pending, orphans) = f.events.admin_queues(&root(), 50).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(orphans.len(), 1);

        let assigned = f.events.assign_organization(&root(), &event.id, &org.id).unwrap();
        assert_eq!(assigned.organization_id.as_deref(), Some(org.id.as_str()));
        assert!(f.events.can_manage(Some(&user("owner")), &event.id).unwrap());

        let (_, orphans) = f.events.admin_queues(&root(), 50).unwrap();
        assert!(orphans.is_empty());
    }
}
