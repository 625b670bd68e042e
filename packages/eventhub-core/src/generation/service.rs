//! Badge and gift card requests, status polling and worker callbacks.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{AssetPolicy, GenerationKind, GenerationStatus, JobQueue};
use crate::community::{MemberRole, Permissions};
use crate::error::{Error, Result};
use crate::identity::CurrentUser;
use crate::ids::{generate_id, generate_token};
use crate::storage::{
    insert_badge_tx, insert_gift_card_tx, insert_outbox_tx, next_badge_number_tx, BadgeRecord, Database,
    GiftCardRecord, OutboxRecord,
};

const MAX_PERSON_NAME_LEN: usize = 80;
const MAX_MESSAGE_LEN: usize = 500;
const MAX_STYLE_LEN: usize = 32;

/// Returned by [`GenerationService::request_badge`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeTicket {
    pub token: String,
    pub badge_number: i64,
}

/// Returned by [`GenerationService::request_gift_card`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GiftCardTicket {
    pub token: String,
}

/// Gift card request body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGiftCard {
    pub recipient_name: String,
    #[serde(default)]
    pub message: Option<String>,
    pub style: String,
    pub photo_url: String,
}

/// Public badge status, looked up by share token.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeStatusView {
    pub status: GenerationStatus,
    pub generated_image_url: Option<String>,
    pub generated_background_url: Option<String>,
    pub member_name: String,
    pub member_role: MemberRole,
    pub badge_number: i64,
    pub error_message: Option<String>,
    pub community_name: String,
    pub community_slug: String,
    pub community_logo: Option<String>,
}

/// Public gift card status.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftCardStatusView {
    pub status: GenerationStatus,
    pub generated_image_url: Option<String>,
    pub generated_background_url: Option<String>,
    pub recipient_name: String,
    pub message: Option<String>,
    pub style: String,
    pub error_message: Option<String>,
}

/// Status report posted by the generation worker.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationCallback {
    pub kind: GenerationKind,
    pub token: String,
    pub status: GenerationStatus,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub background_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Badge and gift card orchestration.
#[derive(Clone)]
pub struct GenerationService {
    pub(super) db: Database,
    perms: Permissions,
    pub(super) queue: Arc<dyn JobQueue>,
    assets: AssetPolicy,
}

impl GenerationService {
    pub fn new(db: Database, perms: Permissions, queue: Arc<dyn JobQueue>, assets: AssetPolicy) -> Self {
        Self {
            db,
            perms,
            queue,
            assets,
        }
    }

    pub fn assets(&self) -> &AssetPolicy {
        &self.assets
    }

    // ========================================================================
    // VALIDATION
    // ========================================================================

    /// Checks on a badge request that need no stored state: photo host and
    /// member name. A blank name falls back to the user's display name.
    /// Returns the name the badge will carry.
    pub fn validate_badge_request(&self, user: &CurrentUser, photo_url: &str, member_name: &str) -> Result<String> {
        self.assets.validate(photo_url)?;
        let member_name = match member_name.trim() {
            "" => user.display_name.as_deref().map(str::trim).unwrap_or_default(),
            name => name,
        };
        validate_person_name(member_name, "Member name")?;
        Ok(member_name.to_string())
    }

    /// Checks on a gift card request that need no stored state.
    pub fn validate_gift_request(&self, input: &NewGiftCard) -> Result<()> {
        self.prepare_gift(input).map(|_| ())
    }

    fn prepare_gift(&self, input: &NewGiftCard) -> Result<GiftFields> {
        self.assets.validate(&input.photo_url)?;
        let recipient_name = input.recipient_name.trim().to_string();
        validate_person_name(&recipient_name, "Recipient name")?;
        let message = input
            .message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(String::from);
        if message.as_ref().map_or(false, |m| m.chars().count() > MAX_MESSAGE_LEN) {
            return Err(Error::validation(format!(
                "Message must be at most {} characters",
                MAX_MESSAGE_LEN
            )));
        }
        let style = validate_style(&input.style)?;
        Ok(GiftFields {
            recipient_name,
            message,
            style,
        })
    }

    // ========================================================================
    // REQUESTS
    // ========================================================================

    /// Create a badge for a member of `community_id` and start generation.
    ///
    /// Followers count as members. The badge and its outbox row commit
    /// together; the job is then dispatched inline, and a failed dispatch is
    /// left for the outbox worker.
    pub async fn request_badge(
        &self,
        user: &CurrentUser,
        community_id: &str,
        photo_url: &str,
        member_name: &str,
    ) -> Result<BadgeTicket> {
        let member_name = self.validate_badge_request(user, photo_url, member_name)?;

        let org = self
            .db
            .get_organization(community_id)?
            .ok_or(Error::NotFound("Community"))?;
        let role = self.perms.role_for(Some(&user.id), community_id)?;
        if !role.is_member() {
            return Err(Error::forbidden("Only community members can generate a badge"));
        }

        let now = crate::time::now_timestamp();
        let token = generate_token();
        let badge_id = generate_id();
        let outbox_id = generate_id();
        let photo_url = photo_url.trim().to_string();

        let badge_number = self.db.transaction(|tx| {
            let badge_number = next_badge_number_tx(tx, community_id)?;
            let payload = json!({
                "badgeNumber": badge_number,
                "memberName": member_name,
                "memberRole": role,
                "photoUrl": photo_url,
                "communityName": org.name,
                "communitySlug": org.slug,
                "communityLogo": org.logo_url,
            });
            insert_badge_tx(
                tx,
                &BadgeRecord {
                    id: badge_id.clone(),
                    token: token.clone(),
                    community_id: community_id.to_string(),
                    user_id: user.id.clone(),
                    badge_number,
                    member_name: member_name.clone(),
                    member_role: role,
                    photo_url: photo_url.clone(),
                    status: GenerationStatus::Pending,
                    job_handle: None,
                    generated_image_url: None,
                    generated_background_url: None,
                    error_message: None,
                    created_at: now,
                    updated_at: now,
                },
            )?;
            insert_outbox_tx(
                tx,
                &OutboxRecord {
                    id: outbox_id.clone(),
                    kind: GenerationKind::Badge,
                    record_id: badge_id.clone(),
                    token: token.clone(),
                    payload: payload.to_string(),
                    attempts: 0,
                    last_error: None,
                    created_at: now,
                },
            )?;
            Ok(badge_number)
        })?;

        tracing::info!(
            community = %org.slug,
            user_id = %user.id,
            badge_number,
            role = %role.as_str(),
            "Badge requested"
        );
        self.dispatch_inline(&outbox_id).await;

        Ok(BadgeTicket { token, badge_number })
    }

    /// Create a gift card and start generation.
    pub async fn request_gift_card(&self, user: &CurrentUser, input: NewGiftCard) -> Result<GiftCardTicket> {
        let GiftFields {
            recipient_name,
            message,
            style,
        } = self.prepare_gift(&input)?;

        let now = crate::time::now_timestamp();
        let card = GiftCardRecord {
            id: generate_id(),
            token: generate_token(),
            user_id: user.id.clone(),
            recipient_name,
            message,
            style,
            photo_url: input.photo_url.trim().to_string(),
            status: GenerationStatus::Pending,
            job_handle: None,
            generated_image_url: None,
            generated_background_url: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        let outbox = OutboxRecord {
            id: generate_id(),
            kind: GenerationKind::GiftCard,
            record_id: card.id.clone(),
            token: card.token.clone(),
            payload: json!({
                "recipientName": card.recipient_name,
                "message": card.message,
                "style": card.style,
                "photoUrl": card.photo_url,
            })
            .to_string(),
            attempts: 0,
            last_error: None,
            created_at: now,
        };

        self.db.transaction(|tx| {
            insert_gift_card_tx(tx, &card)?;
            insert_outbox_tx(tx, &outbox)
        })?;

        tracing::info!(user_id = %user.id, style = %card.style, "Gift card requested");
        self.dispatch_inline(&outbox.id).await;

        Ok(GiftCardTicket { token: card.token })
    }

    async fn dispatch_inline(&self, outbox_id: &str) {
        if let Err(e) = self.dispatch_entry(outbox_id).await {
            tracing::warn!(outbox_id = %outbox_id, error = %e, "Inline dispatch failed; outbox worker will retry");
        }
    }

    // ========================================================================
    // STATUS
    // ========================================================================

    /// Badge status by share token.
    pub fn badge_status(&self, token: &str) -> Result<BadgeStatusView> {
        let badge = self.db.get_badge_by_token(token)?.ok_or(Error::NotFound("Badge"))?;
        let org = self
            .db
            .get_organization(&badge.community_id)?
            .ok_or(Error::NotFound("Community"))?;
        Ok(BadgeStatusView {
            status: badge.status,
            generated_image_url: badge.generated_image_url,
            generated_background_url: badge.generated_background_url,
            member_name: badge.member_name,
            member_role: badge.member_role,
            badge_number: badge.badge_number,
            error_message: badge.error_message,
            community_name: org.name,
            community_slug: org.slug,
            community_logo: org.logo_url,
        })
    }

    /// Gift card status by share token.
    pub fn gift_card_status(&self, token: &str) -> Result<GiftCardStatusView> {
        let card = self
            .db
            .get_gift_card_by_token(token)?
            .ok_or(Error::NotFound("Gift card"))?;
        Ok(GiftCardStatusView {
            status: card.status,
            generated_image_url: card.generated_image_url,
            generated_background_url: card.generated_background_url,
            recipient_name: card.recipient_name,
            message: card.message,
            style: card.style,
            error_message: card.error_message,
        })
    }

    // ========================================================================
    // CALLBACKS
    // ========================================================================

    /// Apply a worker status report. Repeating the current status is a no-op.
    pub fn apply_callback(&self, cb: GenerationCallback) -> Result<GenerationStatus> {
        let (record_id, current) = match cb.kind {
            GenerationKind::Badge => self
                .db
                .get_badge_by_token(&cb.token)?
                .map(|b| (b.id, b.status))
                .ok_or(Error::NotFound("Badge"))?,
            GenerationKind::GiftCard => self
                .db
                .get_gift_card_by_token(&cb.token)?
                .map(|g| (g.id, g.status))
                .ok_or(Error::NotFound("Gift card"))?,
        };
        if current == cb.status {
            return Ok(current);
        }
        let next = current.transition(cb.status)?;

        let error = match next {
            GenerationStatus::Completed if cb.image_url.is_none() => {
                return Err(Error::validation("Completed callbacks must carry imageUrl"));
            }
            GenerationStatus::Failed => Some(cb.error.as_deref().unwrap_or("generation failed")),
            _ => None,
        };

        let applied = self.db.update_generation(
            cb.kind,
            &record_id,
            current,
            next,
            cb.image_url.as_deref(),
            cb.background_url.as_deref(),
            error,
            crate::time::now_timestamp(),
        )?;
        if !applied {
            return Err(Error::Conflict("Generation status changed concurrently".into()));
        }

        tracing::info!(kind = %cb.kind, record_id = %record_id, from = %current, to = %next, "Generation status updated");
        Ok(next)
    }
}

/// Normalized gift card fields.
struct GiftFields {
    recipient_name: String,
    message: Option<String>,
    style: String,
}

fn validate_person_name(name: &str, field: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::validation(format!("{} is required", field)));
    }
    if name.chars().count() > MAX_PERSON_NAME_LEN {
        return Err(Error::validation(format!(
            "{} must be at most {} characters",
            field, MAX_PERSON_NAME_LEN
        )));
    }
    Ok(())
}

/// Styles are template identifiers owned by the worker: short lowercase
/// slugs.
fn validate_style(style: &str) -> Result<String> {
    let style = style.trim().to_lowercase();
    let ok = !style.is_empty()
        && style.len() <= MAX_STYLE_LEN
        && style
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if ok {
        Ok(style)
    } else {
        Err(Error::validation("Unknown gift card style"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::community::{CommunityService, NewOrganization};
    use crate::generation::MemoryQueue;
    use crate::identity::GodMode;

    struct Fixture {
        db: Database,
        queue: Arc<MemoryQueue>,
        svc: GenerationService,
        communities: CommunityService,
    }

    fn fixture() -> Fixture {
        let db = Database::open(None).unwrap();
        let perms = Permissions::new(db.clone(), GodMode::disabled());
        let queue = Arc::new(MemoryQueue::new());
        Fixture {
            svc: GenerationService::new(db.clone(), perms.clone(), queue.clone(), AssetPolicy::default()),
            communities: CommunityService::new(db.clone(), perms),
            queue,
            db,
        }
    }

    const PHOTO: &str = "https://utfs.io/f/me.png";

    fn alice() -> CurrentUser {
        CurrentUser::verified("alice", "alice@example.com")
    }

    fn bob() -> CurrentUser {
        CurrentUser::verified("bob", "bob@example.com")
    }

    fn gift() -> NewGiftCard {
        NewGiftCard {
            recipient_name: "Carla".into(),
            message: Some("Happy birthday".into()),
            style: "Festive".into(),
            photo_url: PHOTO.into(),
        }
    }

    #[tokio::test]
    async fn test_follower_gets_badge() {
        let f = fixture();
        let org = f
            .communities
            .create_organization(&alice(), NewOrganization::named("Rust Lima"))
            .unwrap();
        f.communities.follow(&bob(), &org.id).unwrap();

        let first = f.svc.request_badge(&bob(), &org.id, PHOTO, "Bob").await.unwrap();
        assert_eq!(first.badge_number, 1);
        let second = f.svc.request_badge(&alice(), &org.id, PHOTO, "Alice").await.unwrap();
        assert_eq!(second.badge_number, 2);

        // Dispatched inline: handle stored, outbox drained
        let badge = f.db.get_badge_by_token(&first.token).unwrap().unwrap();
        assert_eq!(badge.job_handle.as_deref(), Some("job-1"));
        assert_eq!(badge.member_role, MemberRole::Follower);
        assert!(f.db.list_outbox(10).unwrap().is_empty());

        let jobs = f.queue.jobs();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].kind, GenerationKind::Badge);
        assert_eq!(jobs[0].token, first.token);
        assert_eq!(jobs[0].payload["communityName"], "Rust Lima");
        assert_eq!(jobs[1].payload["memberRole"], "owner");
    }

    #[tokio::test]
    async fn test_badge_requires_membership() {
        let f = fixture();
        let org = f
            .communities
            .create_organization(&alice(), NewOrganization::named("Rust Lima"))
            .unwrap();

        let err = f.svc.request_badge(&bob(), &org.id, PHOTO, "Bob").await.unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
        let err = f.svc.request_badge(&bob(), "missing", PHOTO, "Bob").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(f.queue.jobs().is_empty());
    }

    #[tokio::test]
    async fn test_badge_rejects_foreign_photo() {
        let f = fixture();
        let org = f
            .communities
            .create_organization(&alice(), NewOrganization::named("Rust Lima"))
            .unwrap();
        let err = f
            .svc
            .request_badge(&alice(), &org.id, "https://evil.com/me.png", "Alice")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        let err = f.svc.request_badge(&alice(), &org.id, PHOTO, "   ").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_badge_status_view() {
        let f = fixture();
        let org = f
            .communities
            .create_organization(&alice(), NewOrganization::named("Rust Lima"))
            .unwrap();
        let ticket = f.svc.request_badge(&alice(), &org.id, PHOTO, "Alice").await.unwrap();

        let view = f.svc.badge_status(&ticket.token).unwrap();
        assert_eq!(view.status, GenerationStatus::Pending);
        assert_eq!(view.community_name, "Rust Lima");
        assert_eq!(view.community_slug, org.slug);
        assert_eq!(view.badge_number, 1);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["memberRole"], "owner");
        assert!(json.get("generatedImageUrl").is_some());

        assert!(matches!(f.svc.badge_status("nope"), Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_callbacks_follow_state_machine() {
        let f = fixture();
        let ticket = f.svc.request_gift_card(&alice(), gift()).await.unwrap();
        let cb = |status, image: Option<&str>| GenerationCallback {
            kind: GenerationKind::GiftCard,
            token: ticket.token.clone(),
            status,
            image_url: image.map(String::from),
            background_url: None,
            error: None,
        };

        assert_eq!(
            f.svc.apply_callback(cb(GenerationStatus::Generating, None)).unwrap(),
            GenerationStatus::Generating
        );
        // Duplicate delivery
        assert_eq!(
            f.svc.apply_callback(cb(GenerationStatus::Generating, None)).unwrap(),
            GenerationStatus::Generating
        );
        assert!(matches!(
            f.svc.apply_callback(cb(GenerationStatus::Completed, None)),
            Err(Error::Validation(_))
        ));
        f.svc
            .apply_callback(cb(GenerationStatus::Completed, Some("https://utfs.io/f/out.png")))
            .unwrap();

        let view = f.svc.gift_card_status(&ticket.token).unwrap();
        assert_eq!(view.status, GenerationStatus::Completed);
        assert_eq!(view.generated_image_url.as_deref(), Some("https://utfs.io/f/out.png"));
        assert_eq!(view.style, "festive");

        assert!(matches!(
            f.svc.apply_callback(cb(GenerationStatus::Failed, None)),
            Err(Error::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_callback_records_error() {
        let f = fixture();
        let ticket = f.svc.request_gift_card(&alice(), gift()).await.unwrap();
        f.svc
            .apply_callback(GenerationCallback {
                kind: GenerationKind::GiftCard,
                token: ticket.token.clone(),
                status: GenerationStatus::Failed,
                image_url: None,
                background_url: None,
                error: None,
            })
            .unwrap();
        let view = f.svc.gift_card_status(&ticket.token).unwrap();
        assert_eq!(view.error_message.as_deref(), Some("generation failed"));
    }

    #[test]
    fn test_validation_runs_without_storage() {
        let f = fixture();
        assert_eq!(f.svc.validate_badge_request(&bob(), PHOTO, "  Bob ").unwrap(), "Bob");
        assert!(matches!(
            f.svc.validate_badge_request(&bob(), PHOTO, "   "),
            Err(Error::Validation(_))
        ));
        let named = CurrentUser {
            display_name: Some("Roberto".into()),
            ..bob()
        };
        assert_eq!(f.svc.validate_badge_request(&named, PHOTO, "").unwrap(), "Roberto");

        assert!(f.svc.validate_gift_request(&gift()).is_ok());
        let mut bad_style = gift();
        bad_style.style = "Not A Slug!".into();
        assert!(matches!(f.svc.validate_gift_request(&bad_style), Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_gift_card_validation() {
        let f = fixture();
        let mut bad_style = gift();
        bad_style.style = "../etc".into();
        assert!(f.svc.request_gift_card(&alice(), bad_style).await.is_err());

        let mut long_message = gift();
        long_message.message = Some("x".repeat(MAX_MESSAGE_LEN + 1));
        assert!(f.svc.request_gift_card(&alice(), long_message).await.is_err());

        let mut no_name = gift();
        no_name.recipient_name = " ".into();
        assert!(f.svc.request_gift_card(&alice(), no_name).await.is_err());
    }
}
