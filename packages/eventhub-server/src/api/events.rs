//! Feed, sitemap, event CRUD, sponsors, winners and claim submission.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use eventhub_core::events::{EventUpdate, EventView, FeedQuery, FeedScope, NewEvent, NewSponsor, NewWinner};

use crate::auth::{AuthUser, MaybeUser};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

// ── Feed ─────────────────────────────────────────────────────────────────────

/// GET /api/feed?scope=&type=&format=&city=&status=&organization=&q=&sort=&cursor=&limit=
pub async fn feed(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Query(query): Query<FeedQuery>,
) -> ApiResult<impl IntoResponse> {
    if query.scope == FeedScope::Following && viewer.is_none() {
        return Err(ApiError::Unauthorized);
    }
    let page = state
        .events
        .feed(viewer.as_ref(), &query, eventhub_core::time::now_timestamp())?;
    Ok(Json(page))
}

/// GET /api/sitemap
pub async fn sitemap(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.events.sitemap()?))
}

// ── CRUD ─────────────────────────────────────────────────────────────────────

/// POST /api/events
///
/// God-mode submissions are approved at once; others start pending.
pub async fn create(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(input): Json<NewEvent>,
) -> ApiResult<impl IntoResponse> {
    let event = state.events.create_event(&user, input)?;
    Ok((
        StatusCode::CREATED,
        Json(EventView::at(event, eventhub_core::time::now_timestamp())),
    ))
}

/// GET /api/events/:key (id, slug or short code)
pub async fn get(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(key): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.events.get_event(viewer.as_ref(), &key)?))
}

/// PATCH /api/events/:id
pub async fn update(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(update): Json<EventUpdate>,
) -> ApiResult<impl IntoResponse> {
    let event = state.events.update_event(&user, &id, update)?;
    Ok(Json(EventView::at(event, eventhub_core::time::now_timestamp())))
}

/// DELETE /api/events/:id (god mode)
pub async fn delete(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.events.delete_event(&user, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/events/:id/permissions
///
/// Anonymous callers get `false`, never 401.
pub async fn permissions(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let can_manage = state.events.can_manage(viewer.as_ref(), &id)?;
    Ok(Json(json!({ "canManage": can_manage })))
}

/// GET /api/events/:id/hosts
///
/// Host e-mails stay private; clients only learn whether a claim link can
/// be sent.
pub async fn hosts(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let event = state.events.get_event(viewer.as_ref(), &id)?;
    let hosts: Vec<_> = state
        .db
        .list_event_hosts(&event.event.id)?
        .into_iter()
        .map(|h| {
            json!({
                "id": h.id,
                "name": h.name,
                "avatarUrl": h.avatar_url,
                "isPrimary": h.is_primary,
                "organizationId": h.organization_id,
                "claimable": h.email.is_some(),
            })
        })
        .collect();
    Ok(Json(json!({ "hosts": hosts })))
}

// ── Sponsors & Winners ───────────────────────────────────────────────────────

pub async fn sponsors(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    Ok(Json(json!({ "sponsors": state.events.list_sponsors(&id)? })))
}

pub async fn add_sponsor(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(input): Json<NewSponsor>,
) -> ApiResult<impl IntoResponse> {
    let sponsor = state.events.add_sponsor(&user, &id, input)?;
    Ok((StatusCode::CREATED, Json(sponsor)))
}

pub async fn winners(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    Ok(Json(json!({ "winners": state.events.list_winners(&id)? })))
}

pub async fn add_winner(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(input): Json<NewWinner>,
) -> ApiResult<impl IntoResponse> {
    let winner = state.events.add_winner(&user, &id, input)?;
    Ok((StatusCode::CREATED, Json(winner)))
}

// ── Claims ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostClaimRequest {
    pub host_id: String,
    #[serde(default)]
    pub organization_id: Option<String>,
}

/// POST /api/events/:id/host-claims
///
/// Mails a verification link to the host's address.
pub async fn host_claim(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(request): Json<HostClaimRequest>,
) -> ApiResult<impl IntoResponse> {
    let claim = state
        .claims
        .initiate_host_claim(&user, &id, &request.host_id, request.organization_id)
        .await?;
    Ok((StatusCode::CREATED, Json(claim)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizerClaimRequest {
    pub organization_id: String,
    #[serde(default)]
    pub note: Option<String>,
}

/// POST /api/events/:id/organizer-claims
pub async fn organizer_claim(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(request): Json<OrganizerClaimRequest>,
) -> ApiResult<impl IntoResponse> {
    let claim = state
        .claims
        .submit_organizer_claim(&user, &id, &request.organization_id, request.note)?;
    Ok((StatusCode::CREATED, Json(claim)))
}
