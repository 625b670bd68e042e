//! God-mode moderation: approval queue, orphan assignment, organization
//! verification, organizer claims and host reconciliation.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use eventhub_core::claims::ClaimStatus;
use eventhub_core::events::{ApprovalState, EventView};
use eventhub_core::storage::EventRecord;

use super::LimitQuery;
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const DEFAULT_QUEUE_LIMIT: usize = 50;
const MAX_QUEUE_LIMIT: usize = 200;

/// GET /api/admin/pending
pub async fn pending(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<LimitQuery>,
) -> ApiResult<impl IntoResponse> {
    let (pending, orphans) = state
        .events
        .admin_queues(&user, query.clamped(DEFAULT_QUEUE_LIMIT, MAX_QUEUE_LIMIT))?;
    let now = eventhub_core::time::now_timestamp();
    let views = |events: Vec<EventRecord>| -> Vec<EventView> { events.into_iter().map(|e| EventView::at(e, now)).collect() };
    Ok(Json(json!({ "pending": views(pending), "orphans": views(orphans) })))
}

/// Optional body for approve/reject.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationRequest {
    /// Required to reverse an earlier decision.
    #[serde(default)]
    pub admin_override: bool,
}

async fn moderate(
    state: AppState,
    user: eventhub_core::CurrentUser,
    id: String,
    next: ApprovalState,
    body: Option<Json<ModerationRequest>>,
) -> ApiResult<Json<EventView>> {
    let admin_override = body.map(|Json(b)| b.admin_override).unwrap_or(false);
    let event = state.events.set_approval(&user, &id, next, admin_override)?;
    Ok(Json(EventView::at(event, eventhub_core::time::now_timestamp())))
}

/// POST /api/admin/events/:id/approve
pub async fn approve_event(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    body: Option<Json<ModerationRequest>>,
) -> ApiResult<impl IntoResponse> {
    moderate(state, user, id, ApprovalState::Approved, body).await
}

/// POST /api/admin/events/:id/reject
pub async fn reject_event(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    body: Option<Json<ModerationRequest>>,
) -> ApiResult<impl IntoResponse> {
    moderate(state, user, id, ApprovalState::Rejected, body).await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    pub organization_id: String,
}

/// POST /api/admin/events/:id/assign
pub async fn assign_event(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(request): Json<AssignRequest>,
) -> ApiResult<impl IntoResponse> {
    let event = state
        .events
        .assign_organization(&user, &id, &request.organization_id)?;
    Ok(Json(EventView::at(event, eventhub_core::time::now_timestamp())))
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    #[serde(default = "default_true")]
    pub verified: bool,
}

fn default_true() -> bool {
    true
}

/// POST /api/admin/organizations/:id/verify
pub async fn verify_organization(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    body: Option<Json<VerifyRequest>>,
) -> ApiResult<impl IntoResponse> {
    let verified = body.map(|Json(b)| b.verified).unwrap_or(true);
    Ok(Json(state.communities.set_verified(&user, &id, verified)?))
}

#[derive(Debug, Default, Deserialize)]
pub struct ClaimsQuery {
    #[serde(default)]
    pub status: Option<ClaimStatus>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// GET /api/admin/claims?status=&limit=
pub async fn claims(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<ClaimsQuery>,
) -> ApiResult<impl IntoResponse> {
    let limit = LimitQuery { limit: query.limit }.clamped(DEFAULT_QUEUE_LIMIT, MAX_QUEUE_LIMIT);
    let claims = state.claims.list_claims(&user, query.status, limit)?;
    Ok(Json(json!({ "claims": claims })))
}

/// POST /api/admin/claims/:id/approve
pub async fn approve_claim(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.claims.approve_claim(&user, &id)?))
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectClaimRequest {
    #[serde(default)]
    pub note: Option<String>,
}

/// POST /api/admin/claims/:id/reject
pub async fn reject_claim(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    body: Option<Json<RejectClaimRequest>>,
) -> ApiResult<impl IntoResponse> {
    let note = body.and_then(|Json(b)| b.note);
    Ok(Json(state.claims.reject_claim(&user, &id, note.as_deref())?))
}

/// POST /api/admin/reconcile
///
/// Runs one reconciliation pass now instead of waiting for the weekly
/// worker.
pub async fn reconcile(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult<impl IntoResponse> {
    state.perms.require_god(&user)?;
    let resolver = state.resolver.clone();
    let batch = state.config.reconcile_batch;
    let summary = tokio::task::spawn_blocking(move || resolver.reconcile_orphans(batch))
        .await
        .map_err(|e| ApiError::Internal(format!("reconcile task panicked: {}", e)))??;
    tracing::info!(by = %user.id, scanned = summary.scanned, matched = summary.matched, "Manual reconciliation");
    Ok(Json(summary))
}
