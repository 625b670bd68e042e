//! Organizations and membership.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use eventhub_core::community::{MemberRole, NewOrganization, OrganizationUpdate};

use crate::auth::{AuthUser, MaybeUser};
use crate::error::ApiResult;
use crate::state::AppState;

/// POST /api/organizations
pub async fn create(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(input): Json<NewOrganization>,
) -> ApiResult<impl IntoResponse> {
    let org = state.communities.create_organization(&user, input)?;
    Ok((StatusCode::CREATED, Json(org)))
}

/// GET /api/organizations/:slug
///
/// Falls back to the id so links built from either keep working.
pub async fn get(State(state): State<AppState>, Path(key): Path<String>) -> ApiResult<impl IntoResponse> {
    let org = match state.communities.get_organization_by_slug(&key) {
        Ok(org) => org,
        Err(eventhub_core::Error::NotFound(_)) => state.communities.get_organization(&key)?,
        Err(e) => return Err(e.into()),
    };
    let members = state.db.count_community_members(&org.id)?;
    Ok(Json(json!({ "organization": org, "memberCount": members })))
}

/// PATCH /api/organizations/:id
pub async fn update(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(update): Json<OrganizationUpdate>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.communities.update_organization(&user, &id, update)?))
}

/// GET /api/organizations/:id/role
pub async fn role(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let role = state
        .perms
        .role_for(viewer.as_ref().map(|u| u.id.as_str()), &id)?;
    let can_manage = state.perms.can_manage_organization(viewer.as_ref(), &id)?;
    Ok(Json(json!({ "role": role, "canManage": can_manage })))
}

/// GET /api/organizations/:id/members
pub async fn members(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    Ok(Json(json!({ "members": state.communities.list_members(&id)? })))
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: MemberRole,
}

/// PUT /api/organizations/:id/members/:user_id
pub async fn set_role(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((id, target)): Path<(String, String)>,
    Json(request): Json<RoleRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.communities.set_member_role(&user, &id, &target, request.role)?))
}

/// DELETE /api/organizations/:id/members/:user_id
pub async fn remove_member(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((id, target)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    state.communities.remove_member(&user, &id, &target)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/organizations/:id/follow
pub async fn follow(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let role = state.communities.follow(&user, &id)?;
    Ok(Json(json!({ "role": role })))
}

/// DELETE /api/organizations/:id/follow
pub async fn unfollow(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let unfollowed = state.communities.unfollow(&user, &id)?;
    Ok(Json(json!({ "unfollowed": unfollowed })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub user_id: String,
}

/// POST /api/organizations/:id/transfer
pub async fn transfer(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(request): Json<TransferRequest>,
) -> ApiResult<impl IntoResponse> {
    state.communities.transfer_ownership(&user, &id, &request.user_id)?;
    Ok(StatusCode::NO_CONTENT)
}
