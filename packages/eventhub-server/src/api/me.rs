//! Health and the current user.

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;

/// Health check endpoint.
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "eventhub-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /api/me
///
/// The caller, whether god mode applies, and their memberships.
pub async fn me(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult<impl IntoResponse> {
    let memberships: Vec<_> = state
        .communities
        .organizations_for_user(&user.id)?
        .into_iter()
        .map(|(organization, role)| {
            json!({
                "organization": organization,
                "role": role,
                "canManage": role.can_manage(),
            })
        })
        .collect();
    let profile = state.db.get_user(&user.id)?;

    Ok(Json(json!({
        "user": user,
        "isGod": state.perms.is_god(Some(&user)),
        "lumaEmail": profile.as_ref().and_then(|p| p.luma_email.clone()),
        "lumaVerified": profile.map_or(false, |p| p.luma_verified),
        "memberships": memberships,
    })))
}
