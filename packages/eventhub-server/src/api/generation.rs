//! Badge and gift card endpoints plus the worker callback.
//!
//! Checks on `POST /api/badge/generate` run in this order: authentication
//! (401), request fields (400), community (404), membership (403), hourly
//! limit (429). A request rejected before the limiter does not use a slot.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderValue},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};

use eventhub_core::generation::{GenerationCallback, NewGiftCard};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::rate_limit::{RateLimitStatus, RateLimiter};
use crate::state::AppState;

/// Header carrying the worker's shared secret.
pub const CALLBACK_SECRET_HEADER: &str = "x-callback-secret";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeRequest {
    pub community_id: String,
    pub photo_url: String,
    #[serde(default)]
    pub member_name: Option<String>,
}

fn consume(limiter: &RateLimiter, user_id: &str) -> ApiResult<RateLimitStatus> {
    limiter
        .check(user_id, eventhub_core::time::now_timestamp())
        .map_err(|e| {
            tracing::info!(user_id = %user_id, retry_after = e.retry_after_secs, "Generation rate limit hit");
            ApiError::RateLimited {
                retry_after_secs: e.retry_after_secs,
            }
        })
}

fn remaining_header(status: RateLimitStatus) -> [(&'static str, HeaderValue); 1] {
    [("x-ratelimit-remaining", HeaderValue::from(status.remaining))]
}

/// POST /api/badge/generate
pub async fn generate_badge(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(request): Json<BadgeRequest>,
) -> ApiResult<impl IntoResponse> {
    let member_name = state.generation.validate_badge_request(
        &user,
        &request.photo_url,
        request.member_name.as_deref().unwrap_or_default(),
    )?;
    state.communities.get_organization(&request.community_id)?;
    let role = state.perms.role_for(Some(&user.id), &request.community_id)?;
    if !role.is_member() {
        return Err(ApiError::Forbidden(
            "Only community members can generate a badge".into(),
        ));
    }
    let limit = consume(&state.badge_limiter, &user.id)?;

    let ticket = state
        .generation
        .request_badge(&user, &request.community_id, &request.photo_url, &member_name)
        .await?;
    Ok((remaining_header(limit), Json(ticket)))
}

/// GET /api/badge/status/:token
pub async fn badge_status(State(state): State<AppState>, Path(token): Path<String>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.generation.badge_status(&token)?))
}

/// POST /api/gift/generate
pub async fn generate_gift(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(request): Json<NewGiftCard>,
) -> ApiResult<impl IntoResponse> {
    state.generation.validate_gift_request(&request)?;
    let limit = consume(&state.gift_limiter, &user.id)?;
    let ticket = state.generation.request_gift_card(&user, request).await?;
    Ok((remaining_header(limit), Json(ticket)))
}

/// GET /api/gift/status/:token
pub async fn gift_status(State(state): State<AppState>, Path(token): Path<String>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.generation.gift_card_status(&token)?))
}

/// POST /api/jobs/callback
///
/// Status reports from the generation worker, authenticated by
/// `x-callback-secret`.
pub async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(report): Json<GenerationCallback>,
) -> ApiResult<impl IntoResponse> {
    let expected = state
        .integrations
        .job_callback_secret
        .as_deref()
        .ok_or_else(|| ApiError::ServiceUnavailable("Job callbacks not configured".into()))?;
    let given = headers
        .get(CALLBACK_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    // Compare digests so timing does not depend on the common prefix length
    if Sha256::digest(given.as_bytes()) != Sha256::digest(expected.as_bytes()) {
        return Err(ApiError::Unauthorized);
    }

    let status = state.generation.apply_callback(report)?;
    Ok(Json(json!({ "status": status })))
}
