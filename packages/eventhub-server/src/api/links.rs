//! Subscriptions, Luma account linking and the token redirects.
//!
//! Every redirect is a 303 to a page under `PUBLIC_BASE_URL`:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  route                    success                  failure              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  /api/verify              /subscribe/success       /subscribe/error     │
//! │  /api/unsubscribe         /unsubscribe/success     /unsubscribe/error   │
//! │                           (?already=true)                               │
//! │  /api/verify-host         /verify-host/success     /verify-host/error   │
//! │                           ?event=<slug>                                 │
//! │  /api/users/verify-luma   /luma/success            /luma/error          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Failures carry `?reason=missing` (no token) or `?reason=invalid`.

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use eventhub_core::subscriptions::UnsubscribeOutcome;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

impl TokenQuery {
    fn token(&self) -> Option<&str> {
        self.token.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

fn failure(state: &AppState, page: &str, err: &eventhub_core::Error) -> Redirect {
    match err {
        eventhub_core::Error::InvalidToken | eventhub_core::Error::NotFound(_) => {
            Redirect::to(&state.page_url(&format!("/{}/error?reason=invalid", page)))
        }
        other => {
            tracing::error!(page = %page, error = %other, "Token redemption failed");
            Redirect::to(&state.page_url(&format!("/{}/error?reason=server", page)))
        }
    }
}

fn missing(state: &AppState, page: &str) -> Redirect {
    Redirect::to(&state.page_url(&format!("/{}/error?reason=missing", page)))
}

// ── Subscriptions ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub email: String,
}

/// POST /api/subscribe
pub async fn subscribe(
    State(state): State<AppState>,
    Json(request): Json<SubscribeRequest>,
) -> ApiResult<impl IntoResponse> {
    let outcome = state.subscriptions.subscribe(&request.email).await?;
    Ok(Json(json!({ "outcome": outcome })))
}

/// GET /api/verify?token=
pub async fn verify_subscription(State(state): State<AppState>, Query(query): Query<TokenQuery>) -> Redirect {
    let Some(token) = query.token() else {
        return missing(&state, "subscribe");
    };
    match state.subscriptions.verify(token) {
        Ok(_) => Redirect::to(&state.page_url("/subscribe/success")),
        Err(e) => failure(&state, "subscribe", &e),
    }
}

/// GET /api/unsubscribe?token=
///
/// Idempotent: an already inactive subscription still lands on the success
/// page.
pub async fn unsubscribe(State(state): State<AppState>, Query(query): Query<TokenQuery>) -> Redirect {
    let Some(token) = query.token() else {
        return missing(&state, "unsubscribe");
    };
    match state.subscriptions.unsubscribe(token) {
        Ok(UnsubscribeOutcome::Unsubscribed) => Redirect::to(&state.page_url("/unsubscribe/success")),
        Ok(UnsubscribeOutcome::AlreadyInactive) => {
            Redirect::to(&state.page_url("/unsubscribe/success?already=true"))
        }
        Err(e) => failure(&state, "unsubscribe", &e),
    }
}

// ── Host claims ──────────────────────────────────────────────────────────────

/// GET /api/verify-host?token=
pub async fn verify_host(State(state): State<AppState>, Query(query): Query<TokenQuery>) -> Redirect {
    let Some(token) = query.token() else {
        return missing(&state, "verify-host");
    };
    match state.claims.verify_host_claim(token) {
        Ok((_, event)) => Redirect::to(&state.page_url(&format!(
            "/verify-host/success?event={}",
            urlencoding::encode(&event.slug)
        ))),
        Err(e) => failure(&state, "verify-host", &e),
    }
}

// ── Luma accounts ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LumaLinkRequest {
    pub email: String,
}

/// POST /api/users/luma
pub async fn request_luma_link(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(request): Json<LumaLinkRequest>,
) -> ApiResult<impl IntoResponse> {
    state.luma_accounts.request_link(&user, &request.email).await?;
    Ok(Json(json!({ "sent": true })))
}

/// GET /api/users/verify-luma?token=
pub async fn verify_luma(State(state): State<AppState>, Query(query): Query<TokenQuery>) -> Redirect {
    let Some(token) = query.token() else {
        return missing(&state, "luma");
    };
    match state.luma_accounts.verify_link(token) {
        Ok(_) => Redirect::to(&state.page_url("/luma/success")),
        Err(e) => failure(&state, "luma", &e),
    }
}
