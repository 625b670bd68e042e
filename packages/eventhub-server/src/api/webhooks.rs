//! Luma webhook ingestion.
//!
//! The body is only parsed here; the import itself runs on the Luma worker
//! so the sender gets its acknowledgement immediately.

use axum::{body::Bytes, extract::State, response::IntoResponse, Json};
use serde_json::json;

use eventhub_core::luma::LumaWebhook;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// GET /api/webhooks/luma
///
/// Endpoint check used when registering the webhook.
pub async fn luma_ping() -> impl IntoResponse {
    Json(json!({ "received": true }))
}

/// POST /api/webhooks/luma
pub async fn luma(State(state): State<AppState>, body: Bytes) -> ApiResult<impl IntoResponse> {
    let webhook: LumaWebhook = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!(error = %e, "Malformed Luma webhook");
        ApiError::BadRequest("Malformed webhook payload".into())
    })?;

    tracing::info!(kind = %webhook.kind, "Luma webhook received");
    if state.luma_tx.send(webhook).is_err() {
        return Err(ApiError::ServiceUnavailable("Webhook worker is not running".into()));
    }
    Ok(Json(json!({ "received": true })))
}
