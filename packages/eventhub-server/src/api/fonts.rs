//! Google Fonts search proxy.
//!
//! Keeps the developer key server-side for the gift card designer.

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct FontSearchQuery {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Upstream listing, only the fields we forward.
#[derive(Debug, Deserialize)]
struct WebfontList {
    #[serde(default)]
    items: Vec<Webfont>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Webfont {
    pub family: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub variants: Vec<String>,
}

#[derive(Debug, Serialize)]
struct FontSearchResponse {
    fonts: Vec<Webfont>,
}

/// Case-insensitive family filter with an optional category, capped at
/// `limit`. Upstream order (popularity) is kept.
fn filter_fonts(fonts: Vec<Webfont>, query: &FontSearchQuery) -> Vec<Webfont> {
    let needle = query
        .q
        .as_deref()
        .map(|q| q.trim().to_lowercase())
        .filter(|q| !q.is_empty());
    let category = query.category.as_deref().map(str::to_lowercase);
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    fonts
        .into_iter()
        .filter(|f| {
            needle
                .as_deref()
                .map_or(true, |n| f.family.to_lowercase().contains(n))
        })
        .filter(|f| {
            category
                .as_deref()
                .map_or(true, |c| f.category.eq_ignore_ascii_case(c))
        })
        .take(limit)
        .collect()
}

/// GET /api/fonts/search?q=&category=&limit=
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<FontSearchQuery>,
) -> ApiResult<impl IntoResponse> {
    let api_key = state
        .integrations
        .google_fonts_api_key
        .as_deref()
        .ok_or_else(|| ApiError::ServiceUnavailable("Font search not configured".into()))?;

    let response = state
        .http
        .get(state.integrations.fonts_base_url())
        .query(&[("key", api_key), ("sort", "popularity")])
        .send()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Google Fonts request failed");
            ApiError::BadGateway("Font search failed".into())
        })?;

    if !response.status().is_success() {
        tracing::error!(status = %response.status(), "Google Fonts API error");
        return Err(ApiError::BadGateway("Font search failed".into()));
    }

    let list: WebfontList = response.json().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to parse Google Fonts response");
        ApiError::BadGateway("Invalid font search response".into())
    })?;

    Ok(Json(FontSearchResponse {
        fonts: filter_fonts(list.items, &query),
    }))
}
