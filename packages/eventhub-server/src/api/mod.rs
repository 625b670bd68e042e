//! # HTTP API
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  module           routes                                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  me               /health, /api/me                                      │
//! │  events           /api/feed, /api/sitemap, /api/events/...              │
//! │  organizations    /api/organizations/...                                │
//! │  generation       /api/badge/..., /api/gift/..., /api/jobs/callback     │
//! │  links            /api/subscribe, token redirects, /api/users/luma      │
//! │  webhooks         /api/webhooks/luma                                    │
//! │  fonts            /api/fonts/search                                     │
//! │  admin            /api/admin/...  (god mode)                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod admin;
mod events;
mod fonts;
mod generation;
mod links;
mod me;
mod organizations;
mod webhooks;

#[cfg(test)]
mod tests;

use axum::{
    http::{header, Method},
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Optional `?limit=` for list endpoints.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct LimitQuery {
    pub limit: Option<usize>,
}

impl LimitQuery {
    pub fn clamped(&self, default: usize, max: usize) -> usize {
        self.limit.unwrap_or(default).clamp(1, max)
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(me::health))
        .route("/api/me", get(me::me))
        // Events
        .route("/api/feed", get(events::feed))
        .route("/api/sitemap", get(events::sitemap))
        .route("/api/events", post(events::create))
        .route(
            "/api/events/:id",
            get(events::get).patch(events::update).delete(events::delete),
        )
        .route("/api/events/:id/permissions", get(events::permissions))
        .route("/api/events/:id/hosts", get(events::hosts))
        .route("/api/events/:id/sponsors", get(events::sponsors).post(events::add_sponsor))
        .route("/api/events/:id/winners", get(events::winners).post(events::add_winner))
        .route("/api/events/:id/host-claims", post(events::host_claim))
        .route("/api/events/:id/organizer-claims", post(events::organizer_claim))
        // Organizations
        .route("/api/organizations", post(organizations::create))
        .route(
            "/api/organizations/:id",
            get(organizations::get).patch(organizations::update),
        )
        .route("/api/organizations/:id/role", get(organizations::role))
        .route("/api/organizations/:id/members", get(organizations::members))
        .route(
            "/api/organizations/:id/members/:user_id",
            put(organizations::set_role).delete(organizations::remove_member),
        )
        .route(
            "/api/organizations/:id/follow",
            post(organizations::follow).delete(organizations::unfollow),
        )
        .route("/api/organizations/:id/transfer", post(organizations::transfer))
        // Generation
        .route("/api/badge/generate", post(generation::generate_badge))
        .route("/api/badge/status/:token", get(generation::badge_status))
        .route("/api/gift/generate", post(generation::generate_gift))
        .route("/api/gift/status/:token", get(generation::gift_status))
        .route("/api/jobs/callback", post(generation::callback))
        // Webhooks
        .route("/api/webhooks/luma", get(webhooks::luma_ping).post(webhooks::luma))
        // Subscriptions and token links
        .route("/api/subscribe", post(links::subscribe))
        .route("/api/verify", get(links::verify_subscription))
        .route("/api/unsubscribe", get(links::unsubscribe))
        .route("/api/verify-host", get(links::verify_host))
        .route("/api/users/luma", post(links::request_luma_link))
        .route("/api/users/verify-luma", get(links::verify_luma))
        // Fonts
        .route("/api/fonts/search", get(fonts::search))
        // Admin
        .route("/api/admin/pending", get(admin::pending))
        .route("/api/admin/events/:id/approve", post(admin::approve_event))
        .route("/api/admin/events/:id/reject", post(admin::reject_event))
        .route("/api/admin/events/:id/assign", post(admin::assign_event))
        .route("/api/admin/organizations/:id/verify", post(admin::verify_organization))
        .route("/api/admin/claims", get(admin::claims))
        .route("/api/admin/claims/:id/approve", post(admin::approve_claim))
        .route("/api/admin/claims/:id/reject", post(admin::reject_claim))
        .route("/api/admin/reconcile", post(admin::reconcile))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
