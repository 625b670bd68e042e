//! EventHub HTTP server.
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌────────────────────────────┐
//! │  axum router │──▶│  AppState        │──▶│  eventhub-core services    │
//! │  (api/*)     │   │  (state.rs)      │   │  (SQLite, permissions)     │
//! └──────────────┘   └──────────────────┘   └────────────────────────────┘
//!        │                    │
//!        ▼                    ▼
//!  auth.rs (identity)   workers.rs (Luma import, outbox, sweep, reconcile)
//! ```
//!
//! Outbound integrations live next to the trait they implement:
//! `trigger.rs` (task system), `mail.rs` (mail API), `auth.rs` (identity
//! provider).

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod mail;
pub mod rate_limit;
pub mod state;
pub mod trigger;
pub mod workers;

pub use api::router;
