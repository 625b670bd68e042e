//! # EventHub Core
//!
//! Domain core for a community-events platform: organizations with
//! role-based membership, an approval workflow for events, feed queries,
//! host-to-organization resolution for imported events, claims, newsletter
//! subscriptions and badge/gift card generation orchestration.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       EVENTHUB CORE MODULES                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌──────────────┐    │
//! │  │  Community  │  │   Events    │  │    Hosts    │  │    Claims    │    │
//! │  │             │  │             │  │             │  │              │    │
//! │  │ - Orgs      │  │ - Approval  │  │ - Scoring   │  │ - Host       │    │
//! │  │ - Roles     │  │ - Status    │  │ - Resolve   │  │ - Organizer  │    │
//! │  │ - Members   │  │ - Feed      │  │ - Reconcile │  │ - Review     │    │
//! │  └──────┬──────┘  └──────┬──────┘  └──────┬──────┘  └──────┬───────┘    │
//! │         │                │                │                │            │
//! │         └────────────────┴────────────────┴────────────────┘            │
//! │                                   │                                     │
//! │  ┌─────────────┐  ┌─────────────┐ │ ┌───────────────────────────────┐   │
//! │  │ Generation  │  │   Storage   │ │ │  Luma / Subscriptions / Mail  │   │
//! │  │             │  │             │ │ │                               │   │
//! │  │ - Outbox    │  │ - SQLite    │◄┘ │ - Webhook import              │   │
//! │  │ - JobQueue  │  │ - Schema    │   │ - Double opt-in               │   │
//! │  │ - Expiry    │  │ - Tx helpers│   │ - Mailer seam                 │   │
//! │  └─────────────┘  └─────────────┘   └───────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error taxonomy shared by every module
//! - [`identity`] - The authenticated caller and the god-mode policy
//! - [`storage`] - SQLite persistence
//! - [`community`] - Organizations, roles and membership
//! - [`events`] - Events, approval, status and the feed
//! - [`hosts`] - Matching event hosts to verified organizations
//! - [`claims`] - Host and organizer claims
//! - [`generation`] - Badge and gift card generation
//! - [`subscriptions`] - Newsletter double opt-in
//! - [`luma`] - Luma webhook import and account linking
//! - [`mailer`] - Outbound mail seam
//!
//! Nothing here spawns tasks or speaks HTTP; the server crate owns the
//! runtime, the routes and the concrete queue/mail clients.

#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod claims;
pub mod community;
pub mod error;
pub mod events;
pub mod generation;
pub mod hosts;
pub mod identity;
pub mod ids;
pub mod luma;
pub mod mailer;
pub mod storage;
pub mod subscriptions;
/// Unix-second timestamps and RFC 3339 conversion.
pub mod time;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use error::{Error, Result};
pub use identity::{CurrentUser, GodMode};
