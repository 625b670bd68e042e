//! # Host Resolution
//!
//! Matches the hosts of imported events against verified organizations.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        HOST RESOLUTION                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  event_hosts ──┐                                                        │
//! │                ├──► NameScorer::score(host, org) ──► best ≥ threshold?  │
//! │  verified orgs ┘                                        │        │      │
//! │                                                        yes       no     │
//! │                                                         │        │      │
//! │                            attach org (if orphan) ◄─────┘        │      │
//! │                            flag host primary                     │      │
//! │                                                 stays in orphan queue   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod resolver;
mod scoring;

pub use resolver::{HostResolver, ReconcileSummary, Resolution, DEFAULT_RECONCILE_LIMIT};
pub use scoring::{normalize_name, NameScorer, OverlapScorer, MATCH_THRESHOLD};
