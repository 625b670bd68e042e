//! # Events
//!
//! Event submission, approval, lookup and the public feed.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          EVENT LIFECYCLE                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   submit ──► initial_state(god?, org verified?)                         │
//! │                 │                                                       │
//! │                 ├── Approved ──► listed in feed / sitemap               │
//! │                 └── Pending ───► admin queue ──► Approved | Rejected    │
//! │                                                                         │
//! │   organization_id = NULL  ──►  orphan queue ──► assign_organization     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod approval;
mod feed;
mod service;
mod status;
mod types;

pub use approval::{initial_state, ApprovalState};
pub use feed::{FeedCursor, FeedPage, FeedQuery, FeedScope, FeedSort, Sitemap, SitemapEntry, MAX_FEED_LIMIT};
pub use service::{EventService, EventView, NewSponsor, NewWinner};
pub use status::EventStatus;
pub use types::{EventFormat, EventSource, EventType, EventUpdate, NewEvent, MAX_TITLE_LEN};

pub(crate) use service::allocate_identifiers;
