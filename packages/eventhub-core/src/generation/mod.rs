//! # Badge & Gift Card Generation
//!
//! Orchestrates image generation that runs in an external task system.
//!
//! ## Request Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         GENERATION PIPELINE                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  request_badge / request_gift_card                                      │
//! │       │  (one transaction)                                              │
//! │       ├── INSERT badges | gift_cards      status = pending              │
//! │       └── INSERT generation_outbox                                      │
//! │                                                                         │
//! │  dispatch_entry (inline, then every OUTBOX_INTERVAL)                    │
//! │       ├── JobQueue::enqueue ok   → store job_handle, DELETE outbox row  │
//! │       └── JobQueue::enqueue err  → attempts += 1                        │
//! │                                    attempts == 3 → record failed        │
//! │                                                                         │
//! │  worker callback                                                        │
//! │       pending ──► generating ──► completed | failed                     │
//! │                                                                         │
//! │  expiry sweep                                                           │
//! │       pending | generating older than timeout → failed                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod assets;
mod outbox;
mod queue;
mod service;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use assets::{AssetPolicy, DEFAULT_ASSET_HOSTS};
pub use outbox::{
    DispatchSummary, ExpirySummary, DEFAULT_GENERATION_TIMEOUT_SECS, DISPATCH_LEASE_SECS, MAX_DISPATCH_ATTEMPTS,
};
pub use queue::{GenerationJob, JobQueue, LocalQueue, MemoryQueue};
pub use service::{
    BadgeStatusView, BadgeTicket, GenerationCallback, GenerationService, GiftCardStatusView, GiftCardTicket,
    NewGiftCard,
};

/// Lifecycle of a generated asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Pending,
    Generating,
    Completed,
    Failed,
}

impl GenerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationStatus::Pending => "pending",
            GenerationStatus::Generating => "generating",
            GenerationStatus::Completed => "completed",
            GenerationStatus::Failed => "failed",
        }
    }

    /// Completed and failed records never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, GenerationStatus::Completed | GenerationStatus::Failed)
    }

    pub fn can_transition_to(&self, next: GenerationStatus) -> bool {
        use GenerationStatus::*;
        matches!(
            (self, next),
            (Pending, Generating) | (Pending, Completed) | (Pending, Failed) | (Generating, Completed) | (Generating, Failed)
        )
    }

    /// Validate a transition, returning the new state.
    pub fn transition(&self, next: GenerationStatus) -> Result<GenerationStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(Error::InvalidTransition {
                from: self.as_str(),
                to: next.as_str(),
            })
        }
    }
}

impl FromStr for GenerationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(GenerationStatus::Pending),
            "generating" => Ok(GenerationStatus::Generating),
            "completed" => Ok(GenerationStatus::Completed),
            "failed" => Ok(GenerationStatus::Failed),
            other => Err(Error::validation(format!("Unknown generation status: {}", other))),
        }
    }
}

impl fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What is being generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationKind {
    Badge,
    GiftCard,
}

impl GenerationKind {
    pub const ALL: [GenerationKind; 2] = [GenerationKind::Badge, GenerationKind::GiftCard];

    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationKind::Badge => "badge",
            GenerationKind::GiftCard => "gift_card",
        }
    }
}

impl FromStr for GenerationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "badge" => Ok(GenerationKind::Badge),
            "gift_card" => Ok(GenerationKind::GiftCard),
            other => Err(Error::validation(format!("Unknown generation kind: {}", other))),
        }
    }
}

impl fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        use GenerationStatus::*;
        assert!(Pending.can_transition_to(Generating));
        assert!(Pending.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Failed));
        assert!(Generating.can_transition_to(Completed));
        assert!(Generating.can_transition_to(Failed));

        assert!(!Generating.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Pending));
        for terminal in [Completed, Failed] {
            assert!(terminal.is_terminal());
            for next in [Pending, Generating, Completed, Failed] {
                assert!(terminal.transition(next).is_err());
            }
        }
    }

    #[test]
    fn test_parse() {
        assert_eq!("generating".parse::<GenerationStatus>().unwrap(), GenerationStatus::Generating);
        assert!("done".parse::<GenerationStatus>().is_err());
        assert_eq!("gift_card".parse::<GenerationKind>().unwrap(), GenerationKind::GiftCard);
        assert_eq!(serde_json::to_string(&GenerationKind::GiftCard).unwrap(), "\"gift_card\"");
    }
}
