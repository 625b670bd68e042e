//! Approval state machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Moderation state of an event; the single visibility flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalState {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalState::Pending => "pending",
            ApprovalState::Approved => "approved",
            ApprovalState::Rejected => "rejected",
        }
    }

    /// Publicly listed.
    pub fn is_approved(&self) -> bool {
        matches!(self, ApprovalState::Approved)
    }

    /// Whether `self → next` is allowed without an override.
    ///
    /// Only a pending event can be decided; repeating the current state is
    /// a no-op.
    pub fn can_transition_to(&self, next: ApprovalState) -> bool {
        *self == next || *self == ApprovalState::Pending
    }

    /// Validate `self → next`.
    ///
    /// With `admin_override` any transition is accepted and logged.
    pub fn transition(&self, next: ApprovalState, admin_override: bool) -> Result<ApprovalState> {
        if self.can_transition_to(next) {
            return Ok(next);
        }
        if admin_override {
            tracing::warn!(from = %self, to = %next, "Approval override");
            return Ok(next);
        }
        Err(Error::InvalidTransition {
            from: self.as_str(),
            to: next.as_str(),
        })
    }
}

impl FromStr for ApprovalState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ApprovalState::Pending),
            "approved" => Ok(ApprovalState::Approved),
            "rejected" => Ok(ApprovalState::Rejected),
            other => Err(Error::validation(format!("Unknown approval state '{}'", other))),
        }
    }
}

impl std::fmt::Display for ApprovalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a newly submitted event.
///
/// God-mode submissions and submissions for a verified organization skip
/// moderation.
pub fn initial_state(is_god: bool, organization_verified: bool) -> ApprovalState {
    if is_god || organization_verified {
        ApprovalState::Approved
    } else {
        ApprovalState::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ApprovalState::*;

    #[test]
    fn test_transitions() {
        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Approved.can_transition_to(Approved));
        assert!(Rejected.can_transition_to(Rejected));
        assert!(!Approved.can_transition_to(Pending));
        assert!(!Approved.can_transition_to(Rejected));
        assert!(!Rejected.can_transition_to(Approved));
    }

    #[test]
    fn test_override() {
        assert!(matches!(
            Approved.transition(Rejected, false),
            Err(Error::InvalidTransition { from: "approved", to: "rejected" })
        ));
        assert_eq!(Approved.transition(Rejected, true).unwrap(), Rejected);
        assert_eq!(Pending.transition(Approved, false).unwrap(), Approved);
    }

    #[test]
    fn test_initial_state() {
        assert_eq!(initial_state(true, false), Approved);
        assert_eq!(initial_state(false, true), Approved);
        assert_eq!(initial_state(false, false), Pending);
    }

    #[test]
    fn test_serde_is_lowercase() {
        assert_eq!(serde_json::to_string(&Approved).unwrap(), "\"approved\"");
        assert_eq!("rejected".parse::<ApprovalState>().unwrap(), Rejected);
    }
}
