//! # Error Handling
//!
//! Error types for EventHub Core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                      │
//! │  │                                                                      │
//! │  ├── Request Errors (caller can fix)                                    │
//! │  │   ├── NotFound            - Entity does not exist                    │
//! │  │   ├── Forbidden           - Caller lacks the required role           │
//! │  │   ├── Validation          - Malformed input                          │
//! │  │   ├── Conflict            - Uniqueness / state conflict              │
//! │  │   ├── InvalidTransition   - Illegal approval/generation transition   │
//! │  │   └── InvalidToken        - Unknown or already consumed token        │
//! │  │                                                                      │
//! │  └── Infrastructure Errors                                              │
//! │      ├── Database            - SQLite failure                           │
//! │      ├── Queue               - External task system failure             │
//! │      ├── Mail                - Outbound mail failure                    │
//! │      ├── Serialization       - JSON encode/decode failure               │
//! │      └── Internal            - Anything else                            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The HTTP layer maps request errors onto 4xx statuses and logs
//! infrastructure errors before answering with a generic 500.

use thiserror::Error;

/// Result type alias for EventHub Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for EventHub Core
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Request Errors
    // ========================================================================
    /// The named entity does not exist
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The caller is authenticated but not allowed to do this
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Input failed validation
    #[error("{0}")]
    Validation(String),

    /// The write conflicts with existing data
    #[error("{0}")]
    Conflict(String),

    /// A state machine refused the requested transition
    #[error("Cannot move from {from} to {to}")]
    InvalidTransition {
        /// Current state
        from: &'static str,
        /// Requested state
        to: &'static str,
    },

    /// A single-use token was unknown or already consumed
    #[error("Invalid or expired token")]
    InvalidToken,

    // ========================================================================
    // Infrastructure Errors
    // ========================================================================
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// The external task queue rejected or failed a job
    #[error("Job queue error: {0}")]
    Queue(String),

    /// Outbound mail failed
    #[error("Mail error: {0}")]
    Mail(String),

    /// JSON (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the caller caused this error (as opposed to the system).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_)
                | Error::Forbidden(_)
                | Error::Validation(_)
                | Error::Conflict(_)
                | Error::InvalidTransition { .. }
                | Error::InvalidToken
        )
    }

    /// Shorthand for a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Shorthand for a permission error.
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Error::Forbidden(msg.into())
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ref e, _) = err {
            if e.code == rusqlite::ErrorCode::ConstraintViolation {
                return Error::Conflict(err.to_string());
            }
        }
        Error::Database(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
