//! # Identity & God Mode
//!
//! The authenticated caller as seen by the core, and the god-mode policy.
//!
//! The identity provider lives outside this crate; the HTTP layer resolves a
//! request into a [`CurrentUser`] and hands it to the services. God mode is a
//! policy object injected into [`crate::community::Permissions`], built once
//! from configuration.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    /// Identity-provider user ID.
    pub id: String,
    /// Primary e-mail address, if the provider exposes one.
    pub email: Option<String>,
    /// Whether the provider has verified the primary e-mail.
    pub email_verified: bool,
    /// Display name (cached profile field).
    pub display_name: Option<String>,
    /// Avatar URL (cached profile field).
    pub avatar_url: Option<String>,
}

impl CurrentUser {
    /// Build a user with a verified primary e-mail and no profile fields.
    pub fn verified(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: Some(email.into()),
            email_verified: true,
            display_name: None,
            avatar_url: None,
        }
    }

    /// The e-mail, only when verified.
    pub fn verified_email(&self) -> Option<&str> {
        if self.email_verified {
            self.email.as_deref()
        } else {
            None
        }
    }
}

/// Super-admin override: an allow-list of e-mail addresses.
///
/// A user whose *verified* primary e-mail is on the list is treated as an
/// owner of every organization and event, may create orphan events, and has
/// their submissions auto-approved.
#[derive(Debug, Clone, Default)]
pub struct GodMode {
    admin_emails: HashSet<String>,
}

impl GodMode {
    /// Build from an iterator of addresses (normalized to trimmed lowercase).
    pub fn new<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let admin_emails = emails
            .into_iter()
            .map(|e| e.as_ref().trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        Self { admin_emails }
    }

    /// Parse a comma-separated list, the format of `ADMIN_EMAILS`.
    pub fn from_list(list: &str) -> Self {
        Self::new(list.split(','))
    }

    /// A policy that grants god mode to nobody.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Number of configured admin addresses.
    pub fn len(&self) -> usize {
        self.admin_emails.len()
    }

    /// True if no admin addresses are configured.
    pub fn is_empty(&self) -> bool {
        self.admin_emails.is_empty()
    }

    /// Whether the given user is in god mode.
    pub fn applies_to(&self, user: &CurrentUser) -> bool {
        match user.verified_email() {
            Some(email) => self.admin_emails.contains(&email.trim().to_lowercase()),
            None => false,
        }
    }

    /// Convenience for optional users.
    pub fn applies_to_opt(&self, user: Option<&CurrentUser>) -> bool {
        user.map(|u| self.applies_to(u)).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_list_normalizes() {
        let god = GodMode::from_list(" Admin@Example.com, ,ops@example.com ");
        assert_eq!(god.len(), 2);
        assert!(god.applies_to(&CurrentUser::verified("u1", "admin@example.com")));
        assert!(god.applies_to(&CurrentUser::verified("u2", "OPS@example.com")));
    }

    #[test]
    fn test_unverified_email_never_applies() {
        let god = GodMode::from_list("admin@example.com");
        let mut user = CurrentUser::verified("u1", "admin@example.com");
        user.email_verified = false;
        assert!(!god.applies_to(&user));
    }

    #[test]
    fn test_disabled() {
        let god = GodMode::disabled();
        assert!(god.is_empty());
        assert!(!god.applies_to(&CurrentUser::verified("u1", "admin@example.com")));
        assert!(!god.applies_to_opt(None));
    }
}
