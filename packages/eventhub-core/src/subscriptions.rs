//! # Newsletter Subscriptions
//!
//! Double opt-in subscribe, token verification and idempotent unsubscribe.
//!
//! The unsubscribe token is issued once and never rotated, so the link in
//! every past message keeps working and clicking it twice is harmless.

use std::sync::Arc;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::ids::{generate_id, generate_token};
use crate::mailer::{subscription_email, Links, Mailer};
use crate::storage::{Database, SubscriptionRecord};

/// Longest accepted e-mail address.
const MAX_EMAIL_LEN: usize = 254;

/// What [`SubscriptionService::subscribe`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscribeOutcome {
    /// New subscription, confirmation mailed
    Created,
    /// Existing but unverified or inactive; confirmation mailed again
    Resent,
    /// Already active and verified; nothing sent
    AlreadySubscribed,
}

/// What [`SubscriptionService::unsubscribe`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsubscribeOutcome {
    Unsubscribed,
    AlreadyInactive,
}

/// Newsletter subscription flows.
#[derive(Clone)]
pub struct SubscriptionService {
    db: Database,
    mailer: Arc<dyn Mailer>,
    links: Links,
}

impl SubscriptionService {
    pub fn new(db: Database, mailer: Arc<dyn Mailer>, links: Links) -> Self {
        Self { db, mailer, links }
    }

    /// Subscribe an address and mail a confirmation link.
    pub async fn subscribe(&self, email: &str) -> Result<SubscribeOutcome> {
        let email = normalize_email(email)?;
        let now = crate::time::now_timestamp();
        let verify_token = generate_token();

        let (outcome, unsubscribe_token) = match self.db.get_subscription_by_email(&email)? {
            Some(existing) if existing.is_active && existing.is_verified => {
                return Ok(SubscribeOutcome::AlreadySubscribed);
            }
            Some(existing) => {
                self.db.rearm_subscription(&existing.id, &verify_token, now)?;
                (SubscribeOutcome::Resent, existing.unsubscribe_token)
            }
            None => {
                let record = SubscriptionRecord {
                    id: generate_id(),
                    email: email.clone(),
                    verify_token: Some(verify_token.clone()),
                    unsubscribe_token: generate_token(),
                    is_verified: false,
                    is_active: true,
                    created_at: now,
                    updated_at: now,
                };
                self.db.insert_subscription(&record)?;
                (SubscribeOutcome::Created, record.unsubscribe_token)
            }
        };

        let verify_link = self.links.with_token("/api/verify", &verify_token);
        let unsubscribe_link = self.links.with_token("/api/unsubscribe", &unsubscribe_token);
        self.mailer
            .send(subscription_email(&email, &verify_link, &unsubscribe_link))
            .await?;

        tracing::info!(outcome = ?outcome, "Subscription confirmation sent");
        Ok(outcome)
    }

    /// Redeem a verification token. The token is burned.
    pub fn verify(&self, token: &str) -> Result<SubscriptionRecord> {
        self.db
            .consume_subscription_verify_token(token, crate::time::now_timestamp())?
            .ok_or(Error::InvalidToken)
    }

    /// Deactivate the subscription behind an unsubscribe token.
    pub fn unsubscribe(&self, token: &str) -> Result<UnsubscribeOutcome> {
        let sub = self
            .db
            .get_subscription_by_unsubscribe_token(token)?
            .ok_or(Error::InvalidToken)?;
        if self
            .db
            .deactivate_subscription(&sub.id, crate::time::now_timestamp())?
        {
            tracing::info!(subscription_id = %sub.id, "Unsubscribed");
            Ok(UnsubscribeOutcome::Unsubscribed)
        } else {
            Ok(UnsubscribeOutcome::AlreadyInactive)
        }
    }
}

/// Trim, lowercase and sanity-check an e-mail address.
pub(crate) fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    let invalid = || Error::validation("Invalid e-mail address");

    if email.is_empty() || email.len() > MAX_EMAIL_LEN || email.contains(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
    {
        return Err(invalid());
    }
    Ok(email)
}
