//! Outbox dispatch and the expiry sweep.

use serde::Serialize;

use super::{GenerationJob, GenerationKind, GenerationService, GenerationStatus};
use crate::error::Result;

/// Enqueue attempts before a record is given up on.
pub const MAX_DISPATCH_ATTEMPTS: i64 = 3;

/// Records stuck in `pending`/`generating` longer than this are failed.
pub const DEFAULT_GENERATION_TIMEOUT_SECS: i64 = 30 * 60;

/// How long a dispatcher holds an outbox row while its enqueue is in
/// flight. Must exceed the task system's request timeout.
pub const DISPATCH_LEASE_SECS: i64 = 120;

const EXPIRED_MESSAGE: &str = "generation timed out";

/// Totals of one outbox drain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub scanned: usize,
    pub dispatched: usize,
    pub failed: usize,
}

/// Records failed by one expiry sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpirySummary {
    pub badges: usize,
    pub gift_cards: usize,
}

impl ExpirySummary {
    pub fn total(&self) -> usize {
        self.badges + self.gift_cards
    }
}

impl GenerationService {
    /// Dispatch one outbox row.
    ///
    /// `Ok(true)` when a job handle was stored, `Ok(false)` when there was
    /// nothing to do (row gone, exhausted, leased by another dispatcher, or
    /// its record already finished). The row is leased before the enqueue so
    /// the inline path and the outbox worker never both start a job. An
    /// enqueue failure is counted against the row, releases the lease and is
    /// returned.
    pub async fn dispatch_entry(&self, outbox_id: &str) -> Result<bool> {
        let entry = match self.db.get_outbox_entry(outbox_id)? {
            Some(e) if e.attempts < MAX_DISPATCH_ATTEMPTS => e,
            _ => return Ok(false),
        };

        let status = match self.db.generation_status(entry.kind, &entry.record_id)? {
            Some(s) if !s.is_terminal() => s,
            other => {
                let reason = match other {
                    Some(s) => format!("record already {}", s),
                    None => "record deleted".to_string(),
                };
                self.db
                    .retire_outbox_entry(&entry.id, MAX_DISPATCH_ATTEMPTS, &reason)?;
                tracing::debug!(outbox_id = %entry.id, reason = %reason, "Outbox entry retired");
                return Ok(false);
            }
        };

        let job = GenerationJob {
            kind: entry.kind,
            token: entry.token.clone(),
            payload: serde_json::from_str(&entry.payload)?,
        };

        let now = crate::time::now_timestamp();
        if !self
            .db
            .claim_outbox_entry(&entry.id, MAX_DISPATCH_ATTEMPTS, now, now + DISPATCH_LEASE_SECS)?
        {
            tracing::debug!(outbox_id = %entry.id, "Outbox entry leased elsewhere");
            return Ok(false);
        }

        match self.queue.enqueue(&job).await {
            Ok(handle) => {
                let stored = self.db.complete_dispatch(&entry, &handle, now)?;
                tracing::info!(kind = %entry.kind, record_id = %entry.record_id, handle = %handle, "Generation job dispatched");
                Ok(stored)
            }
            Err(e) => {
                let attempts = self.db.record_dispatch_failure(&entry.id, &e.to_string())?;
                if attempts >= MAX_DISPATCH_ATTEMPTS {
                    let message = format!("job dispatch failed: {}", e);
                    self.db.update_generation(
                        entry.kind,
                        &entry.record_id,
                        status,
                        GenerationStatus::Failed,
                        None,
                        None,
                        Some(&message),
                        crate::time::now_timestamp(),
                    )?;
                    tracing::error!(kind = %entry.kind, record_id = %entry.record_id, attempts, error = %e, "Giving up on generation job");
                } else {
                    tracing::warn!(kind = %entry.kind, record_id = %entry.record_id, attempts, error = %e, "Generation job dispatch failed");
                }
                Err(e)
            }
        }
    }

    /// Drain up to `limit` outbox rows, oldest first. Never aborts on a
    /// single row.
    pub async fn dispatch_outbox(&self, limit: usize) -> Result<DispatchSummary> {
        let now = crate::time::now_timestamp();
        let entries = self.db.list_due_outbox(MAX_DISPATCH_ATTEMPTS, now, limit)?;
        let mut summary = DispatchSummary {
            scanned: entries.len(),
            ..Default::default()
        };

        for entry in entries {
            match self.dispatch_entry(&entry.id).await {
                Ok(true) => summary.dispatched += 1,
                Ok(false) => {}
                Err(_) => summary.failed += 1,
            }
        }

        if summary.scanned > 0 {
            tracing::info!(
                scanned = summary.scanned,
                dispatched = summary.dispatched,
                failed = summary.failed,
                "Outbox drained"
            );
        }
        Ok(summary)
    }

    /// Fail every record stuck longer than `timeout_secs`.
    pub fn expire_stuck(&self, timeout_secs: i64) -> Result<ExpirySummary> {
        let now = crate::time::now_timestamp();
        self.expire_stuck_before(now - timeout_secs, now)
    }

    pub(crate) fn expire_stuck_before(&self, cutoff: i64, now: i64) -> Result<ExpirySummary> {
        let mut summary = ExpirySummary::default();
        for kind in GenerationKind::ALL {
            let n = self.db.expire_generations(kind, cutoff, EXPIRED_MESSAGE, now)?;
            match kind {
                GenerationKind::Badge => summary.badges = n,
                GenerationKind::GiftCard => summary.gift_cards = n,
            }
        }
        if summary.total() > 0 {
            tracing::warn!(badges = summary.badges, gift_cards = summary.gift_cards, "Expired stuck generation records");
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::community::{CommunityService, NewOrganization, Permissions};
    use crate::error::Error;
    use crate::generation::{AssetPolicy, GenerationCallback, JobQueue, MemoryQueue, NewGiftCard};
    use crate::identity::{CurrentUser, GodMode};
    use crate::storage::Database;

    fn service() -> (GenerationService, Arc<MemoryQueue>, Database) {
        let db = Database::open(None).unwrap();
        let perms = Permissions::new(db.clone(), GodMode::disabled());
        let queue = Arc::new(MemoryQueue::new());
        let svc = GenerationService::new(db.clone(), perms, queue.clone(), AssetPolicy::default());
        (svc, queue, db)
    }

    fn user() -> CurrentUser {
        CurrentUser::verified("dana", "dana@example.com")
    }

    fn card() -> NewGiftCard {
        NewGiftCard {
            recipient_name: "Eli".into(),
            message: None,
            style: "classic".into(),
            photo_url: "https://utfs.io/f/eli.png".into(),
        }
    }

    #[tokio::test]
    async fn test_failed_dispatch_stays_in_outbox() {
        let (svc, queue, db) = service();
        queue.set_failing(true);

        // The request still succeeds; the job waits in the outbox
        let ticket = svc.request_gift_card(&user(), card()).await.unwrap();
        let outbox = db.list_outbox(10).unwrap();
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].attempts, 1);
        assert!(outbox[0].last_error.is_some());

        queue.set_failing(false);
        let summary = svc.dispatch_outbox(10).await.unwrap();
        assert_eq!(summary, DispatchSummary { scanned: 1, dispatched: 1, failed: 0 });
        assert!(db.list_outbox(10).unwrap().is_empty());

        let stored = db.get_gift_card_by_token(&ticket.token).unwrap().unwrap();
        assert_eq!(stored.job_handle.as_deref(), Some("job-1"));
        assert_eq!(stored.status, GenerationStatus::Pending);
    }

    /// Takes a while to accept each job, like a task system under load.
    #[derive(Default)]
    struct SlowQueue {
        enqueued: AtomicUsize,
    }

    #[async_trait]
    impl JobQueue for SlowQueue {
        async fn enqueue(&self, _job: &GenerationJob) -> Result<String> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let n = self.enqueued.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("slow-{}", n))
        }
    }

    #[tokio::test]
    async fn test_inline_and_worker_dispatch_start_one_job() {
        let db = Database::open(None).unwrap();
        let perms = Permissions::new(db.clone(), GodMode::disabled());
        let queue = Arc::new(SlowQueue::default());
        let svc = GenerationService::new(db.clone(), perms, queue.clone(), AssetPolicy::default());

        let worker = async {
            // Let the inline dispatch reach its enqueue first
            tokio::time::sleep(Duration::from_millis(50)).await;
            svc.dispatch_outbox(100).await.unwrap()
        };
        let requester = user();
        let (ticket, summary) = tokio::join!(svc.request_gift_card(&requester, card()), worker);
        let ticket = ticket.unwrap();

        assert_eq!(summary.dispatched, 0);
        assert_eq!(queue.enqueued.load(Ordering::SeqCst), 1);
        let stored = db.get_gift_card_by_token(&ticket.token).unwrap().unwrap();
        assert_eq!(stored.job_handle.as_deref(), Some("slow-1"));
        assert!(db.list_outbox(10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_leased_entry_is_skipped() {
        let (svc, queue, db) = service();
        queue.set_failing(true);
        svc.request_gift_card(&user(), card()).await.unwrap();
        let entry = db.list_outbox(10).unwrap().remove(0);

        let now = crate::time::now_timestamp();
        assert!(db
            .claim_outbox_entry(&entry.id, MAX_DISPATCH_ATTEMPTS, now, now + DISPATCH_LEASE_SECS)
            .unwrap());
        assert!(!db
            .claim_outbox_entry(&entry.id, MAX_DISPATCH_ATTEMPTS, now, now + DISPATCH_LEASE_SECS)
            .unwrap());

        queue.set_failing(false);
        assert!(!svc.dispatch_entry(&entry.id).await.unwrap());
        assert_eq!(svc.dispatch_outbox(10).await.unwrap().scanned, 0);
        assert!(queue.jobs().is_empty());

        // An expired lease is picked up again
        let later = now + DISPATCH_LEASE_SECS + 1;
        assert_eq!(db.list_due_outbox(MAX_DISPATCH_ATTEMPTS, later, 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let (svc, queue, db) = service();
        queue.set_failing(true);
        let ticket = svc.request_gift_card(&user(), card()).await.unwrap();

        for _ in 1..MAX_DISPATCH_ATTEMPTS {
            let summary = svc.dispatch_outbox(10).await.unwrap();
            assert_eq!(summary.failed, 1);
        }

        let stored = db.get_gift_card_by_token(&ticket.token).unwrap().unwrap();
        assert_eq!(stored.status, GenerationStatus::Failed);
        assert!(stored.job_handle.is_none());
        assert!(stored.error_message.unwrap().starts_with("job dispatch failed"));

        // Exhausted rows are kept but no longer picked up
        assert_eq!(db.list_outbox(10).unwrap().len(), 1);
        queue.set_failing(false);
        assert_eq!(svc.dispatch_outbox(10).await.unwrap().scanned, 0);
        assert!(queue.jobs().is_empty());
    }

    #[tokio::test]
    async fn test_finished_record_is_not_dispatched() {
        let (svc, queue, db) = service();
        queue.set_failing(true);
        let ticket = svc.request_gift_card(&user(), card()).await.unwrap();
        svc.apply_callback(GenerationCallback {
            kind: GenerationKind::GiftCard,
            token: ticket.token,
            status: GenerationStatus::Failed,
            image_url: None,
            background_url: None,
            error: Some("worker crashed".into()),
        })
        .unwrap();

        queue.set_failing(false);
        let summary = svc.dispatch_outbox(10).await.unwrap();
        assert_eq!(summary.dispatched, 0);
        assert!(queue.jobs().is_empty());
        assert_eq!(db.list_outbox(10).unwrap()[0].attempts, MAX_DISPATCH_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_expire_stuck_records() {
        let (svc, _queue, db) = service();
        let communities = CommunityService::new(
            db.clone(),
            Permissions::new(db.clone(), GodMode::disabled()),
        );
        let org = communities
            .create_organization(&user(), NewOrganization::named("Go Lima"))
            .unwrap();
        let badge = svc
            .request_badge(&user(), &org.id, "https://utfs.io/f/dana.png", "Dana")
            .await
            .unwrap();
        let gift = svc.request_gift_card(&user(), card()).await.unwrap();
        svc.apply_callback(GenerationCallback {
            kind: GenerationKind::GiftCard,
            token: gift.token.clone(),
            status: GenerationStatus::Generating,
            image_url: None,
            background_url: None,
            error: None,
        })
        .unwrap();

        // Nothing is old enough yet
        assert_eq!(svc.expire_stuck(DEFAULT_GENERATION_TIMEOUT_SECS).unwrap().total(), 0);

        let now = crate::time::now_timestamp();
        let summary = svc.expire_stuck_before(now + 10, now + 10).unwrap();
        assert_eq!(summary, ExpirySummary { badges: 1, gift_cards: 1 });

        let view = svc.badge_status(&badge.token).unwrap();
        assert_eq!(view.status, GenerationStatus::Failed);
        assert_eq!(view.error_message.as_deref(), Some("generation timed out"));
        assert_eq!(svc.gift_card_status(&gift.token).unwrap().status, GenerationStatus::Failed);

        // A late callback can no longer revive it
        let late = svc.apply_callback(GenerationCallback {
            kind: GenerationKind::Badge,
            token: badge.token,
            status: GenerationStatus::Completed,
            image_url: Some("https://utfs.io/f/late.png".into()),
            background_url: None,
            error: None,
        });
        assert!(matches!(late, Err(Error::InvalidTransition { .. })));
    }
}
