//! Background tasks.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  task                 trigger                     work                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  luma importer        webhook channel             LumaSync::handle      │
//! │  outbox dispatcher    every OUTBOX_INTERVAL       dispatch_outbox       │
//! │  generation sweep     every SWEEP_INTERVAL        expire_stuck + prune  │
//! │  reconciler           every RECONCILE_INTERVAL    reconcile_orphans     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! None of them stops on a failed item; errors are logged and the loop
//! continues.

use std::time::Duration;

use tokio::task::JoinHandle;

use crate::state::{AppState, LumaInbox};

/// Rows handled per outbox tick.
const OUTBOX_BATCH: usize = 100;

/// Spawn every background task.
pub fn spawn_all(state: &AppState, luma_inbox: LumaInbox) -> Vec<JoinHandle<()>> {
    vec![
        spawn_luma_importer(state.clone(), luma_inbox),
        spawn_outbox_dispatcher(state.clone()),
        spawn_generation_sweep(state.clone()),
        spawn_reconciler(state.clone()),
    ]
}

/// Import queued Luma webhooks one at a time.
pub fn spawn_luma_importer(state: AppState, mut inbox: LumaInbox) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(webhook) = inbox.recv().await {
            let kind = webhook.kind.clone();
            let luma = state.luma.clone();
            match tokio::task::spawn_blocking(move || luma.handle_webhook(webhook)).await {
                Ok(Ok(outcome)) => tracing::debug!(kind = %kind, outcome = ?outcome, "Luma webhook processed"),
                Ok(Err(e)) => tracing::warn!(kind = %kind, error = %e, "Luma webhook failed"),
                Err(e) => tracing::error!(kind = %kind, error = %e, "Luma import task panicked"),
            }
        }
        tracing::info!("Luma webhook channel closed");
    })
}

pub fn spawn_outbox_dispatcher(state: AppState) -> JoinHandle<()> {
    let every = Duration::from_secs(state.config.outbox_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            if let Err(e) = state.generation.dispatch_outbox(OUTBOX_BATCH).await {
                tracing::error!(error = %e, "Outbox dispatch failed");
            }
        }
    })
}

/// Expire stuck generation records and forget idle rate-limit keys.
pub fn spawn_generation_sweep(state: AppState) -> JoinHandle<()> {
    let every = Duration::from_secs(state.config.sweep_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            if let Err(e) = state.generation.expire_stuck(state.config.generation_timeout_secs) {
                tracing::error!(error = %e, "Generation sweep failed");
            }
            let now = eventhub_core::time::now_timestamp();
            state.badge_limiter.prune(now);
            state.gift_limiter.prune(now);
        }
    })
}

/// Retry host resolution for orphaned imports.
pub fn spawn_reconciler(state: AppState) -> JoinHandle<()> {
    let every = Duration::from_secs(state.config.reconcile_interval_secs.max(60));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // The first tick fires at once; skip it so a restart does not rescan.
        interval.tick().await;
        loop {
            interval.tick().await;
            let resolver = state.resolver.clone();
            let batch = state.config.reconcile_batch;
            match tokio::task::spawn_blocking(move || resolver.reconcile_orphans(batch)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "Orphan reconciliation failed"),
                Err(e) => tracing::error!(error = %e, "Reconciliation task panicked"),
            }
        }
    })
}
