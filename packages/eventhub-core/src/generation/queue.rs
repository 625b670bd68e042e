//! The task-system seam.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;

use super::GenerationKind;
use crate::error::{Error, Result};

/// A job handed to the task system.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationJob {
    pub kind: GenerationKind,
    /// Share token of the record; the worker echoes it in callbacks
    pub token: String,
    pub payload: serde_json::Value,
}

/// Starts generation jobs. Returns the task system's handle.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: &GenerationJob) -> Result<String>;
}

/// Used when no task system is configured: logs the job and hands out a
/// local handle. Records stay `pending` until the expiry sweep fails them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalQueue;

#[async_trait]
impl JobQueue for LocalQueue {
    async fn enqueue(&self, job: &GenerationJob) -> Result<String> {
        let handle = format!("local-{}", uuid::Uuid::new_v4());
        tracing::info!(kind = %job.kind, token = %job.token, handle = %handle, "Generation job (no task system configured)");
        Ok(handle)
    }
}

/// Records jobs in memory. Can be told to fail.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    jobs: Mutex<Vec<GenerationJob>>,
    failing: Mutex<bool>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following enqueue fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    /// Jobs accepted so far.
    pub fn jobs(&self) -> Vec<GenerationJob> {
        self.jobs.lock().clone()
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, job: &GenerationJob) -> Result<String> {
        if *self.failing.lock() {
            return Err(Error::Queue("task system unavailable".into()));
        }
        let mut jobs = self.jobs.lock();
        jobs.push(job.clone());
        Ok(format!("job-{}", jobs.len()))
    }
}
