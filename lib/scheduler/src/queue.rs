//! Job queue boundary.
//!
//! The queue is an external collaborator with at-least-once delivery; the
//! scheduler only needs `add`. Dispatch payloads carry traceability fields
//! (`_scheduledJobId`, `_entityId`, ...) so consumers can run idempotency
//! checks.

use crate::error::QueueError;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Mutex;

/// Minimal producer interface onto the job queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueues a job of the given type with the given payload.
    async fn add(&self, job_type: &str, payload: JsonValue) -> Result<(), QueueError>;
}

/// A job captured by [`InMemoryJobQueue`].
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedJob {
    /// The job type.
    pub job_type: String,
    /// The dispatch payload.
    pub payload: JsonValue,
}

/// In-memory queue for tests and local runs.
#[derive(Default)]
pub struct InMemoryJobQueue {
    jobs: Mutex<Vec<QueuedJob>>,
}

impl InMemoryJobQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of everything enqueued so far.
    #[must_use]
    pub fn jobs(&self) -> Vec<QueuedJob> {
        self.jobs.lock().map(|jobs| jobs.clone()).unwrap_or_default()
    }

    /// Removes and returns the oldest enqueued job, if any.
    #[must_use]
    pub fn pop(&self) -> Option<QueuedJob> {
        let mut jobs = self.jobs.lock().ok()?;
        if jobs.is_empty() {
            None
        } else {
            Some(jobs.remove(0))
        }
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn add(&self, job_type: &str, payload: JsonValue) -> Result<(), QueueError> {
        let mut jobs = self.jobs.lock().map_err(|e| QueueError::Enqueue {
            job_type: job_type.to_string(),
            reason: e.to_string(),
        })?;
        jobs.push(QueuedJob {
            job_type: job_type.to_string(),
            payload,
        });
        Ok(())
    }
}
