//! Scheduled job configurations and the entity scheduler interface.
//!
//! Each kind of schedulable entity (cron-triggered workflows, recurring
//! syncs) implements [`EntityScheduler`]; the service polls all registered
//! implementations uniformly. Job configs are created and deleted by the
//! owning entity; the scheduler only reads them and advances
//! `next_execution_time`.

use crate::error::EntityError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use copper_relay_core::ScheduledJobId;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A persisted description of recurring work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledJobConfig {
    /// Unique identifier.
    pub id: ScheduledJobId,
    /// Identifier of the owning entity, opaque across entity types.
    pub entity_id: String,
    /// Entity type key, matching an [`EntityScheduler::entity_type`].
    pub entity_type: String,
    /// Queue job type dispatched when due.
    pub job_type: String,
    /// Payload forwarded to the queue consumer.
    #[serde(default)]
    pub job_data: JsonValue,
    /// Cron expression, preferred when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron_expression: Option<String>,
    /// Fixed interval, used when no cron expression is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_minutes: Option<u32>,
    /// IANA timezone for cron evaluation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// When this job last dispatched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_execution_time: Option<DateTime<Utc>>,
    /// When this job is next due.
    pub next_execution_time: DateTime<Utc>,
}

impl ScheduledJobConfig {
    /// Creates a job config due at the given time.
    #[must_use]
    pub fn new(
        entity_id: impl Into<String>,
        entity_type: impl Into<String>,
        job_type: impl Into<String>,
        next_execution_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ScheduledJobId::new(),
            entity_id: entity_id.into(),
            entity_type: entity_type.into(),
            job_type: job_type.into(),
            job_data: JsonValue::Null,
            cron_expression: None,
            interval_minutes: None,
            timezone: None,
            last_execution_time: None,
            next_execution_time,
        }
    }

    /// Sets the cron expression.
    #[must_use]
    pub fn with_cron(mut self, expression: impl Into<String>) -> Self {
        self.cron_expression = Some(expression.into());
        self
    }

    /// Sets the fixed interval.
    #[must_use]
    pub fn with_interval_minutes(mut self, minutes: u32) -> Self {
        self.interval_minutes = Some(minutes);
        self
    }

    /// Sets the timezone for cron evaluation.
    #[must_use]
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    /// Sets the payload forwarded to the queue consumer.
    #[must_use]
    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.job_data = data;
        self
    }
}

/// A pluggable source of due work, polled by the scheduler service.
#[async_trait]
pub trait EntityScheduler: Send + Sync {
    /// The entity type key this scheduler owns.
    fn entity_type(&self) -> &str;

    /// Returns jobs due in `[from, to)`, paged by `limit` and `offset`.
    ///
    /// A batch shorter than `limit` signals exhaustion.
    async fn find_due_jobs(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ScheduledJobConfig>, EntityError>;

    /// Persists advanced execution times for the given jobs.
    ///
    /// Called before the jobs are enqueued, so a crash in between skips an
    /// occurrence instead of duplicating it.
    async fn update_execution_time(&self, jobs: &[ScheduledJobConfig]) -> Result<(), EntityError>;
}
