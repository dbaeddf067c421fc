//! The per-process scheduler service.
//!
//! Every instance in the fleet runs the same loop; the distributed lock
//! decides which one polls. Leadership is leased: a renewal timer extends
//! the TTL while the instance still owns the lock, and a follower takes
//! over within one TTL period when the leader disappears.
//!
//! Dispatch is at-most-once by construction: execution times advance
//! *before* jobs are enqueued, so a crash between the two steps skips the
//! occurrence rather than duplicating it.

use crate::config::SchedulerConfig;
use crate::entity::{EntityScheduler, ScheduledJobConfig};
use crate::error::EntityError;
use crate::lock::{DistributedLock, LockStore};
use crate::queue::JobQueue;
use crate::schedule::next_execution_time;
use chrono::{DateTime, Duration, Utc};
use copper_relay_core::InstanceId;
use serde_json::Value as JsonValue;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Leadership lifecycle of one service instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadershipState {
    /// `init` has not run yet.
    Uninitialized,
    /// Lock acquisition is in flight.
    LockAcquisitionAttempted,
    /// This instance polls and dispatches.
    Leader,
    /// Another instance holds the lock; poll ticks are no-ops.
    Follower,
    /// `shutdown` has begun; no new polling cycles start.
    ShuttingDown,
}

/// The distributed scheduler service for one process instance.
///
/// Constructed once per process with injected collaborators; lifecycle is
/// explicit through [`init`](Self::init) and [`shutdown`](Self::shutdown).
pub struct SchedulerService {
    config: SchedulerConfig,
    instance_id: InstanceId,
    lock: Option<DistributedLock>,
    queue: Arc<dyn JobQueue>,
    schedulers: Vec<Arc<dyn EntityScheduler>>,
    state: RwLock<LeadershipState>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SchedulerService {
    /// Creates a service instance.
    ///
    /// With no lock store the instance runs standalone and treats itself
    /// as sole leader, which is the supported single-node configuration.
    #[must_use]
    pub fn new(
        config: SchedulerConfig,
        lock_store: Option<Arc<dyn LockStore>>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        let instance_id = InstanceId::new();
        let lock = lock_store.map(|store| {
            DistributedLock::new(
                store,
                config.lock_key.clone(),
                instance_id,
                std::time::Duration::from_secs(config.lock_ttl_seconds),
            )
        });
        let (shutdown, _) = watch::channel(false);

        Self {
            config,
            instance_id,
            lock,
            queue,
            schedulers: Vec::new(),
            state: RwLock::new(LeadershipState::Uninitialized),
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Registers an entity scheduler. Call before [`init`](Self::init).
    pub fn register_entity_scheduler(&mut self, scheduler: Arc<dyn EntityScheduler>) {
        tracing::debug!(entity_type = scheduler.entity_type(), "entity scheduler registered");
        self.schedulers.push(scheduler);
    }

    /// This instance's id, also the value it stores in the lock.
    #[must_use]
    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    /// Current leadership state.
    #[must_use]
    pub fn state(&self) -> LeadershipState {
        self.state
            .read()
            .map(|s| *s)
            .unwrap_or(LeadershipState::Uninitialized)
    }

    /// Whether this instance currently leads.
    #[must_use]
    pub fn is_leader(&self) -> bool {
        self.state() == LeadershipState::Leader
    }

    fn set_state(&self, next: LeadershipState) {
        if let Ok(mut state) = self.state.write() {
            *state = next;
        }
    }

    /// Attempts leadership and starts the renewal and polling timers.
    pub async fn init(self: Arc<Self>) {
        self.set_state(LeadershipState::LockAcquisitionAttempted);

        match &self.lock {
            None => {
                tracing::info!(
                    instance_id = %self.instance_id,
                    "no lock backend configured, running standalone as sole leader"
                );
                self.set_state(LeadershipState::Leader);
            }
            Some(lock) => match lock.try_acquire().await {
                Ok(true) => {
                    tracing::info!(instance_id = %self.instance_id, "scheduler leadership acquired");
                    self.set_state(LeadershipState::Leader);
                }
                Ok(false) => {
                    tracing::debug!(instance_id = %self.instance_id, "another instance leads");
                    self.set_state(LeadershipState::Follower);
                }
                Err(e) => {
                    // Availability over strict coordination: a missing
                    // backend must not stop a single-node deployment.
                    tracing::warn!(
                        instance_id = %self.instance_id,
                        error = %e,
                        "lock backend unavailable, assuming sole leadership"
                    );
                    self.set_state(LeadershipState::Leader);
                }
            },
        }

        if self.lock.is_some() {
            let svc = Arc::clone(&self);
            let mut rx = self.shutdown.subscribe();
            let period = std::time::Duration::from_secs(self.config.lock_renewal_seconds);
            self.push_task(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = rx.changed() => break,
                        _ = ticker.tick() => svc.renew_leadership().await,
                    }
                }
            }));
        }

        let svc = Arc::clone(&self);
        let mut rx = self.shutdown.subscribe();
        let period = std::time::Duration::from_secs(self.config.poll_interval_seconds);
        self.push_task(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = rx.changed() => break,
                    _ = ticker.tick() => {
                        svc.process_due_jobs(Utc::now()).await;
                    }
                }
            }
        }));
    }

    fn push_task(&self, handle: JoinHandle<()>) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(handle);
        }
    }

    /// One renewal tick: leaders extend the lease, followers attempt a
    /// takeover.
    async fn renew_leadership(&self) {
        let Some(lock) = &self.lock else { return };

        match self.state() {
            LeadershipState::Leader => match lock.renew().await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!(instance_id = %self.instance_id, "scheduler leadership lost");
                    self.set_state(LeadershipState::Follower);
                }
                Err(e) => {
                    tracing::warn!(
                        instance_id = %self.instance_id,
                        error = %e,
                        "lock renewal failed"
                    );
                }
            },
            LeadershipState::Follower => match lock.try_acquire().await {
                Ok(true) => {
                    tracing::info!(instance_id = %self.instance_id, "scheduler leadership acquired");
                    self.set_state(LeadershipState::Leader);
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        instance_id = %self.instance_id,
                        error = %e,
                        "lock acquisition failed"
                    );
                }
            },
            _ => {}
        }
    }

    /// One polling cycle: discovers and dispatches jobs due in the window
    /// starting at `now`. A no-op unless this instance leads.
    ///
    /// Returns the number of jobs dispatched. Per-entity-type failures are
    /// logged and do not abort the cycle for other entity types.
    pub async fn process_due_jobs(&self, now: DateTime<Utc>) -> usize {
        if !self.is_leader() {
            tracing::debug!(instance_id = %self.instance_id, "not leader, skipping poll tick");
            return 0;
        }

        let window_end = now + Duration::seconds(self.config.poll_window_seconds as i64);
        let mut dispatched = 0;

        for scheduler in &self.schedulers {
            match self.process_entity(scheduler.as_ref(), now, window_end).await {
                Ok(count) => dispatched += count,
                Err(e) => {
                    tracing::warn!(
                        entity_type = scheduler.entity_type(),
                        error = %e,
                        "entity scheduler failed, continuing with remaining types"
                    );
                }
            }
        }

        if dispatched > 0 {
            tracing::info!(dispatched, "polling cycle dispatched due jobs");
        }
        dispatched
    }

    /// Drains one entity type's due jobs in batches until a short batch
    /// signals exhaustion.
    async fn process_entity(
        &self,
        scheduler: &dyn EntityScheduler,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<usize, EntityError> {
        let limit = self.config.batch_size;
        let mut offset = 0;
        let mut dispatched = 0;

        loop {
            let jobs = scheduler.find_due_jobs(from, to, limit, offset).await?;
            if jobs.is_empty() {
                break;
            }

            // Advance execution times before dispatch. A crash between the
            // two steps skips the occurrence; it never duplicates it.
            let advanced: Vec<ScheduledJobConfig> = jobs
                .iter()
                .map(|job| {
                    let mut updated = job.clone();
                    updated.last_execution_time = Some(job.next_execution_time);
                    updated.next_execution_time = next_execution_time(job, from);
                    updated
                })
                .collect();
            scheduler.update_execution_time(&advanced).await?;

            for job in &jobs {
                let payload = dispatch_payload(job, from);
                match self.queue.add(&job.job_type, payload).await {
                    Ok(()) => dispatched += 1,
                    Err(e) => {
                        // The execution time already moved on, so this
                        // occurrence is skipped, not retried.
                        tracing::warn!(
                            job_id = %job.id,
                            error = %e,
                            "enqueue failed, occurrence skipped"
                        );
                    }
                }
            }

            if jobs.len() < limit {
                break;
            }
            offset += jobs.len();
        }

        Ok(dispatched)
    }

    /// Stops the timers, waits for in-flight work to settle, and releases
    /// the lock when held.
    pub async fn shutdown(&self) {
        self.set_state(LeadershipState::ShuttingDown);
        let _ = self.shutdown.send(true);

        let handles: Vec<JoinHandle<()>> = match self.tasks.lock() {
            Ok(mut tasks) => tasks.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for handle in handles {
            let _ = handle.await;
        }

        if let Some(lock) = &self.lock {
            match lock.release().await {
                Ok(true) => {
                    tracing::info!(instance_id = %self.instance_id, "scheduler lock released");
                }
                Ok(false) => {
                    tracing::debug!(instance_id = %self.instance_id, "lock not held at shutdown");
                }
                Err(e) => {
                    tracing::warn!(
                        instance_id = %self.instance_id,
                        error = %e,
                        "lock release failed"
                    );
                }
            }
        }
    }
}

/// Builds the dispatch payload for a due job: its own data plus the
/// traceability fields consumers use for idempotency checks.
fn dispatch_payload(job: &ScheduledJobConfig, scheduled_at: DateTime<Utc>) -> JsonValue {
    let mut payload = match &job.job_data {
        JsonValue::Object(map) => map.clone(),
        JsonValue::Null => serde_json::Map::new(),
        other => {
            let mut map = serde_json::Map::new();
            map.insert("data".to_string(), other.clone());
            map
        }
    };

    payload.insert(
        "_scheduledJobId".to_string(),
        JsonValue::String(job.id.to_string()),
    );
    payload.insert(
        "_entityId".to_string(),
        JsonValue::String(job.entity_id.clone()),
    );
    payload.insert(
        "_entityType".to_string(),
        JsonValue::String(job.entity_type.clone()),
    );
    payload.insert(
        "_scheduledAt".to_string(),
        JsonValue::String(scheduled_at.to_rfc3339()),
    );
    payload.insert(
        "_originalExecutionTime".to_string(),
        JsonValue::String(job.next_execution_time.to_rfc3339()),
    );

    JsonValue::Object(payload)
}
