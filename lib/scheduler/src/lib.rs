//! Distributed scheduling for the copper-relay platform.
//!
//! A fleet of server instances runs the same polling loop; a TTL-based
//! distributed lock elects one leader per window, and only the leader
//! discovers due jobs and dispatches them to the job queue. This crate
//! provides:
//!
//! - **Distributed Lock**: acquire/renew/release with ownership checks
//! - **Schedule Evaluation**: cron (timezone-aware) and interval schedules
//! - **Entity Schedulers**: pluggable sources of due work
//! - **Job Queue boundary**: where due jobs are dispatched
//! - **Scheduler Service**: the per-process polling loop and its lifecycle

pub mod config;
pub mod entity;
pub mod error;
pub mod lock;
pub mod queue;
pub mod schedule;
pub mod service;

pub use config::SchedulerConfig;
pub use entity::{EntityScheduler, ScheduledJobConfig};
pub use error::{EntityError, LockError, QueueError, ScheduleError};
pub use lock::{DistributedLock, InMemoryLockStore, LockStore};
pub use queue::{InMemoryJobQueue, JobQueue, QueuedJob};
pub use schedule::{next_cron_occurrence, next_execution_time};
pub use service::{LeadershipState, SchedulerService};
