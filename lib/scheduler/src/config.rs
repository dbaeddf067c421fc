//! Scheduler configuration.
//!
//! Strongly-typed configuration with per-field defaults, loadable from
//! environment variables via the `config` crate.

use serde::Deserialize;

/// Tuning knobs for the scheduler service.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between polling cycles.
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,

    /// Width of the due-job window, in seconds. Each cycle looks for jobs
    /// due between now and now plus this window.
    #[serde(default = "default_poll_window_seconds")]
    pub poll_window_seconds: u64,

    /// Page size for `find_due_jobs` batches.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Lock TTL in seconds. Leadership lapses this long after the last
    /// successful renewal.
    #[serde(default = "default_lock_ttl_seconds")]
    pub lock_ttl_seconds: u64,

    /// Seconds between lock renewal attempts.
    #[serde(default = "default_lock_renewal_seconds")]
    pub lock_renewal_seconds: u64,

    /// Key under which the leader lock is stored.
    #[serde(default = "default_lock_key")]
    pub lock_key: String,
}

fn default_poll_interval_seconds() -> u64 {
    60
}

fn default_poll_window_seconds() -> u64 {
    60
}

fn default_batch_size() -> usize {
    100
}

fn default_lock_ttl_seconds() -> u64 {
    70
}

fn default_lock_renewal_seconds() -> u64 {
    30
}

fn default_lock_key() -> String {
    "copper-relay:scheduler:leader".to_string()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval_seconds(),
            poll_window_seconds: default_poll_window_seconds(),
            batch_size: default_batch_size(),
            lock_ttl_seconds: default_lock_ttl_seconds(),
            lock_renewal_seconds: default_lock_renewal_seconds(),
            lock_key: default_lock_key(),
        }
    }
}

impl SchedulerConfig {
    /// Loads configuration from `SCHEDULER__`-prefixed environment
    /// variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a present variable fails to parse.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::with_prefix("SCHEDULER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
