//! # System Constants
//!
//! Metric names, health event names, and operational defaults shared by the
//! job scheduler, the connection pool, and the limiters.

use std::time::Duration;

/// Metric suffixes emitted by background jobs.
///
/// Full names are built with [`metric_name`], e.g. `dd.postgres.async_job.cancel`.
pub mod metrics {
    pub const ASYNC_JOB_CANCEL: &str = "async_job.cancel";
    pub const ASYNC_JOB_ERROR: &str = "async_job.error";
    pub const ASYNC_JOB_INACTIVE_STOP: &str = "async_job.inactive_stop";
    pub const ASYNC_JOB_RUN_TIME: &str = "async_job.run_job.time";
}

/// Tag prefixes attached to job telemetry
pub mod tags {
    pub const JOB: &str = "job";
    pub const ERROR_DATABASE: &str = "error:database";
    pub const ERROR_CRASH: &str = "error:crash";
}

/// Default values used when no configuration is supplied
pub mod defaults {
    use super::Duration;

    pub const MIN_COLLECTION_INTERVAL: Duration = Duration::from_secs(15);
    pub const RATE_LIMIT: f64 = 1.0;
    pub const HEALTH_EVENT_COOLDOWN: Duration = Duration::from_secs(300);
    /// A loop stops once the check has been silent for this many collection intervals
    pub const INACTIVITY_INTERVAL_MULTIPLIER: u32 = 2;
    pub const MAX_WORKERS: usize = 32;
    pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
    pub const CONNECTION_TTL: Duration = Duration::from_secs(60);
    pub const CONDITION_LIMIT: usize = 1;
}

/// Build a fully qualified job metric name for a monitored system.
pub fn metric_name(dbms: &str, suffix: &str) -> String {
    format!("dd.{dbms}.{suffix}")
}

/// Build the `job:<name>` tag.
pub fn job_tag(job_name: &str) -> String {
    format!("{}:{job_name}", tags::JOB)
}
