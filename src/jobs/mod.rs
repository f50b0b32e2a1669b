//! # Background Jobs
//!
//! Recurring, rate-limited collection work that runs off the check's main
//! cycle.
//!
//! - [`WorkerPool`]: process-wide bounded pool every job loop runs on
//! - [`AsyncJob`]: one recurring job with pacing and cooperative cancellation
//! - [`JobRegistry`]: per-check collection of jobs with bulk cancel and join
//! - [`MetricSink`]: destination for job telemetry and health events
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use async_trait::async_trait;
//! use dbm_async_core::jobs::{
//!     JobContext, JobRegistry, JobResult, JobRunner, JobSettings, TracingSink, WorkerPool,
//! };
//!
//! struct QuerySamples;
//!
//! #[async_trait]
//! impl JobRunner for QuerySamples {
//!     async fn run_job(&self, ctx: &JobContext) -> JobResult<()> {
//!         tracing::info!(tags = ?ctx.tags(), "collecting samples");
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = WorkerPool::new(8)?;
//! let registry = JobRegistry::new("postgres", pool, Arc::new(TracingSink));
//! let job = registry.create_job(
//!     JobSettings::new("query-samples", "postgres", "db.local")
//!         .with_min_collection_interval(Duration::from_secs(10)),
//!     Arc::new(QuerySamples),
//! )?;
//! job.run_job_loop(&["env:prod".to_string()]).await?;
//!
//! let report = registry.shutdown(Duration::from_secs(5)).await;
//! assert!(report.all_stopped());
//! # Ok(())
//! # }
//! ```

pub mod async_job;
pub mod errors;
pub mod health;
pub mod registry;
pub mod telemetry;
pub mod worker_pool;

pub use async_job::{
    AsyncJob, JobContext, JobExit, JobOutcome, JobRunner, JobSettings, JobStatus, LoopStatus,
};
pub use errors::{JobError, JobResult};
pub use health::{HealthEvent, HealthEventKind, HealthStatus, JobHealthMonitor};
pub use registry::{JobOwner, JobRegistry, WaitReport};
pub use telemetry::{JobMetrics, JobMetricsSnapshot, MetricSink, TracingSink};
pub use worker_pool::WorkerPool;
