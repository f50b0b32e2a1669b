//! # Job Registry
//!
//! Tracks every [`AsyncJob`] created by one check instance so the check can
//! cancel and join all of its background work on shutdown.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::async_job::{AsyncJob, JobRunner, JobSettings, JobStatus, LoopStatus};
use super::telemetry::MetricSink;
use super::worker_pool::WorkerPool;
use crate::config::ConfigResult;
use crate::logging::log_job_operation;

/// The check instance a job belongs to, and where its telemetry goes
#[derive(Clone)]
pub struct JobOwner {
    check_id: Uuid,
    check_name: String,
    sink: Arc<dyn MetricSink>,
}

impl fmt::Debug for JobOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobOwner")
            .field("check_id", &self.check_id)
            .field("check_name", &self.check_name)
            .finish_non_exhaustive()
    }
}

impl JobOwner {
    pub fn new(check_name: impl Into<String>, sink: Arc<dyn MetricSink>) -> Self {
        Self {
            check_id: Uuid::new_v4(),
            check_name: check_name.into(),
            sink,
        }
    }

    pub fn check_id(&self) -> Uuid {
        self.check_id
    }

    pub fn check_name(&self) -> &str {
        &self.check_name
    }

    pub fn sink(&self) -> &dyn MetricSink {
        self.sink.as_ref()
    }
}

/// Result of joining every registered job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitReport {
    /// Loops that exited cleanly
    pub completed: Vec<String>,
    /// Loops that ended with a fatal error, with the error message
    pub failed: Vec<(String, String)>,
    /// Loops still running when the timeout elapsed
    pub timed_out: Vec<String>,
    /// Jobs never started, e.g. because they are disabled
    pub not_started: Vec<String>,
}

impl WaitReport {
    /// True when no job was left running
    pub fn all_stopped(&self) -> bool {
        self.timed_out.is_empty()
    }
}

pub struct JobRegistry {
    owner: JobOwner,
    pool: Arc<WorkerPool>,
    jobs: Mutex<Vec<Arc<AsyncJob>>>,
}

impl fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRegistry")
            .field("owner", &self.owner)
            .field("jobs", &self.jobs.lock().len())
            .finish()
    }
}

impl JobRegistry {
    pub fn new(
        check_name: impl Into<String>,
        pool: Arc<WorkerPool>,
        sink: Arc<dyn MetricSink>,
    ) -> Self {
        Self {
            owner: JobOwner::new(check_name, sink),
            pool,
            jobs: Mutex::new(Vec::new()),
        }
    }

    pub fn owner(&self) -> &JobOwner {
        &self.owner
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Build a job owned by this registry's check and register it
    pub fn create_job(
        &self,
        settings: JobSettings,
        runner: Arc<dyn JobRunner>,
    ) -> ConfigResult<Arc<AsyncJob>> {
        settings.validate()?;
        let job = AsyncJob::new(self.owner.clone(), settings, runner, Arc::clone(&self.pool));
        Ok(self.register(job))
    }

    /// Track `job` and hand it back for chaining
    pub fn register(&self, job: Arc<AsyncJob>) -> Arc<AsyncJob> {
        if job.owner().check_id() != self.owner.check_id {
            warn!(
                job_name = %job.job_name(),
                check_name = %self.owner.check_name,
                "Registering job constructed for a different check"
            );
        }
        debug!(job_name = %job.job_name(), check_name = %self.owner.check_name, "Job registered");
        self.jobs.lock().push(Arc::clone(&job));
        job
    }

    /// Registered jobs in insertion order
    pub fn jobs(&self) -> Vec<Arc<AsyncJob>> {
        self.jobs.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }

    /// Signal every registered job to stop
    pub fn cancel_all(&self) {
        let jobs = self.jobs();
        for job in &jobs {
            job.cancel();
        }
        log_job_operation(
            "cancel_all",
            &self.owner.check_name,
            "*",
            "cancelled",
            Some(&format!("{} jobs", jobs.len())),
        );
    }

    /// Join every started job, sharing one `timeout` across all of them.
    ///
    /// Jobs that never started are listed but not waited on. Jobs still
    /// running at the deadline keep running and are reported as timed out.
    pub async fn wait_all(&self, timeout: Duration) -> WaitReport {
        let deadline = Instant::now() + timeout;
        let mut report = WaitReport::default();

        for job in self.jobs() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let name = job.job_name().to_string();
            match job.wait(remaining).await {
                LoopStatus::NotStarted => report.not_started.push(name),
                LoopStatus::Failed { error } => report.failed.push((name, error)),
                LoopStatus::TimedOut | LoopStatus::Running => report.timed_out.push(name),
                LoopStatus::Completed { .. } | LoopStatus::Exited => report.completed.push(name),
            }
        }

        if report.all_stopped() {
            info!(
                check_name = %self.owner.check_name,
                completed = report.completed.len(),
                failed = report.failed.len(),
                not_started = report.not_started.len(),
                "All jobs stopped"
            );
        } else {
            warn!(
                check_name = %self.owner.check_name,
                timed_out = ?report.timed_out,
                timeout_ms = timeout.as_millis() as u64,
                "Jobs still running after wait timeout"
            );
        }
        report
    }

    /// Make every registered job run exactly one iteration per `run_job_loop` call
    pub fn enable_test_mode(&self) {
        for job in self.jobs() {
            job.set_test_mode(true);
        }
    }

    pub async fn statuses(&self) -> Vec<JobStatus> {
        let mut statuses = Vec::new();
        for job in self.jobs() {
            statuses.push(job.status().await);
        }
        statuses
    }

    /// Cancel every job and wait for them to stop
    pub async fn shutdown(&self, timeout: Duration) -> WaitReport {
        self.cancel_all();
        self.wait_all(timeout).await
    }
}
