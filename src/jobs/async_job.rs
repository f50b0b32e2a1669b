//! # Async Job
//!
//! A recurring background collection task owned by one check instance.
//!
//! Each call to [`AsyncJob::run_job_loop`] marks the check as alive and makes
//! sure the job's loop is running on the shared [`WorkerPool`]. The loop
//! repeatedly invokes [`JobRunner::run_job`], spacing runs by the minimum
//! collection interval and the rate limit, until it is cancelled, the check
//! goes inactive, or `run_job` fails with an error the job does not expect.
//!
//! Cancellation is cooperative: it is observed between iterations and during
//! pacing waits, never in the middle of `run_job`.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::errors::{JobError, JobResult};
use super::health::{HealthSource, JobHealthMonitor};
use super::registry::JobOwner;
use super::telemetry::{JobMetrics, JobMetricsSnapshot};
use super::worker_pool::WorkerPool;
use crate::config::{ConfigResult, ConfigurationError, JobDefaultsConfig};
use crate::constants::{defaults, job_tag, metric_name, metrics, tags};
use crate::logging::{log_error, log_job_operation};
use crate::resilience::ConstantRateLimiter;

/// Identity and pacing for one job. Immutable once the job is built.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSettings {
    pub job_name: String,
    pub dbms: String,
    pub config_host: String,
    pub enabled: bool,
    /// Run one iteration inline per `run_job_loop` call instead of a background loop
    pub run_sync: bool,
    pub min_collection_interval: Duration,
    /// Maximum runs per second; zero disables the limit
    pub rate_limit: f64,
    /// Error kinds logged and skipped instead of ending the loop
    pub expected_db_errors: Vec<String>,
    /// Stop the loop when the check has not called `run_job_loop` for this long.
    /// `None` derives the timeout from the collection interval.
    pub inactivity_timeout: Option<Duration>,
    pub health_event_cooldown: Duration,
}

impl JobSettings {
    pub fn new(
        job_name: impl Into<String>,
        dbms: impl Into<String>,
        config_host: impl Into<String>,
    ) -> Self {
        Self {
            job_name: job_name.into(),
            dbms: dbms.into(),
            config_host: config_host.into(),
            enabled: true,
            run_sync: false,
            min_collection_interval: defaults::MIN_COLLECTION_INTERVAL,
            rate_limit: defaults::RATE_LIMIT,
            expected_db_errors: Vec::new(),
            inactivity_timeout: None,
            health_event_cooldown: defaults::HEALTH_EVENT_COOLDOWN,
        }
    }

    /// Build settings from configured job defaults
    pub fn from_defaults(
        job_name: impl Into<String>,
        dbms: impl Into<String>,
        config_host: impl Into<String>,
        config: &JobDefaultsConfig,
    ) -> Self {
        Self {
            run_sync: config.run_sync,
            min_collection_interval: config.min_collection_interval(),
            rate_limit: config.rate_limit,
            expected_db_errors: config.expected_db_errors.clone(),
            inactivity_timeout: config.inactivity_timeout(),
            health_event_cooldown: config.health_event_cooldown(),
            ..Self::new(job_name, dbms, config_host)
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_run_sync(mut self, run_sync: bool) -> Self {
        self.run_sync = run_sync;
        self
    }

    pub fn with_min_collection_interval(mut self, interval: Duration) -> Self {
        self.min_collection_interval = interval;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: f64) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_expected_db_errors<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expected_db_errors = kinds.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.inactivity_timeout = Some(timeout);
        self
    }

    pub fn with_health_event_cooldown(mut self, cooldown: Duration) -> Self {
        self.health_event_cooldown = cooldown;
        self
    }

    /// Silence after which the loop stops: the explicit timeout, else twice
    /// the collection interval. `None` when neither is set.
    pub fn effective_inactivity_timeout(&self) -> Option<Duration> {
        match self.inactivity_timeout {
            Some(timeout) => Some(timeout),
            None if self.min_collection_interval.is_zero() => None,
            None => Some(
                self.min_collection_interval
                    .saturating_mul(defaults::INACTIVITY_INTERVAL_MULTIPLIER),
            ),
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.job_name.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "job_name",
                &self.job_name,
                "must not be empty",
            ));
        }
        if !self.rate_limit.is_finite() {
            return Err(ConfigurationError::invalid_value(
                "rate_limit",
                self.rate_limit,
                "must be a finite number of runs per second",
            ));
        }
        if self.inactivity_timeout == Some(Duration::ZERO) {
            return Err(ConfigurationError::invalid_value(
                "inactivity_timeout",
                "0s",
                "must be positive when set",
            ));
        }
        Ok(())
    }
}

/// The work performed by a job on every iteration
#[async_trait]
pub trait JobRunner: Send + Sync + 'static {
    async fn run_job(&self, ctx: &JobContext) -> JobResult<()>;

    /// Called once when the background loop exits, whatever the reason
    async fn on_shutdown(&self) {}
}

/// Per-iteration view handed to [`JobRunner::run_job`]
#[derive(Debug, Clone)]
pub struct JobContext {
    job_name: String,
    dbms: String,
    config_host: String,
    tags: Vec<String>,
    iteration: u64,
    cancellation: CancellationToken,
}

impl JobContext {
    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn dbms(&self) -> &str {
        &self.dbms
    }

    pub fn config_host(&self) -> &str {
        &self.config_host
    }

    /// Check tags plus `job:<name>`
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Zero-based count of `run_job` calls made by this job before this one
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Long-running collections may poll this to stop early
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }
}

/// Why a job loop returned without error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobExit {
    Cancelled,
    /// The owning check stopped calling `run_job_loop`
    Inactive,
    /// Single iteration in test mode
    TestModeComplete,
    /// Single inline iteration in `run_sync` mode
    Completed,
}

pub type JobOutcome = Result<JobExit, JobError>;

/// Observable state of a job's execution unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LoopStatus {
    /// `run_job_loop` was never called while enabled
    NotStarted,
    Running,
    /// Finished but not yet joined
    Exited,
    Completed { exit: JobExit },
    Failed { error: String },
    /// A bounded wait elapsed with the loop still running
    TimedOut,
}

impl LoopStatus {
    fn from_outcome(outcome: &JobOutcome) -> Self {
        match outcome {
            Ok(exit) => LoopStatus::Completed { exit: *exit },
            Err(e) => LoopStatus::Failed {
                error: e.to_string(),
            },
        }
    }
}

enum LoopState {
    NotStarted,
    Running {
        handle: JoinHandle<JobOutcome>,
        /// Closes when the loop task drops its sender, i.e. when it ends
        done: watch::Receiver<()>,
    },
    Finished(JobOutcome),
}

/// Serializable snapshot of a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: Uuid,
    pub job_name: String,
    pub dbms: String,
    pub config_host: String,
    pub enabled: bool,
    pub run_sync: bool,
    pub test_mode: bool,
    pub cancelled: bool,
    pub loop_status: LoopStatus,
    pub last_run_at: Option<DateTime<Utc>>,
    pub metrics: JobMetricsSnapshot,
}

struct RuntimeState {
    tags: Vec<String>,
    last_check_run: Option<Instant>,
    last_run_time: Option<Instant>,
    last_run_at: Option<DateTime<Utc>>,
    rate_limiter: ConstantRateLimiter,
    iterations: u64,
}

pub struct AsyncJob {
    id: Uuid,
    owner: JobOwner,
    settings: JobSettings,
    runner: Arc<dyn JobRunner>,
    pool: Arc<WorkerPool>,
    cancellation: CancellationToken,
    test_mode: AtomicBool,
    state: Mutex<LoopState>,
    runtime: parking_lot::Mutex<RuntimeState>,
    metrics: JobMetrics,
    health: JobHealthMonitor,
}

impl fmt::Debug for AsyncJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncJob")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("settings", &self.settings)
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl AsyncJob {
    pub fn new(
        owner: JobOwner,
        settings: JobSettings,
        runner: Arc<dyn JobRunner>,
        pool: Arc<WorkerPool>,
    ) -> Arc<Self> {
        let cancellation = pool.child_token();
        let health = JobHealthMonitor::new(settings.health_event_cooldown);
        let rate_limiter = ConstantRateLimiter::new(settings.rate_limit);

        Arc::new(Self {
            id: Uuid::new_v4(),
            owner,
            settings,
            runner,
            pool,
            cancellation,
            test_mode: AtomicBool::new(false),
            state: Mutex::new(LoopState::NotStarted),
            runtime: parking_lot::Mutex::new(RuntimeState {
                tags: Vec::new(),
                last_check_run: None,
                last_run_time: None,
                last_run_at: None,
                rate_limiter,
                iterations: 0,
            }),
            metrics: JobMetrics::new(),
            health,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn job_name(&self) -> &str {
        &self.settings.job_name
    }

    pub fn settings(&self) -> &JobSettings {
        &self.settings
    }

    pub fn owner(&self) -> &JobOwner {
        &self.owner
    }

    pub fn metrics(&self) -> &JobMetrics {
        &self.metrics
    }

    /// Make sure the job is running and record that the check is alive.
    ///
    /// Disabled jobs do nothing. In `run_sync` mode a single iteration runs
    /// inline, unless the rate limit says it is not yet due, in which case the
    /// call is skipped. Otherwise the loop is submitted to the worker pool if
    /// it is not already running. A busy loop whose last run started more
    /// than one collection interval ago triggers a missed-collection event.
    ///
    /// Errors from `run_job` never surface here; only a closed worker pool does.
    #[instrument(skip(self, tags), fields(job_name = %self.settings.job_name, dbms = %self.settings.dbms))]
    pub async fn run_job_loop(self: &Arc<Self>, tags: &[String]) -> JobResult<()> {
        if !self.settings.enabled {
            debug!("Job disabled, not starting loop");
            return Ok(());
        }

        {
            let mut runtime = self.runtime.lock();
            runtime.tags = tags.to_vec();
            runtime.last_check_run = Some(Instant::now());
        }

        if self.settings.run_sync {
            self.run_sync_iteration().await;
            return Ok(());
        }

        let mut state = self.state.lock().await;
        if let LoopState::Running { handle, .. } = &*state {
            if !handle.is_finished() {
                self.check_missed_collection();
                return Ok(());
            }
        }

        if self.cancellation.is_cancelled() {
            debug!("Job cancelled, not restarting loop");
            return Ok(());
        }

        let job = Arc::clone(self);
        let (done_tx, done) = watch::channel(());
        let handle = self.pool.submit(async move {
            let _done = done_tx;
            job.job_loop().await
        })?;
        *state = LoopState::Running { handle, done };
        log_job_operation(
            "start_loop",
            &self.settings.job_name,
            &self.settings.dbms,
            "submitted",
            None,
        );
        Ok(())
    }

    async fn run_sync_iteration(&self) {
        let mut state = self.state.lock().await;
        if self.cancellation.is_cancelled() {
            debug!("Job cancelled, skipping inline run");
            return;
        }

        let due = self.runtime.lock().rate_limiter.shall_execute();
        if !due {
            self.metrics.record_skipped();
            debug!("Inline run skipped, rate limit not yet elapsed");
            return;
        }

        let ctx = self.context();
        let outcome = self.run_iteration(&ctx).await.map(|()| JobExit::Completed);
        *state = LoopState::Finished(outcome);
    }

    /// Signal the loop to stop. Idempotent; does not wait.
    pub fn cancel(&self) {
        if !self.cancellation.is_cancelled() {
            debug!(job_name = %self.settings.job_name, "Cancelling job");
            self.cancellation.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// In test mode each `run_job_loop` call runs exactly one iteration without pacing waits
    pub fn set_test_mode(&self, enabled: bool) {
        self.test_mode.store(enabled, Ordering::SeqCst);
    }

    pub fn test_mode(&self) -> bool {
        self.test_mode.load(Ordering::SeqCst)
    }

    /// Whether `run_job_loop` ever created an execution unit
    pub async fn has_started(&self) -> bool {
        !matches!(*self.state.lock().await, LoopState::NotStarted)
    }

    pub async fn is_running(&self) -> bool {
        matches!(&*self.state.lock().await, LoopState::Running { handle, .. } if !handle.is_finished())
    }

    /// Wait up to `timeout` for the loop to finish.
    ///
    /// A job that never started reports [`LoopStatus::NotStarted`]. A loop
    /// still running after `timeout` is left running and reported as
    /// [`LoopStatus::TimedOut`]. The job's state is not locked while waiting,
    /// so `run_job_loop` and `status` stay responsive.
    pub async fn wait(&self, timeout: Duration) -> LoopStatus {
        let mut done = match &*self.state.lock().await {
            LoopState::NotStarted => return LoopStatus::NotStarted,
            LoopState::Finished(outcome) => return LoopStatus::from_outcome(outcome),
            LoopState::Running { done, .. } => done.clone(),
        };

        let closed = async { while done.changed().await.is_ok() {} };
        if tokio::time::timeout(timeout, closed).await.is_err() {
            return LoopStatus::TimedOut;
        }

        let mut state = self.state.lock().await;
        let handle = match &mut *state {
            LoopState::NotStarted => return LoopStatus::NotStarted,
            LoopState::Finished(outcome) => return LoopStatus::from_outcome(outcome),
            // restarted by a concurrent run_job_loop while unlocked
            LoopState::Running { done, .. } if done.has_changed().is_ok() => {
                return LoopStatus::Running
            }
            LoopState::Running { handle, .. } => handle,
        };

        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(join_error) => Err(JobError::Panicked {
                message: join_error.to_string(),
            }),
        };
        let status = LoopStatus::from_outcome(&outcome);
        *state = LoopState::Finished(outcome);
        status
    }

    pub async fn status(&self) -> JobStatus {
        let loop_status = match &*self.state.lock().await {
            LoopState::NotStarted => LoopStatus::NotStarted,
            LoopState::Running { handle, .. } if handle.is_finished() => LoopStatus::Exited,
            LoopState::Running { .. } => LoopStatus::Running,
            LoopState::Finished(outcome) => LoopStatus::from_outcome(outcome),
        };

        JobStatus {
            job_id: self.id,
            job_name: self.settings.job_name.clone(),
            dbms: self.settings.dbms.clone(),
            config_host: self.settings.config_host.clone(),
            enabled: self.settings.enabled,
            run_sync: self.settings.run_sync,
            test_mode: self.test_mode(),
            cancelled: self.is_cancelled(),
            loop_status,
            last_run_at: self.runtime.lock().last_run_at,
            metrics: self.metrics.snapshot(),
        }
    }

    async fn job_loop(self: Arc<Self>) -> JobOutcome {
        info!(
            job_name = %self.settings.job_name,
            dbms = %self.settings.dbms,
            config_host = %self.settings.config_host,
            "▶️ Job loop started"
        );

        let outcome = self.run_loop_body().await;
        let (status, details) = match &outcome {
            Ok(exit) => ("stopped", format!("{exit:?}")),
            Err(e) => ("failed", e.to_string()),
        };
        log_job_operation(
            "loop_exit",
            &self.settings.job_name,
            &self.settings.dbms,
            status,
            Some(&details),
        );

        if AssertUnwindSafe(self.runner.on_shutdown())
            .catch_unwind()
            .await
            .is_err()
        {
            error!(job_name = %self.settings.job_name, "Job shutdown callback panicked");
        }
        outcome
    }

    async fn run_loop_body(&self) -> JobOutcome {
        loop {
            if self.cancellation.is_cancelled() {
                self.record_cancel();
                return Ok(JobExit::Cancelled);
            }
            if self.is_inactive() {
                self.record_inactive_stop();
                return Ok(JobExit::Inactive);
            }

            let test_mode = self.test_mode();
            if !test_mode {
                let delay = self.pacing_delay();
                if !delay.is_zero() {
                    tokio::select! {
                        _ = self.cancellation.cancelled() => {
                            self.record_cancel();
                            return Ok(JobExit::Cancelled);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }

            let ctx = self.context();
            self.run_iteration(&ctx).await?;

            if test_mode {
                return Ok(JobExit::TestModeComplete);
            }
        }
    }

    /// Invoke `run_job` once. Expected errors are absorbed; anything else is returned.
    async fn run_iteration(&self, ctx: &JobContext) -> JobResult<()> {
        {
            let mut runtime = self.runtime.lock();
            runtime.last_run_time = Some(Instant::now());
            runtime.last_run_at = Some(Utc::now());
            runtime.rate_limiter.update_last_time();
            runtime.iterations += 1;
        }

        let started = Instant::now();
        let result = AssertUnwindSafe(self.runner.run_job(ctx))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(JobError::Panicked {
                    message: panic_message(payload.as_ref()),
                })
            });
        let elapsed = started.elapsed();

        self.metrics.record_run(elapsed);
        self.owner.sink().histogram(
            &metric_name(&self.settings.dbms, metrics::ASYNC_JOB_RUN_TIME),
            elapsed.as_micros() as f64 / 1000.0,
            ctx.tags(),
        );

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_expected(&self.settings.expected_db_errors) => {
                self.metrics.record_expected_error();
                warn!(
                    job_name = %self.settings.job_name,
                    dbms = %self.settings.dbms,
                    error_kind = %e.kind(),
                    error = %e,
                    "Expected database error in job run, continuing"
                );
                self.emit_count(
                    metrics::ASYNC_JOB_ERROR,
                    Some(format!("{}-{}", tags::ERROR_DATABASE, e.kind())),
                );
                Ok(())
            }
            Err(e) => {
                self.metrics.record_fatal_error();
                log_error(
                    "async_job",
                    &self.settings.job_name,
                    &e.to_string(),
                    Some(e.kind()),
                );
                self.emit_count(
                    metrics::ASYNC_JOB_ERROR,
                    Some(format!("{}-{}", tags::ERROR_CRASH, e.kind())),
                );
                Err(e)
            }
        }
    }

    fn context(&self) -> JobContext {
        let runtime = self.runtime.lock();
        JobContext {
            job_name: self.settings.job_name.clone(),
            dbms: self.settings.dbms.clone(),
            config_host: self.settings.config_host.clone(),
            tags: with_job_tag(&runtime.tags, &self.settings.job_name),
            iteration: runtime.iterations,
            cancellation: self.cancellation.clone(),
        }
    }

    /// Wait before the next run: the larger of the remaining collection
    /// interval and the remaining rate limit period
    fn pacing_delay(&self) -> Duration {
        let runtime = self.runtime.lock();
        let interval_wait = runtime
            .last_run_time
            .map(|last| self.settings.min_collection_interval.saturating_sub(last.elapsed()))
            .unwrap_or(Duration::ZERO);
        interval_wait.max(runtime.rate_limiter.time_until_next())
    }

    fn is_inactive(&self) -> bool {
        let Some(timeout) = self.settings.effective_inactivity_timeout() else {
            return false;
        };
        self.runtime
            .lock()
            .last_check_run
            .is_some_and(|last| last.elapsed() > timeout)
    }

    fn check_missed_collection(&self) {
        let (elapsed, tags) = {
            let runtime = self.runtime.lock();
            let Some(last) = runtime.last_run_time else {
                return;
            };
            (last.elapsed(), runtime.tags.clone())
        };
        if elapsed <= self.settings.min_collection_interval {
            return;
        }

        let source = HealthSource {
            check_id: self.owner.check_id(),
            check_name: self.owner.check_name(),
            dbms: &self.settings.dbms,
            config_host: &self.settings.config_host,
            job_name: &self.settings.job_name,
            tags: &tags,
        };
        if self
            .health
            .report_missed_collection(&source, elapsed, self.owner.sink())
        {
            self.metrics.record_missed_collection();
        }
    }

    fn record_cancel(&self) {
        self.metrics.record_cancellation();
        info!(job_name = %self.settings.job_name, "Job loop cancelled");
        self.emit_count(metrics::ASYNC_JOB_CANCEL, None);
    }

    fn record_inactive_stop(&self) {
        self.metrics.record_inactive_stop();
        info!(
            job_name = %self.settings.job_name,
            timeout_ms = self
                .settings
                .effective_inactivity_timeout()
                .map(|t| t.as_millis() as u64),
            "Check inactive, stopping job loop"
        );
        self.emit_count(metrics::ASYNC_JOB_INACTIVE_STOP, None);
    }

    fn emit_count(&self, suffix: &str, extra_tag: Option<String>) {
        let mut tags = with_job_tag(&self.runtime.lock().tags, &self.settings.job_name);
        tags.extend(extra_tag);
        self.owner
            .sink()
            .count(&metric_name(&self.settings.dbms, suffix), 1, &tags);
    }
}

fn with_job_tag(tags: &[String], job_name: &str) -> Vec<String> {
    let mut tags = tags.to_vec();
    tags.push(job_tag(job_name));
    tags
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
