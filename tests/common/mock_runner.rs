use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dbm_async_core::jobs::{JobContext, JobError, JobResult, JobRunner};
use parking_lot::Mutex;

/// How a [`CountingJob`] run ends
#[derive(Debug, Clone)]
pub enum FailureMode {
    Succeed,
    /// Database error of the given kind
    DatabaseError(&'static str),
    Panic,
}

/// Job runner that counts its invocations, like the check-side test job
#[derive(Debug)]
pub struct CountingJob {
    executions: AtomicUsize,
    shutdowns: AtomicUsize,
    execution_time: Duration,
    failure: Mutex<FailureMode>,
    seen_tags: Mutex<Vec<Vec<String>>>,
}

impl CountingJob {
    pub fn new() -> Arc<Self> {
        Self::build(Duration::ZERO, FailureMode::Succeed)
    }

    pub fn with_execution_time(execution_time: Duration) -> Arc<Self> {
        Self::build(execution_time, FailureMode::Succeed)
    }

    pub fn failing(mode: FailureMode) -> Arc<Self> {
        Self::build(Duration::ZERO, mode)
    }

    fn build(execution_time: Duration, failure: FailureMode) -> Arc<Self> {
        Arc::new(Self {
            executions: AtomicUsize::new(0),
            shutdowns: AtomicUsize::new(0),
            execution_time,
            failure: Mutex::new(failure),
            seen_tags: Mutex::new(Vec::new()),
        })
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    pub fn last_tags(&self) -> Option<Vec<String>> {
        self.seen_tags.lock().last().cloned()
    }
}

#[async_trait]
impl JobRunner for CountingJob {
    async fn run_job(&self, ctx: &JobContext) -> JobResult<()> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        self.seen_tags.lock().push(ctx.tags().to_vec());

        if !self.execution_time.is_zero() {
            tokio::time::sleep(self.execution_time).await;
        }

        let failure = self.failure.lock().clone();
        match failure {
            FailureMode::Succeed => Ok(()),
            FailureMode::DatabaseError(kind) => Err(JobError::database(kind, "simulated failure")),
            FailureMode::Panic => panic!("simulated panic in run_job"),
        }
    }

    async fn on_shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}
