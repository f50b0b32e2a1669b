//! # Worker Pool
//!
//! The process-wide pool that runs every background job loop. It is created
//! once at process start, handed to each job explicitly, and drained at
//! shutdown.
//!
//! A semaphore bounds how many submitted loops make progress at once,
//! independent of how many jobs exist. Each job's cancellation token is a
//! child of the pool's shutdown token, so [`WorkerPool::shutdown`] stops
//! every job cooperatively.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::errors::{JobError, JobResult};
use crate::config::WorkerPoolConfig;

#[derive(Debug)]
pub struct WorkerPool {
    handle: Handle,
    max_workers: usize,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl WorkerPool {
    /// Create a pool on the current Tokio runtime
    pub fn new(max_workers: usize) -> JobResult<Arc<Self>> {
        let handle = Handle::try_current().map_err(anyhow::Error::from)?;
        Ok(Self::with_handle(handle, max_workers))
    }

    /// Create a pool that spawns onto `handle`
    pub fn with_handle(handle: Handle, max_workers: usize) -> Arc<Self> {
        let max_workers = max_workers.max(1);
        info!(max_workers = max_workers, "🚀 Worker pool created");
        Arc::new(Self {
            handle,
            max_workers,
            permits: Arc::new(Semaphore::new(max_workers)),
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn from_config(config: &WorkerPoolConfig) -> JobResult<Arc<Self>> {
        Self::new(config.max_workers)
    }

    /// Run `task` once a worker slot is free.
    ///
    /// Fails with [`JobError::WorkerPoolClosed`] after [`shutdown`](Self::shutdown).
    pub fn submit<F>(&self, task: F) -> JobResult<JoinHandle<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if self.shutdown.is_cancelled() {
            return Err(JobError::WorkerPoolClosed);
        }

        let permits = Arc::clone(&self.permits);
        let handle = self.tracker.spawn_on(
            async move {
                let _permit = permits.acquire_owned().await;
                task.await
            },
            &self.handle,
        );
        debug!(running = self.tracker.len(), "Task submitted to worker pool");
        Ok(handle)
    }

    /// Token cancelled when the pool shuts down
    pub fn child_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    /// Stop accepting work and cancel every job created from this pool
    pub fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        info!(running = self.tracker.len(), "🛑 Worker pool shutting down");
        self.shutdown.cancel();
        self.tracker.close();
    }

    /// Wait for submitted tasks to finish. Returns false on timeout.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tracker.close();
        match tokio::time::timeout(timeout, self.tracker.wait()).await {
            Ok(()) => {
                debug!("Worker pool drained");
                true
            }
            Err(_) => {
                warn!(
                    running = self.tracker.len(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Worker pool did not drain within timeout"
                );
                false
            }
        }
    }

    pub async fn shutdown_and_drain(&self, timeout: Duration) -> bool {
        self.shutdown();
        self.drain(timeout).await
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Tasks currently holding a worker slot
    pub fn busy_workers(&self) -> usize {
        self.max_workers
            .saturating_sub(self.permits.available_permits())
    }

    /// Tasks submitted and not yet finished, including those waiting for a slot
    pub fn pending_tasks(&self) -> usize {
        self.tracker.len()
    }
}
