//! Job error types

use thiserror::Error;

use crate::database::PoolError;

#[derive(Debug, Error)]
pub enum JobError {
    /// Failure reported by the monitored database. `kind` is matched against
    /// a job's expected error kinds.
    #[error("Database error ({kind}): {message}")]
    Database { kind: String, message: String },

    #[error("Connection pool error: {0}")]
    Pool(#[from] PoolError),

    /// `run_job` panicked. Always fatal to the job.
    #[error("Job panicked: {message}")]
    Panicked { message: String },

    #[error("Worker pool is shut down")]
    WorkerPoolClosed,

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl JobError {
    pub fn database(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Database {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Stable label for this error, used for expected-error matching and telemetry tags
    pub fn kind(&self) -> &str {
        match self {
            JobError::Database { kind, .. } => kind,
            JobError::Pool(e) => e.kind(),
            JobError::Panicked { .. } => "panic",
            JobError::WorkerPoolClosed => "worker_pool_closed",
            JobError::Unexpected(_) => "unexpected",
        }
    }

    /// Whether this error can be recovered from given a job's expected kinds.
    /// Panics are never recoverable.
    pub fn is_expected(&self, expected_kinds: &[String]) -> bool {
        match self {
            JobError::Database { .. } | JobError::Pool(_) => {
                expected_kinds.iter().any(|kind| kind == self.kind())
            }
            _ => false,
        }
    }
}

pub type JobResult<T> = Result<T, JobError>;
