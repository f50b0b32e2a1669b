//! # Error Types
//!
//! Crate-level error aggregating the per-module error enums.

use thiserror::Error;

use crate::config::ConfigurationError;
use crate::database::PoolError;
use crate::jobs::JobError;
use crate::resilience::LimiterError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Connection pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Condition limiter error: {0}")]
    Limiter(#[from] LimiterError),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
