//! # Configuration
//!
//! Settings for the shared worker pool, default job pacing, the keyed
//! connection pool, and logging. Every section has working defaults so an
//! empty source yields a usable configuration.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use dbm_async_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let max_workers = manager.config().worker_pool.max_workers;
//! let interval = manager.config().jobs.min_collection_interval();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::defaults;
use crate::utils::time::duration_from_secs_f64;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AsyncCoreConfig {
    /// Process-wide worker pool shared by all background jobs
    pub worker_pool: WorkerPoolConfig,

    /// Defaults applied to jobs that do not override them
    pub jobs: JobDefaultsConfig,

    /// Keyed connection pool settings
    pub connection_pool: ConnectionPoolConfig,

    pub logging: LoggingConfig,
}

impl AsyncCoreConfig {
    /// Validate every section
    pub fn validate(&self) -> ConfigResult<()> {
        self.worker_pool.validate()?;
        self.jobs.validate()?;
        self.connection_pool.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct WorkerPoolConfig {
    /// Upper bound on concurrently running job loops across the process
    pub max_workers: usize,
    pub drain_timeout_ms: u64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_workers: defaults::MAX_WORKERS,
            drain_timeout_ms: defaults::DRAIN_TIMEOUT.as_millis() as u64,
        }
    }
}

impl WorkerPoolConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_workers == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker_pool.max_workers",
                self.max_workers,
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct JobDefaultsConfig {
    pub min_collection_interval_secs: f64,
    /// Maximum runs per second; zero or negative disables the limit
    pub rate_limit: f64,
    /// Run job loops inline on the caller instead of the worker pool
    pub run_sync: bool,
    /// Defaults to twice the collection interval when absent
    pub inactivity_timeout_secs: Option<f64>,
    pub health_event_cooldown_secs: u64,
    /// Error kinds treated as recoverable by every job
    pub expected_db_errors: Vec<String>,
}

impl Default for JobDefaultsConfig {
    fn default() -> Self {
        Self {
            min_collection_interval_secs: defaults::MIN_COLLECTION_INTERVAL.as_secs_f64(),
            rate_limit: defaults::RATE_LIMIT,
            run_sync: false,
            inactivity_timeout_secs: None,
            health_event_cooldown_secs: defaults::HEALTH_EVENT_COOLDOWN.as_secs(),
            expected_db_errors: Vec::new(),
        }
    }
}

impl JobDefaultsConfig {
    pub fn min_collection_interval(&self) -> Duration {
        duration_from_secs_f64(self.min_collection_interval_secs)
    }

    pub fn inactivity_timeout(&self) -> Option<Duration> {
        self.inactivity_timeout_secs.map(duration_from_secs_f64)
    }

    pub fn health_event_cooldown(&self) -> Duration {
        Duration::from_secs(self.health_event_cooldown_secs)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !self.min_collection_interval_secs.is_finite() || self.min_collection_interval_secs < 0.0
        {
            return Err(ConfigurationError::invalid_value(
                "jobs.min_collection_interval_secs",
                self.min_collection_interval_secs,
                "must be a non-negative number of seconds",
            ));
        }
        if !self.rate_limit.is_finite() {
            return Err(ConfigurationError::invalid_value(
                "jobs.rate_limit",
                self.rate_limit,
                "must be a finite number of runs per second",
            ));
        }
        if let Some(secs) = self.inactivity_timeout_secs {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(ConfigurationError::invalid_value(
                    "jobs.inactivity_timeout_secs",
                    secs,
                    "must be a positive number of seconds",
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ConnectionPoolConfig {
    /// Idle lifetime granted to a connection on each acquisition
    pub default_ttl_ms: u64,
    /// Hard cap on distinct pooled connections; unbounded when absent
    pub max_connections: Option<usize>,
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: defaults::CONNECTION_TTL.as_millis() as u64,
            max_connections: None,
        }
    }
}

impl ConnectionPoolConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_connections == Some(0) {
            return Err(ConfigurationError::invalid_value(
                "connection_pool.max_connections",
                0,
                "must be at least 1 when set",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.level.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "logging.level",
                &self.level,
                "must not be empty",
            ));
        }
        Ok(())
    }
}
