#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, TTL in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # DBM Async Core
//!
//! The asynchronous collection core shared by database monitoring checks.
//!
//! ## Overview
//!
//! Checks run a short synchronous cycle. Expensive collections (query samples,
//! activity snapshots, per-database metadata) run as background jobs so they
//! never stall that cycle. This crate provides the pieces those jobs need:
//!
//! - A process-wide bounded worker pool and per-check job registry
//! - Recurring jobs with a minimum collection interval, a rate limit,
//!   cooperative cancellation and a deterministic single-shot test mode
//! - A keyed connection pool holding one connection per logical database,
//!   with idle expiry, health repair on acquire and LRU eviction at capacity
//! - A condition limiter that serializes an expensive predicate and bounds
//!   how many identifiers may satisfy it at once
//!
//! ## Module Organization
//!
//! - [`jobs`] - Worker pool, async jobs, job registry, telemetry and health events
//! - [`database`] - Keyed connection pool
//! - [`resilience`] - Rate limiter, TTL admission cache and condition limiter
//! - [`config`] - Configuration loading and validation
//! - [`logging`] - Structured logging setup
//! - [`constants`] - Metric names and defaults
//! - [`error`] - Crate-level error type
//! - [`utils`] - Saturating time conversions
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dbm_async_core::config::ConfigManager;
//! use dbm_async_core::jobs::{JobRegistry, TracingSink, WorkerPool};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigManager::load()?;
//! dbm_async_core::logging::init_logging(&config.config().logging);
//!
//! let pool = WorkerPool::from_config(&config.config().worker_pool)?;
//! let registry = JobRegistry::new("postgres", Arc::clone(&pool), Arc::new(TracingSink));
//!
//! // ... create and start jobs ...
//!
//! registry.shutdown(config.config().worker_pool.drain_timeout()).await;
//! pool.shutdown_and_drain(config.config().worker_pool.drain_timeout()).await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod resilience;
pub mod utils;

pub use config::{AsyncCoreConfig, ConfigManager, ConfigurationError};
pub use database::{
    ConnectionError, ConnectionFactory, ConnectionOptions, ConnectionPool, PoolError, PoolStats,
    PooledConnection,
};
pub use error::{CoreError, Result};
pub use jobs::{
    AsyncJob, JobContext, JobError, JobRegistry, JobRunner, JobSettings, MetricSink, WorkerPool,
};
pub use resilience::{
    Condition, ConditionLimiter, ConstantRateLimiter, FnCondition, LimiterError,
    RateLimitingTtlCache,
};
