//! # Job Telemetry
//!
//! Metric emission for background jobs. Checks supply a [`MetricSink`] that
//! forwards to their own reporting API; [`TracingSink`] is the default and
//! writes every submission as a structured log record.
//!
//! [`JobMetrics`] keeps per-job counters for status snapshots.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::health::HealthEvent;

/// Destination for job counters, timings and health events
pub trait MetricSink: Send + Sync {
    fn count(&self, name: &str, value: u64, tags: &[String]);

    fn histogram(&self, name: &str, value: f64, tags: &[String]);

    fn health_event(&self, event: &HealthEvent);
}

/// Writes metrics and health events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MetricSink for TracingSink {
    fn count(&self, name: &str, value: u64, tags: &[String]) {
        debug!(metric = %name, value = value, tags = ?tags, "📊 COUNT");
    }

    fn histogram(&self, name: &str, value: f64, tags: &[String]) {
        debug!(metric = %name, value = value, tags = ?tags, "📊 HISTOGRAM");
    }

    fn health_event(&self, event: &HealthEvent) {
        info!(
            name = %event.name,
            status = %event.status,
            check_name = %event.check_name,
            data = %event.data,
            "🩺 HEALTH_EVENT"
        );
    }
}

/// Lock-free counters for one job
#[derive(Debug, Default)]
pub struct JobMetrics {
    runs: AtomicU64,
    expected_errors: AtomicU64,
    fatal_errors: AtomicU64,
    skipped_runs: AtomicU64,
    cancellations: AtomicU64,
    inactive_stops: AtomicU64,
    missed_collections: AtomicU64,
    total_run_time_us: AtomicU64,
    last_run_time_us: AtomicU64,
}

/// Point-in-time copy of [`JobMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobMetricsSnapshot {
    pub runs: u64,
    pub expected_errors: u64,
    pub fatal_errors: u64,
    pub skipped_runs: u64,
    pub cancellations: u64,
    pub inactive_stops: u64,
    pub missed_collections: u64,
    pub avg_run_time_ms: f64,
    pub last_run_time_ms: f64,
}

impl JobMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed `run_job` call, successful or not
    pub fn record_run(&self, duration: Duration) {
        let micros = duration.as_micros().min(u64::MAX as u128) as u64;
        self.runs.fetch_add(1, Ordering::Relaxed);
        self.total_run_time_us.fetch_add(micros, Ordering::Relaxed);
        self.last_run_time_us.store(micros, Ordering::Relaxed);
    }

    pub fn record_expected_error(&self) {
        self.expected_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fatal_error(&self) {
        self.fatal_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped_runs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancellation(&self) {
        self.cancellations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inactive_stop(&self) {
        self.inactive_stops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_missed_collection(&self) {
        self.missed_collections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> JobMetricsSnapshot {
        let runs = self.runs.load(Ordering::Relaxed);
        let total_us = self.total_run_time_us.load(Ordering::Relaxed);
        let avg_run_time_ms = if runs > 0 {
            total_us as f64 / runs as f64 / 1000.0
        } else {
            0.0
        };

        JobMetricsSnapshot {
            runs,
            expected_errors: self.expected_errors.load(Ordering::Relaxed),
            fatal_errors: self.fatal_errors.load(Ordering::Relaxed),
            skipped_runs: self.skipped_runs.load(Ordering::Relaxed),
            cancellations: self.cancellations.load(Ordering::Relaxed),
            inactive_stops: self.inactive_stops.load(Ordering::Relaxed),
            missed_collections: self.missed_collections.load(Ordering::Relaxed),
            avg_run_time_ms,
            last_run_time_ms: self.last_run_time_us.load(Ordering::Relaxed) as f64 / 1000.0,
        }
    }
}
