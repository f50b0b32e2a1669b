//! Job health events.
//!
//! A job whose loop is still busy when the check asks for the next
//! collection, and whose last run started more than one collection interval
//! ago, has missed a collection. The monitor reports that as a warning at
//! most once per cooldown window.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::resilience::RateLimitingTtlCache;

use super::telemetry::MetricSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthEventKind {
    MissedCollection,
}

impl fmt::Display for HealthEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthEventKind::MissedCollection => write!(f, "missed_collection"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Ok,
    Warning,
    Error,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HealthStatus::Ok => "ok",
            HealthStatus::Warning => "warning",
            HealthStatus::Error => "error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthEvent {
    pub name: HealthEventKind,
    pub status: HealthStatus,
    pub check_id: Uuid,
    pub check_name: String,
    pub dbms: String,
    pub config_host: String,
    pub tags: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

/// Identity fields copied into every event a monitor submits
#[derive(Debug, Clone)]
pub struct HealthSource<'a> {
    pub check_id: Uuid,
    pub check_name: &'a str,
    pub dbms: &'a str,
    pub config_host: &'a str,
    pub job_name: &'a str,
    pub tags: &'a [String],
}

/// Per-job health reporting with a cooldown between repeated events
#[derive(Debug)]
pub struct JobHealthMonitor {
    cooldown: RateLimitingTtlCache<HealthEventKind>,
}

impl JobHealthMonitor {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown: RateLimitingTtlCache::new(16, cooldown),
        }
    }

    /// Submit a missed-collection warning unless one was sent within the cooldown.
    ///
    /// Returns whether the event was submitted.
    pub fn report_missed_collection(
        &self,
        source: &HealthSource<'_>,
        elapsed: Duration,
        sink: &dyn MetricSink,
    ) -> bool {
        if !self.cooldown.acquire(HealthEventKind::MissedCollection) {
            return false;
        }

        let elapsed_ms = elapsed.as_micros() as f64 / 1000.0;
        warn!(
            job_name = %source.job_name,
            dbms = %source.dbms,
            elapsed_ms = elapsed_ms,
            "Job loop still running past its collection interval, collection missed"
        );

        let event = HealthEvent {
            name: HealthEventKind::MissedCollection,
            status: HealthStatus::Warning,
            check_id: source.check_id,
            check_name: source.check_name.to_string(),
            dbms: source.dbms.to_string(),
            config_host: source.config_host.to_string(),
            tags: source.tags.to_vec(),
            timestamp: Utc::now(),
            data: json!({
                "job_name": source.job_name,
                "elapsed_time": elapsed_ms,
            }),
        };
        sink.health_event(&event);
        true
    }
}
