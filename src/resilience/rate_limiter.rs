//! Constant-rate pacing for recurring work.

use std::time::{Duration, Instant};

use crate::utils::time::duration_from_secs_f64;

/// Spaces events at least `1 / rate` seconds apart.
///
/// A rate of zero or less disables pacing. Not synchronized; each job loop
/// owns its own limiter.
#[derive(Debug, Clone)]
pub struct ConstantRateLimiter {
    rate_limit: f64,
    period: Duration,
    last_event: Option<Instant>,
}

impl ConstantRateLimiter {
    pub fn new(rate_limit: f64) -> Self {
        let rate_limit = if rate_limit.is_finite() {
            rate_limit.max(0.0)
        } else {
            0.0
        };
        let period = if rate_limit > 0.0 {
            duration_from_secs_f64(1.0 / rate_limit)
        } else {
            Duration::ZERO
        };
        Self {
            rate_limit,
            period,
            last_event: None,
        }
    }

    /// Runs per second this limiter allows
    pub fn rate_limit(&self) -> f64 {
        self.rate_limit
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Whether a full period has elapsed since the last recorded event
    pub fn shall_execute(&self) -> bool {
        self.time_until_next().is_zero()
    }

    /// Remaining wait before the next event is allowed
    pub fn time_until_next(&self) -> Duration {
        match self.last_event {
            Some(last) => self.period.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        }
    }

    /// Record an event now
    pub fn update_last_time(&mut self) {
        self.last_event = Some(Instant::now());
    }

    /// Sleep until the next event is allowed, then record it
    pub async fn update_last_time_and_sleep(&mut self) {
        let wait = self.time_until_next();
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        self.update_last_time();
    }
}
