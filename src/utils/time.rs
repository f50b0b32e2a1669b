/*!
 * Time conversions that never panic.
 *
 * Pacing values arrive as floating point seconds from configuration and
 * check settings. Converting those with `Duration::from_secs_f64`, or adding
 * a large TTL to an `Instant`, panics on overflow. These helpers saturate
 * instead.
 */

use std::time::{Duration, Instant};

/// Roughly thirty years; stands in for "never" when a deadline overflows
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Convert seconds to a `Duration`.
///
/// Negative and NaN values become zero. Values too large to represent
/// saturate to `Duration::MAX`.
pub fn duration_from_secs_f64(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// `now + ttl`, clamped to a far-future instant when the sum overflows
pub fn deadline_after(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_from_secs_f64_saturates() {
        assert_eq!(duration_from_secs_f64(1.5), Duration::from_millis(1500));
        assert_eq!(duration_from_secs_f64(-3.0), Duration::ZERO);
        assert_eq!(duration_from_secs_f64(f64::NAN), Duration::ZERO);
        assert_eq!(duration_from_secs_f64(1e20), Duration::MAX);
        assert_eq!(duration_from_secs_f64(f64::INFINITY), Duration::MAX);
    }

    #[test]
    fn test_deadline_after_never_overflows() {
        let now = Instant::now();
        assert_eq!(
            deadline_after(now, Duration::from_secs(5)),
            now + Duration::from_secs(5)
        );
        assert!(deadline_after(now, Duration::MAX) > now + Duration::from_secs(86_400));
    }
}
