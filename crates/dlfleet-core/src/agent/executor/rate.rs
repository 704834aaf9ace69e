//! Progress cadence and average-rate helpers.

use std::time::{Duration, Instant};

/// Gate that opens at most once per `interval`, so progress volume does not
/// depend on chunk size or link speed.
#[derive(Debug, Clone)]
pub(crate) struct ProgressThrottle {
    interval: Duration,
    last: Instant,
}

impl ProgressThrottle {
    pub(crate) fn new(interval: Duration, now: Instant) -> Self {
        Self { interval, last: now }
    }

    /// Restart the window (e.g. when the response body begins).
    pub(crate) fn reset(&mut self, now: Instant) {
        self.last = now;
    }

    /// True when at least `interval` has passed since the last report; the
    /// window restarts at `now`.
    pub(crate) fn ready(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last) >= self.interval {
            self.last = now;
            true
        } else {
            false
        }
    }
}

/// Running average: cumulative bytes over cumulative elapsed time (0 if no
/// time has passed).
pub(crate) fn average_rate(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    bytes as f64 / secs
}
