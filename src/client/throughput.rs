//! Minimum-throughput enforcement for in-flight exchanges

use super::meta_request::MetaRequestError;
use std::time::{Duration, Instant};

/// Tracks bytes over fixed windows and fails when a completed window falls
/// below the configured rate. A minimum of 0 disables the check.
#[derive(Debug, Clone)]
pub struct ThroughputMonitor {
    minimum: u64,
    window: Duration,
    window_start: Instant,
    window_bytes: u64,
}

impl ThroughputMonitor {
    pub fn new(minimum_bytes_per_second: u64, window: Duration) -> Self {
        Self::starting_at(minimum_bytes_per_second, window, Instant::now())
    }

    pub fn starting_at(minimum_bytes_per_second: u64, window: Duration, start: Instant) -> Self {
        Self {
            minimum: minimum_bytes_per_second,
            window: window.max(Duration::from_millis(1)),
            window_start: start,
            window_bytes: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.minimum > 0
    }

    /// Longest a read may wait before the current window must be evaluated
    pub fn stall_timeout(&self) -> Option<Duration> {
        self.is_enabled().then_some(self.window)
    }

    /// Account for `bytes` observed at `now`; evaluates the window once it has elapsed
    pub fn record(&mut self, bytes: u64, now: Instant) -> Result<(), MetaRequestError> {
        self.window_bytes += bytes;

        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.window {
            return Ok(());
        }

        let observed = (self.window_bytes as f64 / elapsed.as_secs_f64()) as u64;
        self.window_start = now;
        self.window_bytes = 0;

        if self.is_enabled() && observed < self.minimum {
            return Err(MetaRequestError::ThroughputTooLow {
                observed,
                minimum: self.minimum,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_never_fails() {
        let start = Instant::now();
        let mut monitor = ThroughputMonitor::starting_at(0, Duration::from_secs(1), start);
        assert!(monitor.stall_timeout().is_none());
        assert!(monitor.record(0, start + Duration::from_secs(10)).is_ok());
    }

    #[test]
    fn test_fast_window_passes() {
        let start = Instant::now();
        let mut monitor = ThroughputMonitor::starting_at(1000, Duration::from_secs(1), start);
        assert!(monitor.record(600, start + Duration::from_millis(500)).is_ok());
        assert!(monitor.record(600, start + Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_slow_window_fails() {
        let start = Instant::now();
        let mut monitor = ThroughputMonitor::starting_at(1000, Duration::from_secs(1), start);
        assert!(monitor.record(100, start + Duration::from_millis(200)).is_ok());

        let err = monitor.record(100, start + Duration::from_secs(2)).unwrap_err();
        match err {
            MetaRequestError::ThroughputTooLow { observed, minimum } => {
                assert_eq!(observed, 100);
                assert_eq!(minimum, 1000);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_stall_is_detected() {
        let start = Instant::now();
        let mut monitor = ThroughputMonitor::starting_at(10, Duration::from_secs(1), start);
        assert_eq!(monitor.stall_timeout(), Some(Duration::from_secs(1)));
        assert!(monitor.record(0, start + Duration::from_secs(1)).is_err());
    }
}
