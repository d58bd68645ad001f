//! Request counters and periodic progress reporting.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Default interval between progress log lines.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Response size above which a warning is logged.
pub const LARGE_RESPONSE_BYTES: usize = 10 * 1024 * 1024;

/// Counters shared by every request issued through one connection.
pub struct Telemetry {
    requests: AtomicU64,
    retries: AtomicU64,
    bytes: AtomicU64,
    interval: Duration,
    last_report: Mutex<Instant>,
    last_large_warning: Mutex<Option<Instant>>,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TelemetrySnapshot {
    pub requests: u64,
    pub retries: u64,
    pub bytes: u64,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new(DEFAULT_REPORT_INTERVAL)
    }
}

impl Telemetry {
    pub fn new(interval: Duration) -> Self {
        Self {
            requests: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            interval,
            last_report: Mutex::new(Instant::now()),
            last_large_warning: Mutex::new(None),
        }
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a received body and emit the progress line when due.
    pub fn record_response(&self, size: usize) {
        self.bytes.fetch_add(size as u64, Ordering::Relaxed);
        if size > LARGE_RESPONSE_BYTES && self.large_warning_due() {
            tracing::warn!(
                "response of {} bytes received; very large responses can stall processing",
                size
            );
        }
        self.maybe_report();
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }

    fn large_warning_due(&self) -> bool {
        let Ok(mut last) = self.last_large_warning.lock() else {
            return false;
        };
        let now = Instant::now();
        match *last {
            Some(at) if now.duration_since(at) < self.interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    fn maybe_report(&self) {
        let Ok(mut last) = self.last_report.lock() else {
            return;
        };
        let now = Instant::now();
        if now.duration_since(*last) < self.interval {
            return;
        }
        *last = now;
        let snap = self.snapshot();
        tracing::info!(
            "{} requests, {} retries, {:.2} MB downloaded",
            snap.requests,
            snap.retries,
            snap.bytes as f64 / (1024.0 * 1024.0)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let telemetry = Telemetry::default();
        telemetry.record_request();
        telemetry.record_request();
        telemetry.record_retry();
        telemetry.record_response(1000);
        telemetry.record_response(24);
        assert_eq!(
            telemetry.snapshot(),
            TelemetrySnapshot {
                requests: 2,
                retries: 1,
                bytes: 1024
            }
        );
    }

    #[test]
    fn test_large_warning_once_per_interval() {
        let telemetry = Telemetry::new(Duration::from_secs(60));
        assert!(telemetry.large_warning_due());
        assert!(!telemetry.large_warning_due());
    }

    #[test]
    fn test_large_warning_zero_interval() {
        let telemetry = Telemetry::new(Duration::ZERO);
        assert!(telemetry.large_warning_due());
        assert!(telemetry.large_warning_due());
    }
}
