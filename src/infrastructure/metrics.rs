//! Metrics collection for the worker loops
//!
//! Lock-free counters using atomic operations.
//! Updated by every worker, exported via the stats endpoint.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime};

/// Harness metrics collector
///
/// Thread-safe counters shared by all workers.
/// Snapshots taken for API export and shutdown logging.
pub struct HarnessMetrics {
    /// Strategy passes started (one request each)
    iterations: AtomicU64,
    /// Payloads delivered to the sink
    payloads: AtomicU64,
    /// Transport failures delivered to the sink
    failures: AtomicU64,
    /// Workers currently running
    active_workers: AtomicU64,
    /// Last payload timestamp (Unix millis)
    last_payload_time: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

/// Metrics snapshot for API export
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub iterations: u64,
    pub payloads: u64,
    pub failures: u64,
    pub active_workers: u64,
    pub payload_rate: f64, // payloads per second
    pub uptime_seconds: u64,
}

impl HarnessMetrics {
    pub fn new() -> Self {
        Self {
            iterations: AtomicU64::new(0),
            payloads: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            active_workers: AtomicU64::new(0),
            last_payload_time: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    #[inline]
    pub fn record_iteration(&self) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_payload(&self) {
        self.payloads.fetch_add(1, Ordering::Relaxed);
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        self.last_payload_time.store(now, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn worker_started(&self) {
        self.active_workers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn worker_stopped(&self) {
        // Saturating: a stop without a matching start must not wrap
        let _ = self
            .active_workers
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Get current snapshot of metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        let payloads = self.payloads.load(Ordering::Relaxed);

        let uptime = self.start_time.elapsed().as_secs();
        let rate = if uptime > 0 {
            payloads as f64 / uptime as f64
        } else {
            0.0
        };

        MetricsSnapshot {
            iterations: self.iterations.load(Ordering::Relaxed),
            payloads,
            failures: self.failures.load(Ordering::Relaxed),
            active_workers: self.active_workers.load(Ordering::Relaxed),
            payload_rate: rate,
            uptime_seconds: uptime,
        }
    }

    /// Milliseconds since the last payload, capped at 10000
    pub fn idle_ms(&self) -> u64 {
        let last = self.last_payload_time.load(Ordering::Relaxed);
        if last == 0 {
            return 10000; // No payloads yet
        }

        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        now.saturating_sub(last).min(10000)
    }
}

impl Default for HarnessMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = HarnessMetrics::new();
        let snapshot = metrics.snapshot();

        assert_eq!(snapshot.iterations, 0);
        assert_eq!(snapshot.payloads, 0);
        assert_eq!(snapshot.failures, 0);
        assert_eq!(snapshot.active_workers, 0);
    }

    #[test]
    fn test_record_outcomes() {
        let metrics = HarnessMetrics::new();

        metrics.record_iteration();
        metrics.record_payload();
        metrics.record_iteration();
        metrics.record_failure();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.iterations, 2);
        assert_eq!(snapshot.payloads, 1);
        assert_eq!(snapshot.failures, 1);
        assert!(metrics.idle_ms() < 10000);
    }

    #[test]
    fn test_worker_gauge_does_not_wrap() {
        let metrics = HarnessMetrics::new();

        metrics.worker_started();
        metrics.worker_stopped();
        metrics.worker_stopped();

        assert_eq!(metrics.snapshot().active_workers, 0);
    }

    #[test]
    fn test_idle_without_payloads() {
        let metrics = HarnessMetrics::new();
        assert_eq!(metrics.idle_ms(), 10000);
    }
}
