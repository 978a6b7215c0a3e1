//! DashMap Metrics Store
//!
//! Fleet counters and per-instance request counts over DashMap and
//! atomics, plus a time-bucketed rolling window that answers "how busy
//! are we right now" without diluting the signal with all-time totals.

use crate::domain::ports::{FleetCounters, MetricsStore};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Width of one window bucket in seconds.
const BUCKET_SECS: u64 = 5;

/// Time-bucketed request counter covering a sliding span.
///
/// Each bucket carries the epoch (bucket index since Unix epoch) it was
/// last written for; stale buckets are lazily reset on the next write
/// and skipped on reads. Writers only touch atomics, so the window is
/// eventually consistent under contention - a sample lost to a reset
/// race merely perturbs an advisory signal.
struct RollingWindow {
    counts: Vec<AtomicU64>,
    epochs: Vec<AtomicU64>,
    span_secs: u64,
}

impl RollingWindow {
    fn new(span_secs: u64) -> Self {
        let buckets = (span_secs / BUCKET_SECS).max(1) as usize;
        Self {
            counts: (0..buckets).map(|_| AtomicU64::new(0)).collect(),
            epochs: (0..buckets).map(|_| AtomicU64::new(0)).collect(),
            span_secs,
        }
    }

    fn now_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }

    fn incr(&self) {
        let epoch = Self::now_secs() / BUCKET_SECS;
        let idx = (epoch % self.counts.len() as u64) as usize;

        let seen = self.epochs[idx].load(Ordering::Relaxed);
        if seen != epoch {
            // Bucket is from a previous lap; claim it and reset. Losing
            // this race only costs the racing sample.
            if self.epochs[idx]
                .compare_exchange(seen, epoch, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                self.counts[idx].store(0, Ordering::Relaxed);
            }
        }
        self.counts[idx].fetch_add(1, Ordering::Relaxed);
    }

    fn sum(&self) -> u64 {
        let now_epoch = Self::now_secs() / BUCKET_SECS;
        let live_epochs = self.span_secs / BUCKET_SECS;

        self.counts
            .iter()
            .zip(self.epochs.iter())
            .filter(|(_, epoch)| {
                let e = epoch.load(Ordering::Relaxed);
                e != 0 && now_epoch.saturating_sub(e) < live_epochs
            })
            .map(|(count, _)| count.load(Ordering::Relaxed))
            .sum()
    }
}

/// DashMap-backed metrics store.
pub struct DashMapMetricsStore {
    /// Per-instance all-time request counts
    instance_requests: DashMap<String, AtomicU64>,
    total_requests: AtomicU64,
    failed_requests: AtomicU64,
    window: RollingWindow,
}

impl DashMapMetricsStore {
    /// Default rolling-window span.
    pub const DEFAULT_WINDOW_SECS: u64 = 300;

    pub fn new() -> Self {
        Self::with_window(Self::DEFAULT_WINDOW_SECS)
    }

    pub fn with_window(span_secs: u64) -> Self {
        Self {
            instance_requests: DashMap::new(),
            total_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            window: RollingWindow::new(span_secs),
        }
    }
}

impl Default for DashMapMetricsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsStore for DashMapMetricsStore {
    fn record(&self, instance_id: &str, success: bool) {
        self.instance_requests
            .entry(instance_id.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);

        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
        self.window.incr();
    }

    fn instance_request_count(&self, instance_id: &str) -> u64 {
        self.instance_requests
            .get(instance_id)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn fleet_counters(&self) -> FleetCounters {
        FleetCounters {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            recent_requests: self.window.sum(),
        }
    }

    fn forget_instance(&self, instance_id: &str) {
        self.instance_requests.remove(instance_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_record_updates_counters() {
        let store = DashMapMetricsStore::new();

        store.record("i-1", true);
        store.record("i-1", true);
        store.record("i-2", false);

        let counters = store.fleet_counters();
        assert_eq!(counters.total_requests, 3);
        assert_eq!(counters.failed_requests, 1);
        assert_eq!(counters.recent_requests, 3);

        assert_eq!(store.instance_request_count("i-1"), 2);
        assert_eq!(store.instance_request_count("i-2"), 1);
        assert_eq!(store.instance_request_count("i-3"), 0);
    }

    #[test]
    fn test_rates() {
        let store = DashMapMetricsStore::new();
        for i in 0..50 {
            store.record("i-1", i % 10 != 0); // 5 failures out of 50
        }

        let counters = store.fleet_counters();
        assert_eq!(counters.total_requests, 50);
        assert_eq!(counters.failed_requests, 5);
        assert!((counters.error_rate() - 0.1).abs() < f64::EPSILON);
        assert!((counters.success_rate() - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_forget_instance() {
        let store = DashMapMetricsStore::new();
        store.record("i-1", true);
        store.forget_instance("i-1");

        assert_eq!(store.instance_request_count("i-1"), 0);
        // Fleet totals deliberately survive instance removal
        assert_eq!(store.fleet_counters().total_requests, 1);
    }

    #[test]
    fn test_window_counts_recent_only() {
        // A tiny window: one 5s bucket span means anything recorded in a
        // prior bucket epoch no longer counts as recent.
        let store = DashMapMetricsStore::with_window(BUCKET_SECS);
        store.record("i-1", true);
        assert!(store.fleet_counters().recent_requests >= 1);
        // All-time total is unaffected by the window span
        assert_eq!(store.fleet_counters().total_requests, 1);
    }

    #[test]
    fn test_window_bucket_count_never_zero() {
        // Spans shorter than a bucket still get one bucket
        let window = RollingWindow::new(1);
        assert_eq!(window.counts.len(), 1);
        window.incr();
        assert_eq!(window.sum(), 1);
    }

    #[test]
    fn test_concurrent_records() {
        use std::thread;

        let store = Arc::new(DashMapMetricsStore::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let store = store.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    store.record("i-1", true);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(store.fleet_counters().total_requests, 1000);
        assert_eq!(store.instance_request_count("i-1"), 1000);
    }
}
