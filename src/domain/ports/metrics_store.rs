//! Metrics Store Port
//!
//! Defines the interface for recording request outcomes and reading
//! fleet-wide counters. Latency moving averages live on the registry
//! records; this store keeps request counts and the rolling window.

/// Fleet-wide cumulative and windowed counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct FleetCounters {
    /// All-time recorded requests
    pub total_requests: u64,
    /// All-time recorded failures
    pub failed_requests: u64,
    /// Requests recorded inside the rolling window
    pub recent_requests: u64,
}

impl FleetCounters {
    /// Fraction of failed requests, 0.0 when nothing is recorded.
    pub fn error_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.failed_requests as f64 / self.total_requests as f64
        }
    }

    /// Fraction of successful requests, 1.0 when nothing is recorded.
    pub fn success_rate(&self) -> f64 {
        1.0 - self.error_rate()
    }
}

/// Store for request-outcome statistics.
///
/// All reads are point-in-time snapshots; no method blocks writers.
/// The rolling window is eventually consistent under contention - a
/// lost or double-counted sample only perturbs an advisory signal.
pub trait MetricsStore: Send + Sync {
    /// Record one request outcome for an instance.
    fn record(&self, instance_id: &str, success: bool);

    /// Total recorded requests for an instance (0 if never seen).
    fn instance_request_count(&self, instance_id: &str) -> u64;

    /// Fleet-wide counters at read time.
    fn fleet_counters(&self) -> FleetCounters;

    /// Drop per-instance counters for a removed instance.
    fn forget_instance(&self, instance_id: &str);
}
