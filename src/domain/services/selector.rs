//! Instance Selector Service
//!
//! Pure selection logic over a healthy-instance snapshot. The only state
//! held here is rotation state (round-robin cursor, weighted-rotation
//! credits); everything else is read from the snapshots passed in, so
//! selection never performs I/O and never blocks on other instances.

use crate::domain::entities::InstanceSnapshot;
use crate::domain::value_objects::Strategy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Selects one instance from the healthy set according to a strategy.
///
/// Tie-breaking for least-connections and latency-aware is earliest
/// position in the healthy list (registration order), so behavior is
/// deterministic and reproducible in tests.
pub struct Selector {
    /// Round-robin rotation cursor
    rr_cursor: AtomicUsize,
    /// Smooth weighted round-robin credit per instance id
    wrr_credit: Mutex<HashMap<String, f64>>,
}

impl Selector {
    pub fn new() -> Self {
        Self {
            rr_cursor: AtomicUsize::new(0),
            wrr_credit: Mutex::new(HashMap::new()),
        }
    }

    /// Pick one instance from `healthy`, or None if the set is empty.
    ///
    /// `healthy` must already be filtered to `Healthy` instances and be
    /// in registration order.
    pub fn select(&self, strategy: Strategy, healthy: &[InstanceSnapshot]) -> Option<InstanceSnapshot> {
        if healthy.is_empty() {
            return None;
        }

        let chosen = match strategy {
            Strategy::RoundRobin => self.round_robin(healthy),
            Strategy::LeastConnections => Self::least_connections(healthy),
            Strategy::Weighted => self.weighted(healthy),
            Strategy::LatencyAware => Self::latency_aware(healthy),
        };

        Some(chosen.clone())
    }

    fn round_robin<'a>(&self, healthy: &'a [InstanceSnapshot]) -> &'a InstanceSnapshot {
        let idx = self.rr_cursor.fetch_add(1, Ordering::Relaxed) % healthy.len();
        &healthy[idx]
    }

    fn least_connections(healthy: &[InstanceSnapshot]) -> &InstanceSnapshot {
        let mut best = &healthy[0];
        for candidate in &healthy[1..] {
            // Strict comparison keeps the earliest instance on ties
            if candidate.connections < best.connections {
                best = candidate;
            }
        }
        best
    }

    fn latency_aware(healthy: &[InstanceSnapshot]) -> &InstanceSnapshot {
        let mut best = &healthy[0];
        for candidate in &healthy[1..] {
            if candidate.avg_latency_secs < best.avg_latency_secs {
                best = candidate;
            }
        }
        best
    }

    /// Smooth weighted round-robin.
    ///
    /// Each pass every instance earns credit equal to its weight; the
    /// instance with the most credit is chosen and pays back the total
    /// weight. Over time each instance's share of selections converges
    /// to its share of the total weight, without duplicating the list.
    fn weighted<'a>(&self, healthy: &'a [InstanceSnapshot]) -> &'a InstanceSnapshot {
        let mut credit = self.wrr_credit.lock();

        // Drop credit for instances no longer in the healthy set
        credit.retain(|id, _| healthy.iter().any(|s| &s.id == id));

        let mut total = 0.0;
        let mut best: Option<(&InstanceSnapshot, f64)> = None;

        for snapshot in healthy {
            let weight = if snapshot.weight > 0.0 {
                snapshot.weight
            } else {
                1.0
            };
            total += weight;

            let entry = credit.entry(snapshot.id.clone()).or_insert(0.0);
            *entry += weight;
            let current = *entry;

            match best {
                // Strict comparison keeps the earliest instance on ties
                Some((_, best_credit)) if current > best_credit => {
                    best = Some((snapshot, current));
                }
                None => {
                    best = Some((snapshot, current));
                }
                _ => {}
            }
        }

        // healthy is non-empty, so best is always set
        let (winner, _) = best.unwrap_or((&healthy[0], 0.0));
        if let Some(entry) = credit.get_mut(&winner.id) {
            *entry -= total;
        }
        winner
    }
}

impl Default for Selector {
    fn default() -> Self {
        Self::new()
    }
}
