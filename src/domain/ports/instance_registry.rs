//! Instance Registry Port
//!
//! Defines the interface for the authoritative set of backend instances.
//! The registry owns instance lifetime exclusively; every other component
//! may only update dynamic fields through `update_dynamic`.

use crate::domain::entities::{HealthState, InstanceSnapshot};
use crate::domain::errors::BalancerError;
use std::collections::HashMap;

/// Attributes supplied when registering a new instance.
#[derive(Debug, Clone)]
pub struct RegisterSpec {
    pub host: String,
    pub port: u16,
    pub weight: f64,
    pub region: String,
    pub tags: HashMap<String, String>,
}

impl RegisterSpec {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            weight: 1.0,
            region: String::new(),
            tags: HashMap::new(),
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// Partial update to an instance's dynamic state. `None` fields are left
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct DynamicUpdate {
    /// New health state
    pub health: Option<HealthState>,
    /// Signed change to the in-flight connection count (saturates at 0)
    pub connections_delta: Option<i32>,
    /// Observed latency in seconds, folded into the moving average
    pub latency_sample: Option<f64>,
    /// Reported CPU utilization fraction (0.0-1.0)
    pub cpu: Option<f64>,
    /// Reported memory utilization fraction (0.0-1.0)
    pub mem: Option<f64>,
    /// Stamp the last-successful-probe timestamp with "now"
    pub probe_ok: bool,
}

impl DynamicUpdate {
    pub fn health(state: HealthState) -> Self {
        Self {
            health: Some(state),
            ..Default::default()
        }
    }

    pub fn connections(delta: i32) -> Self {
        Self {
            connections_delta: Some(delta),
            ..Default::default()
        }
    }

    pub fn latency(sample_secs: f64) -> Self {
        Self {
            latency_sample: Some(sample_secs),
            ..Default::default()
        }
    }
}

/// Authoritative store of known backend instances.
///
/// Implementations must be safe under concurrent invocation, with
/// per-instance granularity: an update to instance A never blocks a
/// read of instance B. `RegistryUnavailable` is reserved for remote
/// backings; the in-memory implementation is infallible.
pub trait InstanceRegistry: Send + Sync {
    /// Create an instance in `Unknown` health and return its id.
    /// Fails with `DuplicateInstance` if the host:port pair is active.
    fn register(&self, spec: RegisterSpec) -> Result<String, BalancerError>;

    /// Remove an instance. Idempotent; an unknown id is a no-op.
    fn deregister(&self, id: &str);

    /// Point-in-time snapshot of one instance.
    fn get(&self, id: &str) -> Option<InstanceSnapshot>;

    /// Snapshot of all instances in insertion order, optionally limited
    /// to the healthy set.
    fn list(&self, healthy_only: bool) -> Result<Vec<InstanceSnapshot>, BalancerError>;

    /// Apply a partial update to an instance's dynamic state.
    /// Returns false (and discards the update) for an unknown id.
    fn update_dynamic(&self, id: &str, update: DynamicUpdate) -> bool;
}
