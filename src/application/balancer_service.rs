//! Balancer Service
//!
//! Application-layer facade over the registry, metrics store, and
//! selector: routing decisions, the dispatch side-effect pairing, and
//! the derived fleet views consumed by the admin surface.

use crate::domain::entities::{FleetStats, InstanceSnapshot, InstanceStats};
use crate::domain::errors::BalancerError;
use crate::domain::ports::{DynamicUpdate, InstanceRegistry, MetricsStore, RegisterSpec};
use crate::domain::services::Selector;
use crate::domain::value_objects::Strategy;
use std::sync::Arc;
use std::time::Instant;

/// Routing and administration facade.
///
/// Selection is non-blocking and performs no network I/O: health state
/// is read from cached registry state, never probed inline.
pub struct BalancerService {
    registry: Arc<dyn InstanceRegistry>,
    metrics: Arc<dyn MetricsStore>,
    selector: Selector,
    strategy: Strategy,
}

impl BalancerService {
    pub fn new(
        registry: Arc<dyn InstanceRegistry>,
        metrics: Arc<dyn MetricsStore>,
        strategy: Strategy,
    ) -> Self {
        Self {
            registry,
            metrics,
            selector: Selector::new(),
            strategy,
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Register a new instance.
    pub fn register(&self, spec: RegisterSpec) -> Result<String, BalancerError> {
        self.registry.register(spec)
    }

    /// Remove an instance and drop its request counters. Idempotent.
    pub fn deregister(&self, id: &str) {
        self.registry.deregister(id);
        self.metrics.forget_instance(id);
    }

    /// Pick one healthy instance under the configured strategy.
    ///
    /// The caller owns the dispatch pairing: increment the in-flight
    /// count before dispatch, decrement and record the outcome after
    /// completion (or use [`BalancerService::begin_dispatch`], which
    /// wraps the pairing in a guard).
    pub fn select(&self) -> Result<InstanceSnapshot, BalancerError> {
        let healthy = self.registry.list(true)?;
        self.selector
            .select(self.strategy, &healthy)
            .ok_or(BalancerError::NoHealthyInstances)
    }

    /// Select an instance and open a dispatch against it.
    ///
    /// The in-flight count is incremented here; the returned guard
    /// decrements it on [`Dispatch::complete`] or on drop, so the count
    /// can never leak upward.
    pub fn begin_dispatch(&self) -> Result<Dispatch, BalancerError> {
        let target = self.select()?;
        self.registry
            .update_dynamic(&target.id, DynamicUpdate::connections(1));
        Ok(Dispatch {
            registry: self.registry.clone(),
            metrics: self.metrics.clone(),
            target,
            started: Instant::now(),
            completed: false,
        })
    }

    /// Record a request outcome reported by the dispatch layer.
    ///
    /// Outcomes for instances that have since been removed are
    /// discarded silently.
    pub fn report_outcome(&self, instance_id: &str, success: bool, latency_secs: f64) {
        let known = self
            .registry
            .update_dynamic(instance_id, DynamicUpdate::latency(latency_secs));
        if known {
            self.metrics.record(instance_id, success);
        }
    }

    /// Report CPU/memory utilization for an instance. Unknown ids are
    /// discarded.
    pub fn report_utilization(&self, instance_id: &str, cpu: Option<f64>, mem: Option<f64>) {
        self.registry.update_dynamic(
            instance_id,
            DynamicUpdate {
                cpu,
                mem,
                ..Default::default()
            },
        );
    }

    /// Per-instance detail, insertion-ordered.
    pub fn instance_details(&self) -> Result<Vec<InstanceSnapshot>, BalancerError> {
        self.registry.list(false)
    }

    /// Detail for a single instance.
    pub fn instance(&self, id: &str) -> Result<InstanceSnapshot, BalancerError> {
        self.registry
            .get(id)
            .ok_or_else(|| BalancerError::InstanceNotFound(id.to_string()))
    }

    /// Request statistics for a single instance.
    pub fn instance_stats(&self, id: &str) -> Result<InstanceStats, BalancerError> {
        let snapshot = self.instance(id)?;
        Ok(InstanceStats {
            avg_latency_secs: snapshot.avg_latency_secs,
            request_count: self.metrics.instance_request_count(id),
        })
    }

    /// Aggregate fleet view, derived on demand.
    pub fn fleet_stats(&self) -> Result<FleetStats, BalancerError> {
        let all = self.registry.list(false)?;
        let healthy = all.iter().filter(|s| s.is_healthy()).count();
        let counters = self.metrics.fleet_counters();

        // Fleet-average latency over instances that have reported at
        // least one sample.
        let sampled: Vec<f64> = all
            .iter()
            .map(|s| s.avg_latency_secs)
            .filter(|l| *l > 0.0)
            .collect();
        let avg_secs = if sampled.is_empty() {
            0.0
        } else {
            sampled.iter().sum::<f64>() / sampled.len() as f64
        };

        Ok(FleetStats {
            strategy: self.strategy.as_str().to_string(),
            total_instances: all.len(),
            healthy_instances: healthy,
            unhealthy_instances: all.len() - healthy,
            total_requests: counters.total_requests,
            success_rate_pct: counters.success_rate() * 100.0,
            avg_response_time_ms: avg_secs * 1000.0,
            recent_requests: counters.recent_requests,
            error_rate_pct: counters.error_rate() * 100.0,
        })
    }
}

/// In-flight dispatch against a selected instance.
///
/// RAII: dropping an uncompleted dispatch decrements the in-flight
/// count without recording an outcome, so crashes in the dispatch
/// layer cannot leak connection counts.
pub struct Dispatch {
    registry: Arc<dyn InstanceRegistry>,
    metrics: Arc<dyn MetricsStore>,
    target: InstanceSnapshot,
    started: Instant,
    completed: bool,
}

impl Dispatch {
    /// The instance this dispatch was routed to.
    pub fn target(&self) -> &InstanceSnapshot {
        &self.target
    }

    /// Report the outcome, with latency measured since selection.
    ///
    /// If the instance was deregistered mid-flight the outcome is
    /// discarded; the downstream failure is the transport's concern.
    pub fn complete(mut self, success: bool) {
        self.completed = true;
        let latency = self.started.elapsed().as_secs_f64();
        let known = self.registry.update_dynamic(
            &self.target.id,
            DynamicUpdate {
                connections_delta: Some(-1),
                latency_sample: Some(latency),
                ..Default::default()
            },
        );
        if known {
            self.metrics.record(&self.target.id, success);
        }
    }
}

impl Drop for Dispatch {
    fn drop(&mut self) {
        if !self.completed {
            self.registry
                .update_dynamic(&self.target.id, DynamicUpdate::connections(-1));
        }
    }
}
