//! Active Health Checker
//!
//! Periodically probes every registered instance and drives the
//! per-instance health state machine in the registry. Probes run
//! out-of-band with bounded concurrency and an independent timeout per
//! instance, so a hanging instance never delays the others and never
//! touches the routing path.

use crate::domain::entities::HealthState;
use crate::domain::errors::ProbeError;
use crate::domain::ports::{DynamicUpdate, HealthProbe, InstanceRegistry, MetricsStore};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinSet;

/// Health check configuration.
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    /// Interval between sweeps over the registry
    pub interval: Duration,
    /// Timeout for each individual probe
    pub timeout: Duration,
    /// Consecutive failures before an instance turns unhealthy
    pub unhealthy_threshold: u32,
    /// Continuous unhealthy time before an instance is evicted
    pub evict_after: Duration,
    /// Upper bound on concurrently running probes
    pub max_concurrent_probes: usize,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(5),
            unhealthy_threshold: 3,
            evict_after: Duration::from_secs(300),
            max_concurrent_probes: 16,
        }
    }
}

/// Private probe bookkeeping per instance. Only health transitions are
/// pushed into the registry; the failure counter stays here.
#[derive(Debug, Default)]
struct ProbeStatus {
    consecutive_failures: u32,
    unhealthy_since: Option<Instant>,
}

/// Background health checker for the instance fleet.
pub struct HealthChecker {
    config: HealthCheckConfig,
    status: Arc<DashMap<String, ProbeStatus>>,
}

impl HealthChecker {
    pub fn new(config: HealthCheckConfig) -> Self {
        Self {
            config,
            status: Arc::new(DashMap::new()),
        }
    }

    /// Start the probe loop. Runs until shutdown is signalled or the
    /// registry becomes unavailable (fatal, logged loudly).
    pub fn start(
        &self,
        registry: Arc<dyn InstanceRegistry>,
        metrics: Arc<dyn MetricsStore>,
        probe: Arc<dyn HealthProbe>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        let config = self.config.clone();
        let status = self.status.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(config.interval);

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = shutdown.recv() => {
                        tracing::info!("health checker stopping");
                        break;
                    }
                }

                let instances = match registry.list(false) {
                    Ok(instances) => instances,
                    Err(e) => {
                        tracing::error!("health check loop halted, registry unavailable: {}", e);
                        break;
                    }
                };

                // Drop bookkeeping for instances that left the registry
                status.retain(|id, _| instances.iter().any(|s| &s.id == id));

                let semaphore = Arc::new(Semaphore::new(config.max_concurrent_probes));
                let mut probes = JoinSet::new();

                for snapshot in instances {
                    let semaphore = semaphore.clone();
                    let probe = probe.clone();
                    let timeout = config.timeout;

                    probes.spawn(async move {
                        let Ok(_permit) = semaphore.acquire_owned().await else {
                            return None;
                        };
                        let outcome =
                            match tokio::time::timeout(timeout, probe.probe(&snapshot.host, snapshot.port))
                                .await
                            {
                                Ok(result) => result,
                                Err(_) => Err(ProbeError::Timeout),
                            };
                        Some((snapshot, outcome))
                    });
                }

                while let Some(joined) = probes.join_next().await {
                    let Ok(Some((snapshot, outcome))) = joined else {
                        continue;
                    };
                    Self::apply_probe_result(
                        &status,
                        registry.as_ref(),
                        metrics.as_ref(),
                        &snapshot.id,
                        snapshot.health,
                        outcome,
                        &config,
                    );
                }
            }
        })
    }

    /// Advance one instance's state machine from a probe outcome.
    fn apply_probe_result(
        status: &DashMap<String, ProbeStatus>,
        registry: &dyn InstanceRegistry,
        metrics: &dyn MetricsStore,
        instance_id: &str,
        observed_health: HealthState,
        outcome: Result<(), ProbeError>,
        config: &HealthCheckConfig,
    ) {
        let mut entry = status.entry(instance_id.to_string()).or_default();

        match outcome {
            Ok(()) => {
                entry.consecutive_failures = 0;
                entry.unhealthy_since = None;

                let recovered = observed_health != HealthState::Healthy;
                registry.update_dynamic(
                    instance_id,
                    DynamicUpdate {
                        health: recovered.then_some(HealthState::Healthy),
                        probe_ok: true,
                        ..Default::default()
                    },
                );
                if recovered {
                    tracing::info!("instance {} is now healthy", instance_id);
                }
            }
            Err(e) => {
                entry.consecutive_failures += 1;

                match observed_health {
                    HealthState::Healthy | HealthState::Unknown => {
                        if entry.consecutive_failures >= config.unhealthy_threshold {
                            entry.unhealthy_since = Some(Instant::now());
                            registry.update_dynamic(
                                instance_id,
                                DynamicUpdate::health(HealthState::Unhealthy),
                            );
                            tracing::warn!("instance {} is now unhealthy: {}", instance_id, e);
                        }
                    }
                    HealthState::Unhealthy => {
                        let since = *entry.unhealthy_since.get_or_insert_with(Instant::now);
                        if since.elapsed() >= config.evict_after {
                            drop(entry);
                            registry.deregister(instance_id);
                            metrics.forget_instance(instance_id);
                            status.remove(instance_id);
                            tracing::warn!(
                                "evicted instance {} after {:?} of continuous failure",
                                instance_id,
                                config.evict_after
                            );
                        }
                    }
                }
            }
        }
    }
}
