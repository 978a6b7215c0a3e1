mod health_probe;
mod instance_registry;
mod metrics_store;

pub use health_probe::HealthProbe;
pub use instance_registry::{DynamicUpdate, InstanceRegistry, RegisterSpec};
pub use metrics_store::{FleetCounters, MetricsStore};
