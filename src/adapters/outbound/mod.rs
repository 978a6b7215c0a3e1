mod dashmap_metrics;
mod dashmap_registry;
mod probes;

pub use dashmap_metrics::DashMapMetricsStore;
pub use dashmap_registry::DashMapInstanceRegistry;
pub use probes::{HttpHealthProbe, TcpHealthProbe};
