//! app-balancer Library
//!
//! Application-tier load balancer and scaling advisor: instance
//! registry, background health checking, request-outcome metrics,
//! pluggable selection strategies, and bounded scaling recommendations.
//! This module exposes the components for integration tests and for
//! embedding in a host process.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use adapters::inbound::{AdminServer, AdminState};
pub use adapters::outbound::{DashMapInstanceRegistry, DashMapMetricsStore, HttpHealthProbe, TcpHealthProbe};
pub use application::{BalancerService, Dispatch};
pub use config::load_config;
pub use domain::entities::{
    FleetStats, HealthState, Instance, InstanceSnapshot, InstanceStats, ScalingAction,
    ScalingRecommendation,
};
pub use domain::errors::{BalancerError, ProbeError};
pub use domain::ports::{DynamicUpdate, HealthProbe, InstanceRegistry, MetricsStore, RegisterSpec};
pub use domain::services::Selector;
pub use domain::value_objects::{EnvironmentProfile, ScalingBounds, Strategy};
pub use infrastructure::{
    shutdown_signal, HealthCheckConfig, HealthChecker, ScalingAdvisor, ScalingPolicy,
    ShutdownController,
};
