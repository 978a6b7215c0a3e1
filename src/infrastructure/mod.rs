//! Infrastructure Layer
//!
//! Background loops and cross-cutting concerns.

pub mod health_checker;
pub mod scaling_advisor;
pub mod shutdown;

pub use health_checker::{HealthCheckConfig, HealthChecker};
pub use scaling_advisor::{ScalingAdvisor, ScalingPolicy};
pub use shutdown::{shutdown_signal, ShutdownController};
