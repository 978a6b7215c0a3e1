//! Domain Entities - Core business objects
//!
//! These entities represent the core concepts of the balancer domain.
//! They have no external dependencies and contain only business logic.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The balancer's current belief about an instance's liveness.
///
/// `Removed` is not represented here: an evicted instance is simply
/// absent from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    /// Registered but not yet probed
    Unknown,
    /// Last probe succeeded; eligible for selection
    Healthy,
    /// Consecutive probe failures reached the threshold
    Unhealthy,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
        }
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Static attributes of a backend instance, supplied at registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    /// Unique identifier assigned by the registry
    pub id: String,
    /// Hostname or IP address
    pub host: String,
    /// Port number for the instance service
    pub port: u16,
    /// Relative capacity for weighted balancing (default 1.0)
    pub weight: f64,
    /// Region label (free-form, empty if unspecified)
    pub region: String,
    /// Provenance tags (e.g. which container produced this instance)
    pub tags: HashMap<String, String>,
}

impl Instance {
    /// The dialable address of this instance.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Point-in-time view of an instance: static attributes plus a copy of
/// the registry's dynamic state at read time.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceSnapshot {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub weight: f64,
    pub region: String,
    pub tags: HashMap<String, String>,
    /// Current health belief
    pub health: HealthState,
    /// In-flight connection count at read time
    pub connections: u32,
    /// Smoothed response-time estimate in seconds (0.0 until first sample)
    pub avg_latency_secs: f64,
    /// Last reported CPU utilization fraction, if any
    pub cpu: Option<f64>,
    /// Last reported memory utilization fraction, if any
    pub mem: Option<f64>,
    /// Unix millis of the last successful health probe, if any
    pub last_probe_ok_ms: Option<u64>,
}

impl InstanceSnapshot {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_healthy(&self) -> bool {
        self.health == HealthState::Healthy
    }
}

/// Per-instance request statistics.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceStats {
    /// Smoothed response time in seconds
    pub avg_latency_secs: f64,
    /// Total recorded requests for this instance
    pub request_count: u64,
}

/// Aggregate fleet view, derived on demand from registry + metrics state.
/// Never persisted as a separate source of truth.
#[derive(Debug, Clone, Serialize)]
pub struct FleetStats {
    /// Name of the configured selection strategy
    pub strategy: String,
    pub total_instances: usize,
    pub healthy_instances: usize,
    pub unhealthy_instances: usize,
    /// Cumulative request count since start
    pub total_requests: u64,
    /// 100 * (1 - failures/total); 100.0 when no requests recorded
    pub success_rate_pct: f64,
    /// Fleet-average smoothed response time, milliseconds
    pub avg_response_time_ms: f64,
    /// Requests observed inside the rolling window
    pub recent_requests: u64,
    /// 100 * failures/total; 0.0 when no requests recorded
    pub error_rate_pct: f64,
}

/// Suggested scaling action. The balancer never executes these itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingAction {
    ScaleUp,
    ScaleDown,
    NoAction,
}

impl ScalingAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScaleUp => "scale_up",
            Self::ScaleDown => "scale_down",
            Self::NoAction => "no_action",
        }
    }
}

/// One advisory cycle's output, produced fresh each evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct ScalingRecommendation {
    pub action: ScalingAction,
    /// Target fleet size, bounded by the configured min/max
    pub recommended_instances: usize,
    /// Primary triggering reason, for observability
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_state_as_str() {
        assert_eq!(HealthState::Unknown.as_str(), "unknown");
        assert_eq!(HealthState::Healthy.as_str(), "healthy");
        assert_eq!(HealthState::Unhealthy.as_str(), "unhealthy");
    }

    #[test]
    fn test_health_state_serde_snake_case() {
        let json = serde_json::to_string(&HealthState::Unhealthy).unwrap();
        assert_eq!(json, "\"unhealthy\"");
    }

    #[test]
    fn test_instance_addr() {
        let instance = Instance {
            id: "i-1".to_string(),
            host: "10.0.0.5".to_string(),
            port: 8080,
            weight: 1.0,
            region: "us-east".to_string(),
            tags: HashMap::new(),
        };
        assert_eq!(instance.addr(), "10.0.0.5:8080");
    }

    #[test]
    fn test_scaling_action_serde() {
        let json = serde_json::to_string(&ScalingAction::ScaleUp).unwrap();
        assert_eq!(json, "\"scale_up\"");
        let parsed: ScalingAction = serde_json::from_str("\"no_action\"").unwrap();
        assert_eq!(parsed, ScalingAction::NoAction);
    }

    #[test]
    fn test_snapshot_is_healthy() {
        let snap = InstanceSnapshot {
            id: "i-1".to_string(),
            host: "h".to_string(),
            port: 80,
            weight: 1.0,
            region: String::new(),
            tags: HashMap::new(),
            health: HealthState::Healthy,
            connections: 0,
            avg_latency_secs: 0.0,
            cpu: None,
            mem: None,
            last_probe_ok_ms: None,
        };
        assert!(snap.is_healthy());
        assert_eq!(snap.addr(), "h:80");
    }
}
