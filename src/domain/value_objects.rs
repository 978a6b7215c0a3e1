//! Value Objects - Immutable domain primitives
//!
//! Value objects are identified by their value rather than identity.
//! They are immutable and can be freely shared.

use serde::{Deserialize, Serialize};

/// Selection strategy for routing requests to instances.
///
/// The strategy is fixed per deployment (configuration), not chosen
/// per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Fixed rotation through the healthy list, independent of load
    RoundRobin,
    /// Lowest in-flight connection count wins
    LeastConnections,
    /// Round robin with shares proportional to instance weight
    Weighted,
    /// Lowest smoothed response time wins
    LatencyAware,
}

impl Strategy {
    /// Parse a strategy name. Unknown names fall back to round robin,
    /// the default/fallback strategy.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "round_robin" | "roundrobin" => Self::RoundRobin,
            "least_connections" | "leastconnections" => Self::LeastConnections,
            "weighted" => Self::Weighted,
            "latency_aware" | "latencyaware" => Self::LatencyAware,
            _ => Self::RoundRobin,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoundRobin => "round_robin",
            Self::LeastConnections => "least_connections",
            Self::Weighted => "weighted",
            Self::LatencyAware => "latency_aware",
        }
    }
}

impl Default for Strategy {
    fn default() -> Self {
        Self::RoundRobin
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Deployment environment, used to derive default scaling bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentProfile {
    Development,
    Staging,
    Production,
}

impl EnvironmentProfile {
    /// Parse an environment name. Unknown names fall back to development.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "staging" => Self::Staging,
            "development" | "dev" => Self::Development,
            _ => Self::Development,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }

    /// Default instance-count bounds for this environment.
    pub fn bounds(&self) -> ScalingBounds {
        match self {
            Self::Development => ScalingBounds { min: 1, max: 5 },
            Self::Staging => ScalingBounds { min: 2, max: 10 },
            Self::Production => ScalingBounds { min: 3, max: 20 },
        }
    }
}

impl std::fmt::Display for EnvironmentProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Min/max instance counts the advisor may recommend.
///
/// Supplied as configuration; the decision logic never hard-codes these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalingBounds {
    pub min: usize,
    pub max: usize,
}

impl ScalingBounds {
    pub fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    /// Clamp a target instance count into [min, max].
    pub fn clamp(&self, target: usize) -> usize {
        target.clamp(self.min, self.max)
    }
}
