//! Scaling Advisor
//!
//! Converts windowed fleet metrics into a bounded, damped scaling
//! recommendation. The advisor changes the fleet by at most one
//! instance per cycle and never executes anything itself; an external
//! actuator decides whether to act.

use crate::application::BalancerService;
use crate::domain::entities::{FleetStats, ScalingAction, ScalingRecommendation};
use crate::domain::value_objects::ScalingBounds;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Decision thresholds. Bounds are configuration; nothing here is
/// environment-specific.
#[derive(Debug, Clone)]
pub struct ScalingPolicy {
    /// Scale up when fleet average latency exceeds this (ms)
    pub latency_scale_up_ms: f64,
    /// Scale up when the error rate exceeds this (percent)
    pub error_rate_scale_up_pct: f64,
    /// "High" recent request volume for the small-fleet rule
    pub busy_recent_requests: u64,
    /// Fleet sizes below this count as small for the volume rule
    pub small_fleet_limit: usize,
    /// Scale down only when latency is below this (ms)
    pub latency_scale_down_ms: f64,
    /// Scale down only when the error rate is below this (percent)
    pub error_rate_scale_down_pct: f64,
    /// Scale down only when recent volume is below this
    pub idle_recent_requests: u64,
}

impl Default for ScalingPolicy {
    fn default() -> Self {
        Self {
            latency_scale_up_ms: 1000.0,
            error_rate_scale_up_pct: 5.0,
            busy_recent_requests: 100,
            small_fleet_limit: 3,
            latency_scale_down_ms: 200.0,
            error_rate_scale_down_pct: 1.0,
            idle_recent_requests: 20,
        }
    }
}

/// Periodic advisor over fleet metrics.
///
/// Each evaluation is independent: nothing carries over between cycles
/// beyond the single-step damping inherent in the ±1 targets.
#[derive(Debug, Clone)]
pub struct ScalingAdvisor {
    policy: ScalingPolicy,
    bounds: ScalingBounds,
}

impl ScalingAdvisor {
    pub fn new(bounds: ScalingBounds) -> Self {
        Self::with_policy(ScalingPolicy::default(), bounds)
    }

    pub fn with_policy(policy: ScalingPolicy, bounds: ScalingBounds) -> Self {
        Self { policy, bounds }
    }

    pub fn bounds(&self) -> ScalingBounds {
        self.bounds
    }

    /// Produce a recommendation from a fleet snapshot.
    ///
    /// Rules are evaluated in priority order; the first match wins.
    /// Missing signal (no recorded traffic) degrades to no_action.
    pub fn evaluate(&self, stats: &FleetStats) -> ScalingRecommendation {
        let healthy = stats.healthy_instances;
        let policy = &self.policy;

        if stats.total_requests == 0 {
            return ScalingRecommendation {
                action: ScalingAction::NoAction,
                recommended_instances: healthy,
                reason: "no recorded traffic".to_string(),
            };
        }

        if stats.avg_response_time_ms > policy.latency_scale_up_ms
            || stats.error_rate_pct > policy.error_rate_scale_up_pct
        {
            let reason = if stats.avg_response_time_ms > policy.latency_scale_up_ms {
                format!(
                    "avg response time {:.0}ms exceeds {:.0}ms",
                    stats.avg_response_time_ms, policy.latency_scale_up_ms
                )
            } else {
                format!(
                    "error rate {:.1}% exceeds {:.1}%",
                    stats.error_rate_pct, policy.error_rate_scale_up_pct
                )
            };
            return ScalingRecommendation {
                action: ScalingAction::ScaleUp,
                recommended_instances: (healthy + 1).min(self.bounds.max),
                reason,
            };
        }

        if stats.recent_requests > policy.busy_recent_requests && healthy < policy.small_fleet_limit
        {
            return ScalingRecommendation {
                action: ScalingAction::ScaleUp,
                recommended_instances: (healthy + 1).min(self.bounds.max),
                reason: format!(
                    "{} recent requests on a fleet of {}",
                    stats.recent_requests, healthy
                ),
            };
        }

        if stats.avg_response_time_ms < policy.latency_scale_down_ms
            && stats.error_rate_pct < policy.error_rate_scale_down_pct
            && stats.recent_requests < policy.idle_recent_requests
            && healthy > self.bounds.min
        {
            return ScalingRecommendation {
                action: ScalingAction::ScaleDown,
                recommended_instances: (healthy - 1).max(self.bounds.min),
                reason: "fleet idle: low latency, error rate and volume".to_string(),
            };
        }

        ScalingRecommendation {
            action: ScalingAction::NoAction,
            recommended_instances: healthy,
            reason: "metrics within normal range".to_string(),
        }
    }

    /// Start the advisory loop. Recommendations are logged for the
    /// operator; the external actuator reads them from the stats
    /// surface on its own schedule.
    pub fn start(
        &self,
        service: Arc<BalancerService>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        let advisor = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown.recv() => {
                        tracing::info!("scaling advisor stopping");
                        break;
                    }
                }

                let stats = match service.fleet_stats() {
                    Ok(stats) => stats,
                    Err(e) => {
                        tracing::error!("scaling advisor skipping cycle: {}", e);
                        continue;
                    }
                };

                let recommendation = advisor.evaluate(&stats);
                match recommendation.action {
                    ScalingAction::NoAction => tracing::debug!(
                        "scaling advice: no_action at {} instances ({})",
                        recommendation.recommended_instances,
                        recommendation.reason
                    ),
                    action => tracing::info!(
                        "scaling advice: {} to {} instances ({})",
                        action.as_str(),
                        recommendation.recommended_instances,
                        recommendation.reason
                    ),
                }
            }
        })
    }
}
