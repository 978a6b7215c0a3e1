use crate::domain::value_objects::{EnvironmentProfile, ScalingBounds, Strategy};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    // Admin API
    pub listen_addr: String,

    // Routing
    pub strategy: String,

    // Deployment environment and scaling bounds
    pub environment: String,
    pub min_instances: Option<usize>,
    pub max_instances: Option<usize>,

    // Health checking
    pub probe_interval_secs: u64,
    pub probe_timeout_secs: u64,
    pub unhealthy_threshold: u32,
    pub evict_after_secs: u64,
    pub probe_concurrency: usize,
    /// HTTP probe path; TCP connect probe when unset
    pub probe_http_path: Option<String>,

    // Metrics
    pub ema_alpha: f64,
    pub window_secs: u64,

    // Scaling advisor
    pub advisory_interval_secs: u64,

    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8081".to_string(),
            strategy: "round_robin".to_string(),
            environment: "development".to_string(),
            min_instances: None,
            max_instances: None,
            probe_interval_secs: 10,
            probe_timeout_secs: 5,
            unhealthy_threshold: 3,
            evict_after_secs: 300,
            probe_concurrency: 16,
            probe_http_path: None,
            ema_alpha: 0.2,
            window_secs: 300,
            advisory_interval_secs: 180,
            debug: false,
        }
    }
}

impl Config {
    pub fn strategy(&self) -> Strategy {
        Strategy::from_str(&self.strategy)
    }

    pub fn environment(&self) -> EnvironmentProfile {
        EnvironmentProfile::from_str(&self.environment)
    }

    /// Scaling bounds: environment defaults, overridable per field.
    pub fn scaling_bounds(&self) -> ScalingBounds {
        let defaults = self.environment().bounds();
        let min = self.min_instances.unwrap_or(defaults.min);
        let max = self.max_instances.unwrap_or(defaults.max);
        ScalingBounds::new(min, max.max(min))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub fn load_config() -> anyhow::Result<Config> {
    let defaults = Config::default();

    let listen_addr = std::env::var("APPBALANCER_LISTEN_ADDR")
        .unwrap_or_else(|_| defaults.listen_addr.clone());

    let strategy =
        std::env::var("APPBALANCER_STRATEGY").unwrap_or_else(|_| defaults.strategy.clone());

    let environment =
        std::env::var("APPBALANCER_ENVIRONMENT").unwrap_or_else(|_| defaults.environment.clone());

    let min_instances = std::env::var("APPBALANCER_MIN_INSTANCES")
        .ok()
        .and_then(|v| v.parse().ok());

    let max_instances = std::env::var("APPBALANCER_MAX_INSTANCES")
        .ok()
        .and_then(|v| v.parse().ok());

    let probe_interval_secs =
        env_parse("APPBALANCER_PROBE_INTERVAL_SECS", defaults.probe_interval_secs);

    let probe_timeout_secs =
        env_parse("APPBALANCER_PROBE_TIMEOUT_SECS", defaults.probe_timeout_secs);

    let unhealthy_threshold =
        env_parse("APPBALANCER_UNHEALTHY_THRESHOLD", defaults.unhealthy_threshold);

    let evict_after_secs = env_parse("APPBALANCER_EVICT_AFTER_SECS", defaults.evict_after_secs);

    let probe_concurrency = env_parse("APPBALANCER_PROBE_CONCURRENCY", defaults.probe_concurrency);

    let probe_http_path = std::env::var("APPBALANCER_PROBE_HTTP_PATH").ok();

    let ema_alpha = env_parse("APPBALANCER_EMA_ALPHA", defaults.ema_alpha);

    let window_secs = env_parse("APPBALANCER_WINDOW_SECS", defaults.window_secs);

    let advisory_interval_secs = env_parse(
        "APPBALANCER_ADVISORY_INTERVAL_SECS",
        defaults.advisory_interval_secs,
    );

    let debug = std::env::var("DEBUG").is_ok();

    Ok(Config {
        listen_addr,
        strategy,
        environment,
        min_instances,
        max_instances,
        probe_interval_secs,
        probe_timeout_secs,
        unhealthy_threshold,
        evict_after_secs,
        probe_concurrency,
        probe_http_path,
        ema_alpha,
        window_secs,
        advisory_interval_secs,
        debug,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // load_config reads process-global env vars; serialize the tests
    // that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.listen_addr, "0.0.0.0:8081");
        assert_eq!(cfg.strategy, "round_robin");
        assert_eq!(cfg.environment, "development");
        assert_eq!(cfg.probe_interval_secs, 10);
        assert_eq!(cfg.probe_timeout_secs, 5);
        assert_eq!(cfg.unhealthy_threshold, 3);
        assert_eq!(cfg.evict_after_secs, 300);
        assert_eq!(cfg.window_secs, 300);
        assert!(!cfg.debug);
    }

    #[test]
    fn test_strategy_helper() {
        let mut cfg = Config::default();
        cfg.strategy = "latency_aware".to_string();
        assert_eq!(cfg.strategy(), Strategy::LatencyAware);
    }

    #[test]
    fn test_scaling_bounds_from_environment() {
        let mut cfg = Config::default();
        cfg.environment = "production".to_string();
        assert_eq!(cfg.scaling_bounds(), ScalingBounds::new(3, 20));
    }

    #[test]
    fn test_scaling_bounds_overrides() {
        let mut cfg = Config::default();
        cfg.environment = "staging".to_string();
        cfg.min_instances = Some(4);
        assert_eq!(cfg.scaling_bounds(), ScalingBounds::new(4, 10));

        cfg.max_instances = Some(6);
        assert_eq!(cfg.scaling_bounds(), ScalingBounds::new(4, 6));
    }

    #[test]
    fn test_scaling_bounds_max_never_below_min() {
        let mut cfg = Config::default();
        cfg.min_instances = Some(8);
        cfg.max_instances = Some(2);
        let bounds = cfg.scaling_bounds();
        assert!(bounds.max >= bounds.min);
    }

    #[test]
    fn test_load_config_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("APPBALANCER_LISTEN_ADDR");
        std::env::remove_var("APPBALANCER_STRATEGY");

        let cfg = load_config().unwrap();
        assert_eq!(cfg.listen_addr, "0.0.0.0:8081");
        assert_eq!(cfg.strategy, "round_robin");
    }

    #[test]
    fn test_load_config_with_custom_values() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("APPBALANCER_LISTEN_ADDR", "127.0.0.1:9000");
        std::env::set_var("APPBALANCER_STRATEGY", "weighted");
        std::env::set_var("APPBALANCER_MIN_INSTANCES", "2");
        std::env::set_var("APPBALANCER_PROBE_INTERVAL_SECS", "30");

        let cfg = load_config().unwrap();
        assert_eq!(cfg.listen_addr, "127.0.0.1:9000");
        assert_eq!(cfg.strategy(), Strategy::Weighted);
        assert_eq!(cfg.min_instances, Some(2));
        assert_eq!(cfg.probe_interval_secs, 30);

        std::env::remove_var("APPBALANCER_LISTEN_ADDR");
        std::env::remove_var("APPBALANCER_STRATEGY");
        std::env::remove_var("APPBALANCER_MIN_INSTANCES");
        std::env::remove_var("APPBALANCER_PROBE_INTERVAL_SECS");
    }

    #[test]
    fn test_load_config_parse_error_uses_default() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("APPBALANCER_EVICT_AFTER_SECS", "not_a_number");
        let cfg = load_config().unwrap();
        assert_eq!(cfg.evict_after_secs, 300);
        std::env::remove_var("APPBALANCER_EVICT_AFTER_SECS");
    }

    #[test]
    fn test_load_config_http_probe_path() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("APPBALANCER_PROBE_HTTP_PATH", "/health");
        let cfg = load_config().unwrap();
        assert_eq!(cfg.probe_http_path, Some("/health".to_string()));
        std::env::remove_var("APPBALANCER_PROBE_HTTP_PATH");
    }
}
