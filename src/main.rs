//! app-balancer - Application-tier load balancer and scaling advisor
//!
//! This is the composition root that wires together all the components.

mod adapters;
mod application;
mod config;
mod domain;
mod infrastructure;

use crate::adapters::inbound::AdminServer;
use crate::adapters::outbound::{
    DashMapInstanceRegistry, DashMapMetricsStore, HttpHealthProbe, TcpHealthProbe,
};
use crate::application::BalancerService;
use crate::config::load_config;
use crate::domain::ports::HealthProbe;
use crate::infrastructure::{
    shutdown_signal, HealthCheckConfig, HealthChecker, ScalingAdvisor, ShutdownController,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment
    let cfg = load_config()?;

    // Setup logging
    let log_level = if cfg.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    tracing::info!(
        "starting app-balancer env={} strategy={} listen={}",
        cfg.environment(),
        cfg.strategy(),
        cfg.listen_addr
    );

    // ===== COMPOSITION ROOT =====
    // Wire up all adapters and services

    // 1. Outbound adapters

    let registry = Arc::new(DashMapInstanceRegistry::with_alpha(cfg.ema_alpha));
    let metrics = Arc::new(DashMapMetricsStore::with_window(cfg.window_secs));

    let probe_timeout = Duration::from_secs(cfg.probe_timeout_secs);
    let probe: Arc<dyn HealthProbe> = match &cfg.probe_http_path {
        Some(path) => {
            let probe = HttpHealthProbe::new(probe_timeout, path.clone())
                .map_err(|e| anyhow::anyhow!("failed to build HTTP probe: {}", e))?;
            tracing::info!("health probe: HTTP GET {}", path);
            Arc::new(probe)
        }
        None => {
            tracing::info!("health probe: TCP connect");
            Arc::new(TcpHealthProbe::new(probe_timeout))
        }
    };

    // 2. Application service

    let service = Arc::new(BalancerService::new(
        registry.clone(),
        metrics.clone(),
        cfg.strategy(),
    ));

    // 3. Background loops

    let shutdown = ShutdownController::new();

    let checker = HealthChecker::new(HealthCheckConfig {
        interval: Duration::from_secs(cfg.probe_interval_secs),
        timeout: probe_timeout,
        unhealthy_threshold: cfg.unhealthy_threshold,
        evict_after: Duration::from_secs(cfg.evict_after_secs),
        max_concurrent_probes: cfg.probe_concurrency,
    });
    let checker_handle = checker.start(
        registry.clone(),
        metrics.clone(),
        probe,
        shutdown.subscribe(),
    );

    let advisor = ScalingAdvisor::new(cfg.scaling_bounds());
    let advisor_handle = advisor.start(
        service.clone(),
        Duration::from_secs(cfg.advisory_interval_secs),
        shutdown.subscribe(),
    );

    // 4. Inbound adapter

    let server = AdminServer::new(cfg.listen_addr.clone(), service, advisor);

    tokio::spawn(shutdown_signal(shutdown.clone()));

    let result = server.run(shutdown.subscribe()).await;

    // Stop the background loops before exiting
    shutdown.shutdown();
    let _ = checker_handle.await;
    let _ = advisor_handle.await;

    result
}
