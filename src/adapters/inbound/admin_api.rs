//! Admin API Server
//!
//! HTTP surface for deployment tooling and operational scripts:
//! instance registration, routing, outcome reporting, fleet stats, and
//! scaling advice. Read endpoints return point-in-time snapshots.

use crate::application::BalancerService;
use crate::domain::entities::{HealthState, InstanceSnapshot};
use crate::domain::errors::BalancerError;
use crate::domain::ports::RegisterSpec;
use crate::infrastructure::ScalingAdvisor;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

/// Registration request from deployment tooling.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

fn default_weight() -> f64 {
    1.0
}

/// Registration response.
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub id: String,
    pub registered: bool,
}

/// Outcome report from the dispatch layer.
#[derive(Debug, Clone, Deserialize)]
pub struct OutcomeRequest {
    pub success: bool,
    pub latency_ms: f64,
}

/// Utilization report from an instance.
#[derive(Debug, Clone, Deserialize)]
pub struct UtilizationRequest {
    pub cpu: Option<f64>,
    pub mem: Option<f64>,
}

/// Routing decision response.
#[derive(Debug, Serialize)]
pub struct RouteResponse {
    pub id: String,
    pub host: String,
    pub port: u16,
}

/// Per-instance detail for the stats surface.
#[derive(Debug, Serialize)]
pub struct InstanceDetail {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub status: HealthState,
    pub weight: f64,
    pub region: String,
    pub tags: HashMap<String, String>,
    pub connections: u32,
    pub avg_response_time_ms: f64,
    pub request_count: u64,
    pub cpu: Option<f64>,
    pub mem: Option<f64>,
    pub last_probe_ok_ms: Option<u64>,
}

/// List of instances response.
#[derive(Debug, Serialize)]
pub struct InstancesResponse {
    pub instances: Vec<InstanceDetail>,
    pub total: usize,
}

/// Balancer self-liveness response.
#[derive(Debug, Serialize)]
pub struct HealthzResponse {
    pub status: String,
    pub version: String,
    pub strategy: String,
}

/// Shared handler state.
#[derive(Clone)]
pub struct AdminState {
    pub service: Arc<BalancerService>,
    pub advisor: ScalingAdvisor,
}

/// Admin API server.
pub struct AdminServer {
    listen_addr: String,
    state: AdminState,
}

impl AdminServer {
    pub fn new(listen_addr: String, service: Arc<BalancerService>, advisor: ScalingAdvisor) -> Self {
        Self {
            listen_addr,
            state: AdminState { service, advisor },
        }
    }

    /// Build the route table. Exposed for in-process serving in tests.
    pub fn router(state: AdminState) -> Router {
        Router::new()
            .route("/healthz", get(healthz_handler))
            .route("/instances", post(register_handler))
            .route("/instances", get(list_instances_handler))
            .route("/instances/:id", get(get_instance_handler))
            .route("/instances/:id", delete(deregister_handler))
            .route("/instances/:id/outcome", post(outcome_handler))
            .route("/instances/:id/utilization", post(utilization_handler))
            .route("/route", get(route_handler))
            .route("/stats", get(stats_handler))
            .route("/scaling/advice", get(advice_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Run the server until shutdown is signalled.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let app = Self::router(self.state.clone());

        let listener = TcpListener::bind(&self.listen_addr).await?;
        tracing::info!("admin API listening on {}", self.listen_addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;
        Ok(())
    }
}

fn instance_detail(state: &AdminState, snapshot: InstanceSnapshot) -> InstanceDetail {
    let request_count = state
        .service
        .instance_stats(&snapshot.id)
        .map(|s| s.request_count)
        .unwrap_or(0);

    InstanceDetail {
        request_count,
        status: snapshot.health,
        avg_response_time_ms: snapshot.avg_latency_secs * 1000.0,
        id: snapshot.id,
        host: snapshot.host,
        port: snapshot.port,
        weight: snapshot.weight,
        region: snapshot.region,
        tags: snapshot.tags,
        connections: snapshot.connections,
        cpu: snapshot.cpu,
        mem: snapshot.mem,
        last_probe_ok_ms: snapshot.last_probe_ok_ms,
    }
}

fn error_response(err: &BalancerError) -> Response {
    let status = match err {
        BalancerError::DuplicateInstance { .. } => StatusCode::CONFLICT,
        BalancerError::NoHealthyInstances => StatusCode::SERVICE_UNAVAILABLE,
        BalancerError::InstanceNotFound(_) => StatusCode::NOT_FOUND,
        BalancerError::RegistryUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({ "error": err.to_string() }))).into_response()
}

// Handler functions

async fn healthz_handler(State(state): State<AdminState>) -> impl IntoResponse {
    Json(HealthzResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        strategy: state.service.strategy().to_string(),
    })
}

async fn register_handler(
    State(state): State<AdminState>,
    Json(req): Json<RegisterRequest>,
) -> Response {
    let spec = RegisterSpec {
        host: req.host,
        port: req.port,
        weight: req.weight,
        region: req.region,
        tags: req.tags,
    };

    match state.service.register(spec) {
        Ok(id) => (
            StatusCode::CREATED,
            Json(RegisterResponse {
                id,
                registered: true,
            }),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

async fn deregister_handler(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    // Idempotent: removing an unknown id is a no-op, not an error
    state.service.deregister(&id);
    StatusCode::NO_CONTENT
}

async fn list_instances_handler(State(state): State<AdminState>) -> Response {
    match state.service.instance_details() {
        Ok(snapshots) => {
            let instances: Vec<InstanceDetail> = snapshots
                .into_iter()
                .map(|s| instance_detail(&state, s))
                .collect();
            let total = instances.len();
            Json(InstancesResponse { instances, total }).into_response()
        }
        Err(e) => error_response(&e),
    }
}

async fn get_instance_handler(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> Response {
    match state.service.instance(&id) {
        Ok(snapshot) => Json(instance_detail(&state, snapshot)).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn route_handler(State(state): State<AdminState>) -> Response {
    match state.service.select() {
        Ok(snapshot) => Json(RouteResponse {
            id: snapshot.id,
            host: snapshot.host,
            port: snapshot.port,
        })
        .into_response(),
        Err(e) => error_response(&e),
    }
}

async fn outcome_handler(
    State(state): State<AdminState>,
    Path(id): Path<String>,
    Json(req): Json<OutcomeRequest>,
) -> impl IntoResponse {
    // Outcomes for since-removed instances are silently discarded
    state
        .service
        .report_outcome(&id, req.success, req.latency_ms / 1000.0);
    StatusCode::ACCEPTED
}

async fn utilization_handler(
    State(state): State<AdminState>,
    Path(id): Path<String>,
    Json(req): Json<UtilizationRequest>,
) -> impl IntoResponse {
    state.service.report_utilization(&id, req.cpu, req.mem);
    StatusCode::ACCEPTED
}

async fn stats_handler(State(state): State<AdminState>) -> Response {
    match state.service.fleet_stats() {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn advice_handler(State(state): State<AdminState>) -> Response {
    match state.service.fleet_stats() {
        Ok(stats) => Json(state.advisor.evaluate(&stats)).into_response(),
        Err(e) => error_response(&e),
    }
}
