//! API Routes
//!
//! Read-only HTTP surface: health, this gateway's status, local snapshot
//! metadata, the four topology registries and metrics.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::Metrics;
use crate::config::GatewayConfig;
use crate::local::LocalNode;
use crate::registry::Registries;
use crate::types::{GatewayStatus, NodeId, SnapshotInfo};

/// Shared API state
pub struct ApiState {
    pub config: Arc<GatewayConfig>,
    /// This gateway's own node id
    pub node_id: NodeId,
    pub local: Arc<LocalNode>,
    pub registries: Arc<Registries>,
    pub metrics: Arc<Metrics>,
    pub snapshot: SnapshotInfo,
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        // Health & Status
        .route("/health", get(health_check))
        .route("/status", get(get_status))
        .route("/snapshot/info", get(get_snapshot_info))

        // Topology
        .route("/topology/public", get(get_public))
        .route("/topology/private", get(get_private))
        .route("/topology/public/:id", get(get_public_node))
        .route("/topology/gateways", get(get_gateways))
        .route("/topology/gateways/:id", get(get_gateway_node))
        .route("/topology/snapshots", get(get_snapshots))

        // Metrics
        .route("/metrics", get(get_metrics_prometheus))
        .route("/metrics/json", get(get_metrics_json))

        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the HTTP API server until cancelled
pub async fn run_api_server(state: Arc<ApiState>, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.api_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("📊 HTTP API server listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

/// GET /health - Simple health check
async fn health_check() -> impl IntoResponse {
    "OK"
}

/// GET /status - The document companion gateways read from us
async fn get_status(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let local = state.local.state().await;

    Json(GatewayStatus {
        id: state.node_id.clone(),
        moniker: state.config.moniker.clone(),
        faucet_address: state.config.faucet_address.clone(),
        node_type: state.config.node_type.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        app_version: local.version,
        latest_block_height: local.latest_block_height,
    })
}

/// GET /snapshot/info
async fn get_snapshot_info(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(state.snapshot.clone())
}

async fn get_public(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(state.registries.public.snapshot().await)
}

/// GET /topology/public/:id - One row, tombstoned or not
async fn get_public_node(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<NodeId>,
) -> impl IntoResponse {
    match state.registries.public.get(&id).await {
        Some(node) => Json(node).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn get_private(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(state.registries.private.snapshot().await)
}

async fn get_gateways(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(state.registries.gateways.snapshot().await)
}

async fn get_gateway_node(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<NodeId>,
) -> impl IntoResponse {
    match state.registries.gateways.get(&id).await {
        Some(node) => Json(node).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn get_snapshots(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(state.registries.snapshots.snapshot().await)
}

/// GET /metrics - Prometheus format metrics
async fn get_metrics_prometheus(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    refresh_local_height(&state).await;

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.metrics.to_prometheus(),
    )
}

/// GET /metrics/json - JSON format metrics
async fn get_metrics_json(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    refresh_local_height(&state).await;
    Json(state.metrics.to_json())
}

async fn refresh_local_height(state: &ApiState) {
    let height = state.local.state().await.latest_block_height;
    state.metrics.set_local_height(height);
}
