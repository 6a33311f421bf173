//! REST API for IP threat lookups

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::aggregator::ThreatAggregator;
use crate::models::ThreatReport;

/// Application state shared across handlers
pub struct AppState {
    pub aggregator: ThreatAggregator,
    pub metrics: Option<PrometheusHandle>,
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        // Health check
        .route("/health", get(health_check))
        .route("/metrics", get(render_metrics))
        // Lookup
        .route("/threats/ip/:ip", get(get_threat))
        .with_state(state)
}

// ==================== Handlers ====================

async fn root() -> Json<Value> {
    tracing::info!("Root endpoint accessed");
    Json(json!({
        "message": "Cyber Threat Intelligence API is running.",
    }))
}

async fn health_check() -> Json<Value> {
    tracing::debug!("Health check endpoint accessed");
    Json(json!({
        "status": "healthy",
    }))
}

async fn render_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics disabled".to_string()),
    }
}

async fn get_threat(
    State(state): State<Arc<AppState>>,
    Path(ip): Path<String>,
) -> Json<ThreatReport> {
    Json(state.aggregator.aggregate(&ip).await)
}
