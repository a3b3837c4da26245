//! Ambient HTTP surface: `/ping /health /ready /live /metrics`, grounded on
//! `cmd/api/{api,controller}.go`'s route table and handlers, rebuilt on
//! `axum` with a `tower_http::cors::CorsLayer` in place of gorilla/mux +
//! rs/cors.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::CorsLayer;

use crate::state::TaskStateTable;

#[derive(Clone)]
pub struct ApiState {
    pub ready: Arc<AtomicBool>,
    pub task_state: Arc<TaskStateTable>,
    pub prometheus: PrometheusHandle,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/live", get(live))
        .route("/metrics", get(metrics))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn ping() -> &'static str {
    "pong"
}

async fn ready(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.ready.load(Ordering::Relaxed))
}

async fn live(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.task_state.any_completed_cycle())
}

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let is_ready = state.ready.load(Ordering::Relaxed);
    let is_live = state.task_state.any_completed_cycle();
    Json(is_ready && is_live)
}

async fn metrics(State(state): State<ApiState>) -> impl IntoResponse {
    (StatusCode::OK, state.prometheus.render())
}
