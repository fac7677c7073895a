//! Operational endpoints, served ahead of the proxy fallback.
//!
//! - `/healthz` : process is up
//! - `/readyz`  : 503 once shutdown has started
//! - `/metrics` : Prometheus text

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};

use crate::app_state::AppState;

const PROMETHEUS_TEXT: &str = "text/plain; version=0.0.4; charset=utf-8";

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn readyz(State(state): State<AppState>) -> (StatusCode, &'static str) {
    if state.is_draining() {
        return (StatusCode::SERVICE_UNAVAILABLE, "draining");
    }
    (StatusCode::OK, "ready")
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = state.metrics().render(&state.metrics_extra());
    ([(header::CONTENT_TYPE, PROMETHEUS_TEXT)], body)
}
