//! adfree-report-sink
//!
//! Development collector for violation reports:
//! - `POST /adfree` : logs the JSON report, 200 (400 on invalid JSON)
//! - `GET /health`  : liveness
//!
//! Listen address: `ADFREE_SINK_LISTEN` or `127.0.0.1:8787`.

use std::net::SocketAddr;

use axum::{
    body::Bytes,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing_subscriber::{fmt, EnvFilter};

async fn receive(body: Bytes) -> impl IntoResponse {
    let report: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "rejected report: invalid JSON");
            return (StatusCode::BAD_REQUEST, Json(json!({"status": "error", "error": "invalid json"})));
        }
    };

    let kind = report.get("type").and_then(Value::as_str).unwrap_or("unknown");
    let origin = report.get("origin").and_then(Value::as_str).unwrap_or("unknown");
    tracing::info!(kind, origin, report = %report, "report received");

    (StatusCode::OK, Json(json!({"status": "ok"})))
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let raw = std::env::var("ADFREE_SINK_LISTEN").unwrap_or_else(|_| "127.0.0.1:8787".to_string());
    let listen: SocketAddr = match raw.parse() {
        Ok(a) => a,
        Err(e) => {
            tracing::error!(listen = %raw, error = %e, "invalid listen address");
            std::process::exit(2);
        }
    };

    let app = Router::new()
        .route("/adfree", post(receive))
        .route("/health", get(health));

    let listener = match tokio::net::TcpListener::bind(listen).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(%listen, error = %e, "bind failed");
            std::process::exit(1);
        }
    };
    tracing::info!(%listen, "adfree-report-sink listening");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "server failed");
        std::process::exit(1);
    }
}
