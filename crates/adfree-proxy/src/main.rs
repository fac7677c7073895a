//! adfree-proxy
//!
//! Reverse proxy enforcing origin-signed ad policies:
//! - every non-ops path is forwarded to `proxy.upstream`
//! - clients opt in with `Adfree-Want`
//! - violations are reported asynchronously to the policy's `report_to`
//!
//! Config path: `ADFREE_CONFIG` or `./adfree.yaml`.

use std::net::SocketAddr;
use std::time::Duration;

use tracing_subscriber::{fmt, EnvFilter};

use adfree_core::error::{AdfreeError, Result};
use adfree_proxy::{app_state::AppState, config, router};

const REPORT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "adfree-proxy failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let path = std::env::var("ADFREE_CONFIG").unwrap_or_else(|_| "adfree.yaml".to_string());
    let cfg = config::load_from_file(&path)?;
    let listen: SocketAddr = cfg
        .proxy
        .listen
        .parse()
        .map_err(|e| AdfreeError::Config(format!("proxy.listen must be a valid SocketAddr: {e}")))?;

    let (state, workers) = AppState::new(cfg)?;
    let app = router::build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| AdfreeError::Internal(format!("bind {listen} failed: {e}")))?;
    tracing::info!(%listen, upstream = %state.cfg().proxy.upstream, "adfree-proxy starting");

    let drain = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "signal handler failed");
            }
            drain.metrics().set_draining();
            tracing::info!("shutdown requested; draining");
        })
        .await
        .map_err(|e| AdfreeError::Internal(format!("server failed: {e}")))?;

    // Last queue handle goes with the state; workers finish what is queued.
    drop(state);
    if tokio::time::timeout(REPORT_DRAIN_TIMEOUT, workers.join()).await.is_err() {
        tracing::warn!("report workers did not drain in time");
    }
    Ok(())
}
