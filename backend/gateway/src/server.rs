//! Main HTTP control server.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use toolkit_supervisor::ScanSupervisor;

use crate::{health_api, process_api, scan_api};

/// Application state shared across routes.
#[derive(Clone)]
pub struct GatewayState {
    pub supervisor: Arc<ScanSupervisor>,
}

impl GatewayState {
    pub fn new(supervisor: Arc<ScanSupervisor>) -> Self {
        Self { supervisor }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// `{"error": ...}` with the given status code.
pub fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

/// Build the router with every control endpoint.
pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/ping", get(health_api::ping))
        .route("/status", get(scan_api::status))
        .route("/update-scan", post(scan_api::update_scan))
        .route("/wildfire", post(scan_api::wildfire))
        // Path spelling is part of the job's contract.
        .route("/collect_sceenshots", post(scan_api::collect_screenshots))
        .route(
            "/terminate-subprocesses",
            get(process_api::terminate_subprocesses),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the control API until Ctrl-C, then terminate every subprocess.
#[instrument(skip(state))]
pub async fn start_server(addr: SocketAddr, state: GatewayState) -> Result<()> {
    let supervisor = Arc::clone(&state.supervisor);
    let app = build_router(state);

    let listener = TcpListener::bind(&addr).await?;
    info!("Control server listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let report = supervisor.cancel().await;
    info!(
        trees = report.trees_terminated(),
        "Control server stopped, subprocesses terminated"
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C, serving until killed");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
