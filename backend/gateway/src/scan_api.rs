//! Scan lifecycle endpoints: status polling, progress updates from the job,
//! starting a scan and collecting screenshots.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use toolkit_core::{ScanError, ScanFlags, ScanRequest, ScanSnapshot};
use toolkit_supervisor::SupervisorError;

use crate::health_api::MessageResponse;
use crate::server::{error_response, GatewayState};

pub const NOT_RUNNING_MESSAGE: &str = "ERROR: Scan Not Currently Running...";
pub const ALREADY_RUNNING_MESSAGE: &str = "ERROR: Scan Running...";
pub const DONE_MESSAGE: &str = "Done!";

/// `/status` body. `moduleName` is only present while a scan runs.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub running: bool,
    pub current_step: u32,
    pub total_steps: u32,
    pub step_name: String,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_name: Option<String>,
}

impl From<ScanSnapshot> for StatusResponse {
    fn from(snapshot: ScanSnapshot) -> Self {
        Self {
            module_name: snapshot.running.then_some(snapshot.module_name),
            running: snapshot.running,
            current_step: snapshot.current_step,
            total_steps: snapshot.total_steps,
            step_name: snapshot.step_name,
            target: snapshot.target,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateScanRequest {
    pub step_name: String,
    #[serde(alias = "target_domain")]
    pub target: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WildfireRequest {
    pub fire_starter: bool,
    pub fire_cloud: bool,
    pub fire_scanner: bool,
    #[serde(default)]
    pub fqdn: Option<String>,
    #[serde(default)]
    pub scan_single_domain: bool,
    #[serde(default = "default_domain_count")]
    pub domain_count: u32,
}

fn default_domain_count() -> u32 {
    1
}

impl WildfireRequest {
    /// `fqdn` is only used when `scanSingleDomain` is set; a single-domain
    /// scan without an fqdn is rejected.
    pub fn into_scan_request(self) -> Result<ScanRequest, ScanError> {
        let flags = ScanFlags::new(self.fire_starter, self.fire_cloud, self.fire_scanner);
        let single_domain = if self.scan_single_domain {
            Some(self.fqdn.unwrap_or_default())
        } else {
            None
        };
        ScanRequest::new(flags, self.domain_count, single_domain)
    }
}

/// Handler for `GET /status`
pub async fn status(State(state): State<GatewayState>) -> Json<StatusResponse> {
    Json(state.supervisor.snapshot().into())
}

/// Handler for `POST /update-scan`
pub async fn update_scan(
    State(state): State<GatewayState>,
    Json(update): Json<UpdateScanRequest>,
) -> Response {
    match state.supervisor.advance(&update.step_name, &update.target) {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(ScanError::NotRunning) => {
            warn!(step_name = %update.step_name, "Progress update while no scan is running");
            MessageResponse::new(NOT_RUNNING_MESSAGE).into_response()
        }
        Err(e) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

/// Handler for `POST /wildfire`
///
/// Runs the scan on its own task and answers once the job has exited. The
/// task keeps going if the client disconnects, so the state is always reset.
pub async fn wildfire(
    State(state): State<GatewayState>,
    Json(body): Json<WildfireRequest>,
) -> Response {
    if state.supervisor.state().is_running() {
        return MessageResponse::new(ALREADY_RUNNING_MESSAGE).into_response();
    }

    let request = match body.into_scan_request() {
        Ok(request) => request,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let supervisor = Arc::clone(&state.supervisor);
    match tokio::spawn(async move { supervisor.run_scan(request).await }).await {
        Ok(Ok(outcome)) => {
            info!(
                run_id = %outcome.run_id,
                success = outcome.exit.success(),
                "Wildfire scan done"
            );
            MessageResponse::new(DONE_MESSAGE).into_response()
        }
        Ok(Err(SupervisorError::Scan(ScanError::AlreadyRunning))) => {
            MessageResponse::new(ALREADY_RUNNING_MESSAGE).into_response()
        }
        Ok(Err(e)) => {
            error!(error = %e, "Wildfire scan failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        Err(e) => {
            error!(error = %e, "Wildfire scan task panicked");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Handler for `POST /collect_sceenshots`
pub async fn collect_screenshots(State(state): State<GatewayState>) -> Response {
    let supervisor = Arc::clone(&state.supervisor);
    match tokio::spawn(async move { supervisor.collect_screenshots().await }).await {
        Ok(Ok(exit)) => {
            info!(success = exit.success(), "Screenshot collection done");
            MessageResponse::new(DONE_MESSAGE).into_response()
        }
        Ok(Err(e)) => {
            error!(error = %e, "Screenshot collection failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        Err(e) => {
            error!(error = %e, "Screenshot task panicked");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
