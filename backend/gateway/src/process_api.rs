//! Subprocess termination endpoint.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, info};

use crate::server::{error_response, GatewayState};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminateResponse {
    pub message: String,
    pub tracked_trees: usize,
    pub orphan_trees: usize,
}

/// Handler for `GET /terminate-subprocesses`
///
/// Cancellation runs on its own task so it completes even if the client goes
/// away; only a failure of that task itself is reported as an error.
pub async fn terminate_subprocesses(State(state): State<GatewayState>) -> Response {
    let supervisor = Arc::clone(&state.supervisor);
    match tokio::spawn(async move { supervisor.cancel().await }).await {
        Ok(report) => {
            info!(
                tracked = report.tracked.len(),
                orphans = report.orphans.len(),
                "Subprocesses terminated"
            );
            Json(TerminateResponse {
                message: "Subprocesses terminated successfully".to_string(),
                tracked_trees: report.tracked.len(),
                orphan_trees: report.orphans.len(),
            })
            .into_response()
        }
        Err(e) => {
            error!(error = %e, "Subprocess termination failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
