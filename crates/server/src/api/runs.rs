//! Run status endpoints.

use super::error::{ApiError, ApiResult};
use super::AppState;
use axum::{extract::State, Json};
use rr_core::state::PipelineRun;
use rr_protocol::ipc::StatusSnapshot;

/// GET /status
/// Whether each tier of the most recent run was started.
pub async fn status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.manager.status())
}

/// GET /runs/last
/// Full record of the most recently finished run.
pub async fn last_run(State(state): State<AppState>) -> ApiResult<Json<PipelineRun>> {
    state
        .manager
        .last_run()
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("No run has finished yet".to_string()))
}
