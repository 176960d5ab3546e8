//! Handlers for the `/workers` resource.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use cronhub_core::error::CoreError;
use cronhub_core::types::WorkerId;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;
use crate::ws::LiveWorker;

#[derive(Debug, Serialize)]
pub struct LiveWorkersResponse {
    /// Open dispatch connections, registered or not.
    pub sessions: usize,
    pub workers: Vec<LiveWorker>,
}

/// GET /api/v1/workers
pub async fn list_workers(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let workers = state.stores.workers.list().await?;
    Ok(Json(DataResponse { data: workers }))
}

/// GET /api/v1/workers/live
///
/// Snapshot of this instance's session registry.
pub async fn live_workers(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let sessions = state.sessions.count().await;
    let workers = state.sessions.get_workers().await;
    Ok(Json(DataResponse {
        data: LiveWorkersResponse { sessions, workers },
    }))
}

/// GET /api/v1/workers/{id}
pub async fn get_worker(
    State(state): State<AppState>,
    Path(worker_id): Path<WorkerId>,
) -> AppResult<impl IntoResponse> {
    let worker = state
        .stores
        .workers
        .find_by_id(worker_id)
        .await?
        .ok_or(AppError::Core(CoreError::not_found("Worker", worker_id)))?;
    Ok(Json(DataResponse { data: worker }))
}
