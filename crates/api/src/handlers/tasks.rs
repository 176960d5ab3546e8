//! Handlers for the `/tasks` resource.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use cronhub_core::error::CoreError;
use cronhub_core::types::DbId;
use cronhub_db::models::task::{NewTask, TaskListQuery};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct StopTaskRequest {
    /// Kill instead of asking the worker to stop gracefully.
    #[serde(default)]
    pub force: bool,
}

/// POST /api/v1/tasks
///
/// Returns 201 with the pending task.
pub async fn submit_task(
    State(state): State<AppState>,
    Json(input): Json<NewTask>,
) -> AppResult<impl IntoResponse> {
    let task = state.engine.submit(&input).await?;

    tracing::info!(task_id = task.id, name = %task.name, "Task submitted");

    Ok((StatusCode::CREATED, Json(DataResponse { data: task })))
}

/// GET /api/v1/tasks?status=&worker_id=&limit=&offset=
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(params): Query<TaskListQuery>,
) -> AppResult<impl IntoResponse> {
    let tasks = state.stores.tasks.list(&params).await?;
    Ok(Json(DataResponse { data: tasks }))
}

/// GET /api/v1/tasks/{id}
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let task = state
        .stores
        .tasks
        .find_by_id(task_id)
        .await?
        .ok_or(AppError::Core(CoreError::not_found("Task", task_id)))?;
    Ok(Json(DataResponse { data: task }))
}

/// POST /api/v1/tasks/{id}/cancel
///
/// Only pending tasks can be canceled. Returns the canceled task.
pub async fn cancel_task(
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let task = state.engine.cancel(task_id).await?;
    Ok(Json(DataResponse { data: task }))
}

/// POST /api/v1/tasks/{id}/stop
///
/// Sends `stop` (or `kill` with `force: true`) to the worker running the
/// task. 503 when that worker has no live session.
pub async fn stop_task(
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
    Json(input): Json<StopTaskRequest>,
) -> AppResult<impl IntoResponse> {
    let instruction = state.engine.stop(task_id, input.force).await?;
    Ok(Json(DataResponse { data: instruction }))
}

/// POST /api/v1/tasks/{id}/retry
///
/// Creates a new pending task from a finished one. Returns 201 with the
/// new task; the original is left unchanged.
pub async fn retry_task(
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let task = state.engine.retry(task_id).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: task })))
}
