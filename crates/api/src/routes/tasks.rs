//! Route definitions for the `/tasks` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::tasks;
use crate::state::AppState;

/// Routes mounted at `/tasks`.
///
/// ```text
/// GET    /                -> list_tasks
/// POST   /                -> submit_task
/// GET    /{id}            -> get_task
/// POST   /{id}/cancel     -> cancel_task
/// POST   /{id}/stop       -> stop_task
/// POST   /{id}/retry      -> retry_task
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(tasks::list_tasks).post(tasks::submit_task))
        .route("/{id}", get(tasks::get_task))
        .route("/{id}/cancel", post(tasks::cancel_task))
        .route("/{id}/stop", post(tasks::stop_task))
        .route("/{id}/retry", post(tasks::retry_task))
}
