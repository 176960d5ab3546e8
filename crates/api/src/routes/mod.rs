pub mod health;
pub mod locks;
pub mod tasks;
pub mod workers;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws/task/?key=&value=                            worker dispatch connection
///
/// /locks/acquire                                   take a lease (POST)
/// /locks/release                                   drop a lease (POST)
/// /locks/refresh                                   extend a lease (POST)
/// /locks/check                                     inspect a key (GET)
///
/// /tasks                                           list, submit
/// /tasks/{id}                                      get
/// /tasks/{id}/cancel                               cancel pending (POST)
/// /tasks/{id}/stop                                 stop or kill running (POST)
/// /tasks/{id}/retry                                new task from finished (POST)
///
/// /workers                                         list
/// /workers/live                                    registry snapshot
/// /workers/{id}                                    get
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(ws_routes())
        .nest("/locks", locks::router())
        .nest("/tasks", tasks::router())
        .nest("/workers", workers::router())
}

/// The worker dispatch endpoint. Mounted under `/api/v1` and at the root,
/// where workers built against the bare wire path connect.
pub fn ws_routes() -> Router<AppState> {
    Router::new().route("/ws/task/", get(ws::ws_task_handler))
}
