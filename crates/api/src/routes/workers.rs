use axum::routing::get;
use axum::Router;

use crate::handlers::workers;
use crate::state::AppState;

/// Routes mounted at `/workers`.
///
/// ```text
/// GET    /                -> list_workers
/// GET    /live            -> live_workers
/// GET    /{id}            -> get_worker
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(workers::list_workers))
        .route("/live", get(workers::live_workers))
        .route("/{id}", get(workers::get_worker))
}
