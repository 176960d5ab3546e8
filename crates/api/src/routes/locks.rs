//! Route definitions for the `/locks` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::locks;
use crate::state::AppState;

/// Routes mounted at `/locks`.
///
/// ```text
/// POST   /acquire        -> acquire_lock
/// POST   /release        -> release_lock
/// POST   /refresh        -> refresh_lock
/// GET    /check          -> check_lock
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/acquire", post(locks::acquire_lock))
        .route("/release", post(locks::release_lock))
        .route("/refresh", post(locks::refresh_lock))
        .route("/check", get(locks::check_lock))
}
