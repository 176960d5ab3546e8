//! Handlers for the `/locks` resource.
//!
//! Workers take the admission lease here before opening a dispatch
//! connection; any service may also use these endpoints as a plain
//! distributed lock.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use cronhub_core::lock::{resolve_ttl, validate_key};
use cronhub_core::types::Timestamp;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AcquireLockRequest {
    pub key: String,
    /// Lease length in seconds. Defaults to 60, at most 3600.
    pub expire_seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ReleaseLockRequest {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshLockRequest {
    pub key: String,
    pub value: String,
    pub expire_seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct CheckLockQuery {
    pub key: String,
    pub value: Option<String>,
}

/// Outcome of acquire, release and refresh.
///
/// `value` is the owner token; it is `null` when an acquire lost to an
/// existing lease.
#[derive(Debug, Serialize)]
pub struct LockResponse {
    pub key: String,
    pub value: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Timestamp>,
}

#[derive(Debug, Serialize)]
pub struct CheckLockResponse {
    pub is_locked: bool,
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_matched: Option<bool>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/locks/acquire
///
/// Contention is not an error: the response is 200 with `success: false`.
pub async fn acquire_lock(
    State(state): State<AppState>,
    Json(input): Json<AcquireLockRequest>,
) -> AppResult<impl IntoResponse> {
    validate_key(&input.key)?;
    let ttl = resolve_ttl(input.expire_seconds)?;

    let lock = state.stores.locks.try_acquire(&input.key, ttl).await?;
    let data = match lock {
        Some(lock) => {
            tracing::debug!(key = %lock.key, ttl_secs = ttl.as_secs(), "Lock acquired");
            LockResponse {
                key: lock.key,
                value: Some(lock.token),
                success: true,
                expires_at: Some(lock.expires_at),
            }
        }
        None => {
            tracing::debug!(key = %input.key, "Lock held elsewhere");
            LockResponse {
                key: input.key,
                value: None,
                success: false,
                expires_at: None,
            }
        }
    };

    Ok(Json(DataResponse { data }))
}

/// POST /api/v1/locks/release
pub async fn release_lock(
    State(state): State<AppState>,
    Json(input): Json<ReleaseLockRequest>,
) -> AppResult<impl IntoResponse> {
    validate_key(&input.key)?;
    state.stores.locks.release(&input.key, &input.value).await?;

    Ok(Json(DataResponse {
        data: LockResponse {
            key: input.key,
            value: Some(input.value),
            success: true,
            expires_at: None,
        },
    }))
}

/// POST /api/v1/locks/refresh
pub async fn refresh_lock(
    State(state): State<AppState>,
    Json(input): Json<RefreshLockRequest>,
) -> AppResult<impl IntoResponse> {
    validate_key(&input.key)?;
    let ttl = resolve_ttl(input.expire_seconds)?;

    let lock = state
        .stores
        .locks
        .refresh(&input.key, &input.value, ttl)
        .await?;

    Ok(Json(DataResponse {
        data: LockResponse {
            key: lock.key,
            value: Some(lock.token),
            success: true,
            expires_at: Some(lock.expires_at),
        },
    }))
}

/// GET /api/v1/locks/check?key=..&value=..
pub async fn check_lock(
    State(state): State<AppState>,
    Query(params): Query<CheckLockQuery>,
) -> AppResult<impl IntoResponse> {
    validate_key(&params.key)?;
    let check = state
        .stores
        .locks
        .check(&params.key, params.value.as_deref())
        .await?;

    Ok(Json(DataResponse {
        data: CheckLockResponse {
            is_locked: check.exists,
            value: check.current_token,
            value_matched: check.matched,
        },
    }))
}
