//! Tests for `AppError` → HTTP response mapping.
//!
//! These call `IntoResponse` directly; no router is involved.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use cronhub_api::error::AppError;
use cronhub_core::error::CoreError;
use cronhub_db::StoreError;
use http_body_util::BodyExt;

/// Helper: convert an `AppError` into its status code and parsed JSON body.
async fn error_to_response(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

// ---------------------------------------------------------------------------
// Test: NotFound maps to 404 with the entity and id in the message
// ---------------------------------------------------------------------------

#[tokio::test]
async fn not_found_error_returns_404() {
    let err = AppError::Core(CoreError::not_found("Task", 42));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], "Task with id 42 not found");
}

// ---------------------------------------------------------------------------
// Test: lock ownership errors are client errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lock_not_owned_and_expired_return_400() {
    let (status, json) = error_to_response(AppError::Core(CoreError::LockNotOwned {
        key: "job:x".into(),
    }))
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "LOCK_NOT_OWNED");

    let (status, json) = error_to_response(AppError::Core(CoreError::LockExpired {
        key: "job:x".into(),
    }))
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "LOCK_EXPIRED");
}

// ---------------------------------------------------------------------------
// Test: LockHeld maps to 409
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lock_held_returns_409() {
    let err = AppError::Core(CoreError::LockHeld {
        key: "task:7".into(),
    });

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "LOCK_HELD");
}

// ---------------------------------------------------------------------------
// Test: WorkerUnreachable maps to 503
// ---------------------------------------------------------------------------

#[tokio::test]
async fn worker_unreachable_returns_503() {
    let err = AppError::Core(CoreError::WorkerUnreachable {
        worker_id: "6f1c2a3b-0000-4000-8000-000000000000".into(),
    });

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["code"], "WORKER_UNREACHABLE");
}

// ---------------------------------------------------------------------------
// Test: InvalidTransition maps to 400 and keeps the message
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_transition_returns_400() {
    let err = AppError::Core(CoreError::InvalidTransition(
        "only pending tasks can be canceled".into(),
    ));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "INVALID_TRANSITION");
    assert_eq!(json["error"], "only pending tasks can be canceled");
}

// ---------------------------------------------------------------------------
// Test: StoreError converts without losing the domain variant
// ---------------------------------------------------------------------------

#[tokio::test]
async fn store_error_keeps_core_variant() {
    let err: AppError = StoreError::Core(CoreError::Validation("bad ttl".into())).into();

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(json["error"], "bad ttl");
}

// ---------------------------------------------------------------------------
// Test: internal errors are sanitized
// ---------------------------------------------------------------------------

#[tokio::test]
async fn internal_error_returns_500_and_sanitizes_message() {
    let err = AppError::Core(CoreError::Internal("connection string leaked".into()));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");
    assert_eq!(json["error"], "An internal error occurred");
}

#[tokio::test]
async fn row_not_found_returns_404() {
    let (status, json) = error_to_response(AppError::Database(sqlx::Error::RowNotFound)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
}
