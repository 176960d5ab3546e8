//! Persistence for tasks, workers, API keys and distributed locks.
//!
//! Queries live in static `*Repo` structs over a [`DbPool`]. The API server
//! does not call them directly; it goes through the store traits in
//! [`store`], which have a Postgres implementation backed by these repos and
//! an in-memory one for single-process runs and tests.

use sqlx::postgres::PgPoolOptions;

use cronhub_core::error::CoreError;

pub mod models;
pub mod repositories;
pub mod store;

pub use store::Stores;

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Round-trip a trivial query to confirm the database is reachable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply the embedded migrations in `crates/db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Error type shared by every store implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A domain-level outcome (lock contention, missing row, ...).
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
