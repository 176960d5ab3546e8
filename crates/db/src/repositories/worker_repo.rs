//! Repository for the `workers` table.

use sqlx::PgPool;
use cronhub_core::types::WorkerId;

use crate::models::worker::{default_worker_name, UpsertWorker, Worker};

/// Column list for `workers` queries.
const COLUMNS: &str = "\
    id, team_id, name, description, is_active, last_active, metadata, \
    created_at, updated_at";

pub struct WorkerRepo;

impl WorkerRepo {
    /// Create the worker or update it in place, keyed by its self-chosen id.
    ///
    /// Metadata objects are merged shallowly (`||`); a non-object replaces
    /// the stored value. Setting `is_active = true` also stamps
    /// `last_active`.
    pub async fn upsert(pool: &PgPool, input: &UpsertWorker) -> Result<Worker, sqlx::Error> {
        let insert_name = input
            .name
            .clone()
            .unwrap_or_else(|| default_worker_name(input.id));

        let query = format!(
            "INSERT INTO workers (id, team_id, name, description, metadata, is_active, last_active) \
             VALUES ($1, $2, $3, COALESCE($4, ''), COALESCE($5::jsonb, '{{}}'::jsonb), \
                     COALESCE($6, FALSE), CASE WHEN $6 THEN NOW() END) \
             ON CONFLICT (id) DO UPDATE SET \
                 team_id = COALESCE($2, workers.team_id), \
                 name = COALESCE($7, workers.name), \
                 description = COALESCE($4, workers.description), \
                 metadata = CASE \
                     WHEN $5::jsonb IS NULL THEN workers.metadata \
                     WHEN jsonb_typeof(workers.metadata) = 'object' \
                          AND jsonb_typeof($5::jsonb) = 'object' \
                         THEN workers.metadata || $5::jsonb \
                     ELSE $5::jsonb \
                 END, \
                 is_active = COALESCE($6, workers.is_active), \
                 last_active = CASE WHEN $6 THEN NOW() ELSE workers.last_active END, \
                 updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Worker>(&query)
            .bind(input.id)
            .bind(input.team_id)
            .bind(&insert_name)
            .bind(input.description.as_deref())
            .bind(input.metadata.as_ref())
            .bind(input.is_active)
            .bind(input.name.as_deref())
            .fetch_one(pool)
            .await
    }

    /// Find a worker by its ID.
    pub async fn find_by_id(pool: &PgPool, id: WorkerId) -> Result<Option<Worker>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM workers WHERE id = $1");
        sqlx::query_as::<_, Worker>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List all workers, most recently active first.
    pub async fn list(pool: &PgPool) -> Result<Vec<Worker>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM workers ORDER BY last_active DESC NULLS LAST, created_at DESC"
        );
        sqlx::query_as::<_, Worker>(&query).fetch_all(pool).await
    }

    /// Record a liveness signal. Returns `false` if the worker is unknown.
    pub async fn touch(pool: &PgPool, id: WorkerId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE workers SET is_active = TRUE, last_active = NOW(), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Flag a worker as gone (its connection closed).
    pub async fn mark_inactive(pool: &PgPool, id: WorkerId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE workers SET is_active = FALSE, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
