//! Repository for the `tasks` table.
//!
//! Status literals always go through [`TaskStatus`]; no magic numbers.
//! Writes that depend on the current row state (status updates,
//! cancellation) are single conditional statements.

use sqlx::PgPool;
use cronhub_core::types::DbId;

use crate::models::status::TaskStatus;
use crate::models::task::{NewTask, Task, TaskChange, TaskListQuery};

/// Column list for `tasks` queries.
const COLUMNS: &str = "\
    id, team_id, cronjob_id, workflow_id, worker_id, worker_name, \
    name, command, args, context, status_id, \
    time_plan, time_start, time_end, timeout_secs, \
    retry_count, max_retry, retryable, retry_of, \
    output, previous, next, created_at, updated_at";

/// Provides persistence operations for tasks.
pub struct TaskRepo;

impl TaskRepo {
    /// Insert a new pending task.
    pub async fn create(pool: &PgPool, input: &NewTask) -> Result<Task, sqlx::Error> {
        let query = format!(
            "INSERT INTO tasks \
                 (team_id, cronjob_id, workflow_id, worker_id, name, command, args, context, \
                  status_id, time_plan, timeout_secs, max_retry, retryable, previous) \
             VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, '[]'::jsonb), COALESCE($8, '{{}}'::jsonb), \
                     $9, COALESCE($10, NOW()), COALESCE($11, 0), COALESCE($12, 0), $13, $14) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(input.team_id)
            .bind(input.cronjob_id)
            .bind(input.workflow_id)
            .bind(input.worker_id)
            .bind(&input.name)
            .bind(&input.command)
            .bind(input.args.as_ref())
            .bind(input.context.as_ref())
            .bind(TaskStatus::Pending.id())
            .bind(input.time_plan)
            .bind(input.timeout_secs)
            .bind(input.max_retry)
            .bind(input.retryable)
            .bind(input.previous)
            .fetch_one(pool)
            .await
    }

    /// Find a task by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Task>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE id = $1");
        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List tasks, newest first, with optional status / worker filters.
    pub async fn list(pool: &PgPool, params: &TaskListQuery) -> Result<Vec<Task>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM tasks \
             WHERE ($1::SMALLINT IS NULL OR status_id = $1) \
               AND ($2::UUID IS NULL OR worker_id = $2) \
             ORDER BY id DESC \
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(params.status.map(TaskStatus::id))
            .bind(params.worker_id)
            .bind(params.limit())
            .bind(params.offset())
            .fetch_all(pool)
            .await
    }

    /// One page of tasks waiting for a worker, in id order after `after_id`.
    pub async fn list_awaiting_dispatch(
        pool: &PgPool,
        after_id: DbId,
        limit: i64,
    ) -> Result<Vec<Task>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM tasks \
             WHERE status_id IN ($1, $2) AND time_end IS NULL AND id > $3 \
             ORDER BY id ASC \
             LIMIT $4"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(TaskStatus::Pending.id())
            .bind(TaskStatus::Retrying.id())
            .bind(after_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Apply a worker-reported change unless the task already has an end time.
    ///
    /// `time_start` is stamped on the first move into `running` and
    /// `time_end` on the first move into a terminal status. Returns `None`
    /// when the row is missing or already finished.
    pub async fn apply_change(
        pool: &PgPool,
        id: DbId,
        change: &TaskChange,
    ) -> Result<Option<Task>, sqlx::Error> {
        let entering_running = change.status == Some(TaskStatus::Running);
        let entering_terminal = change.status.is_some_and(TaskStatus::is_terminal);

        let query = format!(
            "UPDATE tasks SET \
                 status_id = COALESCE($2, status_id), \
                 output = COALESCE($3, output), \
                 next = COALESCE($4, next), \
                 worker_id = COALESCE($5, worker_id), \
                 worker_name = COALESCE($6, worker_name), \
                 time_start = CASE WHEN $7 THEN COALESCE(time_start, NOW()) ELSE time_start END, \
                 time_end = CASE WHEN $8 THEN NOW() ELSE time_end END, \
                 updated_at = NOW() \
             WHERE id = $1 AND time_end IS NULL \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .bind(change.status.map(TaskStatus::id))
            .bind(change.output.as_deref())
            .bind(change.next)
            .bind(change.worker_id)
            .bind(change.worker_name.as_deref())
            .bind(entering_running)
            .bind(entering_terminal)
            .fetch_optional(pool)
            .await
    }

    /// Move a task from `pending` to `canceled`. Returns `None` if the task
    /// is missing or not pending.
    pub async fn cancel_if_pending(pool: &PgPool, id: DbId) -> Result<Option<Task>, sqlx::Error> {
        let query = format!(
            "UPDATE tasks \
             SET status_id = $2, time_end = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id = $3 AND time_end IS NULL \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .bind(TaskStatus::Canceled.id())
            .bind(TaskStatus::Pending.id())
            .fetch_optional(pool)
            .await
    }

    /// Create a fresh pending task from `original`, bumping `retry_count`
    /// and linking back through `retry_of`. The original row is untouched.
    pub async fn create_retry(pool: &PgPool, original: &Task) -> Result<Task, sqlx::Error> {
        let query = format!(
            "INSERT INTO tasks \
                 (team_id, cronjob_id, workflow_id, worker_id, name, command, args, context, \
                  status_id, time_plan, timeout_secs, retry_count, max_retry, retryable, \
                  retry_of, previous) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW(), $10, $11, $12, $13, $14, $15) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(original.team_id)
            .bind(original.cronjob_id)
            .bind(original.workflow_id)
            .bind(original.worker_id)
            .bind(&original.name)
            .bind(&original.command)
            .bind(&original.args)
            .bind(&original.context)
            .bind(TaskStatus::Pending.id())
            .bind(original.timeout_secs)
            .bind(original.retry_count + 1)
            .bind(original.max_retry)
            .bind(original.retryable)
            .bind(original.id)
            .bind(original.previous)
            .fetch_one(pool)
            .await
    }
}
