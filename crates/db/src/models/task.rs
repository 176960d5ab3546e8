//! Task entity models and DTOs.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use cronhub_core::error::CoreError;
use cronhub_core::types::{DbId, Timestamp, WorkerId};

use super::status::TaskStatus;

/// Longest accepted task name.
const MAX_NAME_LEN: usize = 255;

/// Maximum page size for task listing.
pub const MAX_LIMIT: i64 = 100;

/// Default page size for task listing.
pub const DEFAULT_LIMIT: i64 = 50;

/// A row from the `tasks` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Task {
    pub id: DbId,
    pub team_id: Option<DbId>,
    pub cronjob_id: Option<DbId>,
    pub workflow_id: Option<DbId>,
    pub worker_id: Option<WorkerId>,
    pub worker_name: Option<String>,
    pub name: String,
    pub command: String,
    pub args: serde_json::Value,
    pub context: serde_json::Value,
    #[sqlx(rename = "status_id", try_from = "i16")]
    pub status: TaskStatus,
    pub time_plan: Timestamp,
    pub time_start: Option<Timestamp>,
    pub time_end: Option<Timestamp>,
    /// Seconds the task may run before it counts as timed out; 0 disables.
    pub timeout_secs: i32,
    pub retry_count: i32,
    pub max_retry: i32,
    /// `None` inherits the default (retryable); `Some(false)` opts out.
    pub retryable: Option<bool>,
    /// The task a manual retry was created from.
    pub retry_of: Option<DbId>,
    pub output: String,
    pub previous: Option<DbId>,
    pub next: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Task {
    /// Whether the task has reached an end time and is therefore immutable.
    pub fn is_finished(&self) -> bool {
        self.time_end.is_some()
    }

    /// When a running task stops being on time, if it has a timeout.
    pub fn deadline(&self) -> Option<Timestamp> {
        if self.timeout_secs <= 0 {
            return None;
        }
        self.time_start
            .map(|start| start + Duration::seconds(i64::from(self.timeout_secs)))
    }

    /// Whether the task is still running past its deadline at `now`.
    pub fn is_overdue(&self, now: Timestamp) -> bool {
        self.status == TaskStatus::Running && self.deadline().is_some_and(|d| now > d)
    }

    /// Whether the scheduler may resubmit this task on its own.
    pub fn auto_retry_eligible(&self) -> bool {
        cronhub_core::status::auto_retry_eligible(
            self.status,
            self.retry_count,
            self.max_retry,
            self.retryable,
        )
    }
}

/// DTO for creating a task (ad-hoc submission or a scheduler firing).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTask {
    pub team_id: Option<DbId>,
    pub cronjob_id: Option<DbId>,
    pub workflow_id: Option<DbId>,
    /// Worker the task is addressed to, if any.
    pub worker_id: Option<WorkerId>,
    pub name: String,
    pub command: String,
    pub args: Option<serde_json::Value>,
    pub context: Option<serde_json::Value>,
    pub time_plan: Option<Timestamp>,
    pub timeout_secs: Option<i32>,
    pub max_retry: Option<i32>,
    pub retryable: Option<bool>,
    pub previous: Option<DbId>,
}

impl NewTask {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.trim().is_empty() {
            return Err(CoreError::Validation("Task name must not be empty".into()));
        }
        if self.name.len() > MAX_NAME_LEN {
            return Err(CoreError::Validation(format!(
                "Task name must be at most {MAX_NAME_LEN} characters"
            )));
        }
        if self.command.trim().is_empty() {
            return Err(CoreError::Validation("Task command must not be empty".into()));
        }
        if self.timeout_secs.is_some_and(|t| t < 0) {
            return Err(CoreError::Validation("timeout_secs must not be negative".into()));
        }
        if self.max_retry.is_some_and(|m| m < 0) {
            return Err(CoreError::Validation("max_retry must not be negative".into()));
        }
        Ok(())
    }
}

/// The worker-writable slice of a task, already filtered and truncated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskChange {
    pub status: Option<TaskStatus>,
    pub output: Option<String>,
    pub next: Option<DbId>,
    pub worker_id: Option<WorkerId>,
    pub worker_name: Option<String>,
}

/// Query parameters for `GET /api/v1/tasks`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskListQuery {
    pub status: Option<TaskStatus>,
    pub worker_id: Option<WorkerId>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}

impl TaskListQuery {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}
