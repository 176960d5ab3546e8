//! Task lifecycle operations.
//!
//! Every task mutation, whether it comes from an HTTP request or a worker
//! frame, goes through [`TaskEngine`]. Cancel and the `pending → running`
//! claim both run under the `task:{id}` lock so they exclude each other
//! across API instances.

use std::sync::Arc;
use std::time::Duration;

use cronhub_core::api_keys::Principal;
use cronhub_core::error::CoreError;
use cronhub_core::framer::FrameBoundary;
use cronhub_core::lock::{task_key, Lock};
use cronhub_core::protocol::{
    truncate_output, DispatchAction, RegisterWorker, TaskUpdate, TaskUpdateData, MAX_OUTPUT_BYTES,
};
use cronhub_core::types::{DbId, WorkerId};
use cronhub_db::models::status::TaskStatus;
use cronhub_db::models::task::{NewTask, Task, TaskChange};
use cronhub_db::models::worker::{UpsertWorker, Worker};
use cronhub_db::store::StoreResult;
use cronhub_db::Stores;
use serde::Serialize;

use crate::config::WorkerProtocolConfig;
use crate::ws::dispatch::encode_frame;
use crate::ws::SessionRegistry;

/// What was sent to a worker by a stop or kill request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopInstruction {
    pub task_id: DbId,
    pub worker_id: WorkerId,
    pub action: DispatchAction,
}

pub struct TaskEngine {
    stores: Stores,
    sessions: Arc<SessionRegistry>,
    boundary: FrameBoundary,
    task_lock_ttl: Duration,
}

impl TaskEngine {
    pub fn new(stores: Stores, sessions: Arc<SessionRegistry>, config: &WorkerProtocolConfig) -> Self {
        Self {
            stores,
            sessions,
            boundary: config.boundary(),
            task_lock_ttl: config.task_lock_ttl,
        }
    }

    async fn find(&self, id: DbId) -> StoreResult<Task> {
        self.stores
            .tasks
            .find_by_id(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Task", id).into())
    }

    /// Run `op` while holding the `task:{id}` lock.
    ///
    /// Fails with `LockHeld` if another holder has it. The lock is released
    /// whatever `op` returns; a failed release only logs, the TTL cleans up.
    async fn with_task_lock<T, F>(&self, id: DbId, op: F) -> StoreResult<T>
    where
        F: std::future::Future<Output = StoreResult<T>>,
    {
        let key = task_key(id);
        let lock: Lock = self
            .stores
            .locks
            .try_acquire(&key, self.task_lock_ttl)
            .await?
            .ok_or_else(|| CoreError::LockHeld { key: key.clone() })?;

        let result = op.await;

        if let Err(e) = self.stores.locks.release(&lock.key, &lock.token).await {
            tracing::warn!(task_id = id, error = %e, "Failed to release task lock");
        }
        result
    }

    // -----------------------------------------------------------------------
    // Operator actions
    // -----------------------------------------------------------------------

    /// Create a pending task and push it straight away if it names a worker
    /// with a live session.
    pub async fn submit(&self, input: &NewTask) -> StoreResult<Task> {
        input.validate()?;
        let task = self.stores.tasks.create(input).await?;

        if let Some(worker_id) = task.worker_id {
            let frame = encode_frame(&self.boundary, DispatchAction::Run, vec![&task])
                .map_err(|e| CoreError::Internal(format!("Failed to encode run frame: {e}")))?;
            let pushed = self.sessions.send_to_worker(worker_id, frame).await;
            tracing::debug!(task_id = task.id, %worker_id, pushed, "Submitted task for worker");
        }
        Ok(task)
    }

    /// Cancel a pending task.
    pub async fn cancel(&self, id: DbId) -> StoreResult<Task> {
        self.find(id).await?;

        let canceled = self
            .with_task_lock(id, self.stores.tasks.cancel_if_pending(id))
            .await?;

        match canceled {
            Some(task) => {
                tracing::info!(task_id = id, "Task canceled");
                Ok(task)
            }
            None => {
                let current = self.find(id).await?;
                Err(CoreError::InvalidTransition(format!(
                    "Task {id} is {}; only pending tasks can be canceled",
                    current.status
                ))
                .into())
            }
        }
    }

    /// Ask the worker running a task to stop it (`force` kills it).
    ///
    /// The task record is left alone; the worker reports the outcome with a
    /// `task_update`.
    pub async fn stop(&self, id: DbId, force: bool) -> StoreResult<StopInstruction> {
        let task = self.find(id).await?;
        if task.status != TaskStatus::Running {
            return Err(CoreError::InvalidTransition(format!(
                "Task {id} is {}; only running tasks can be stopped",
                task.status
            ))
            .into());
        }
        let worker_id = task.worker_id.ok_or_else(|| {
            CoreError::InvalidTransition(format!("Task {id} has no bound worker"))
        })?;

        let action = DispatchAction::for_stop(force);
        let frame = encode_frame(&self.boundary, action, vec![&task])
            .map_err(|e| CoreError::Internal(format!("Failed to encode {action:?} frame: {e}")))?;

        if !self.sessions.send_to_worker(worker_id, frame).await {
            return Err(CoreError::WorkerUnreachable {
                worker_id: worker_id.to_string(),
            }
            .into());
        }

        tracing::info!(task_id = id, %worker_id, ?action, "Stop signal sent");
        Ok(StopInstruction {
            task_id: id,
            worker_id,
            action,
        })
    }

    /// Create a new pending task from a finished one.
    pub async fn retry(&self, id: DbId) -> StoreResult<Task> {
        let original = self.find(id).await?;
        if !original.status.is_terminal() {
            return Err(CoreError::InvalidTransition(format!(
                "Task {id} is {}; only finished tasks can be retried",
                original.status
            ))
            .into());
        }

        let retry = self.stores.tasks.create_retry(&original).await?;
        tracing::info!(
            original_task_id = id,
            new_task_id = retry.id,
            retry_count = retry.retry_count,
            "Task retried",
        );
        Ok(retry)
    }

    // -----------------------------------------------------------------------
    // Worker events
    // -----------------------------------------------------------------------

    /// Upsert the registering worker and bind it to its session.
    pub async fn register_worker(
        &self,
        session_id: &str,
        principal: &Principal,
        event: &RegisterWorker,
    ) -> StoreResult<Worker> {
        if !principal.permits_team(event.team_id) {
            return Err(CoreError::Unauthorized(format!(
                "API key may not register workers for team {:?}",
                event.team_id
            ))
            .into());
        }

        let profile = &event.data;
        let input = UpsertWorker {
            id: event.worker_id,
            team_id: event.team_id.or(principal.team_id),
            name: profile.name.clone().filter(|n| !n.trim().is_empty()),
            description: profile.description.clone(),
            metadata: profile.metadata.clone(),
            is_active: Some(true),
        };
        let worker = self.stores.workers.upsert(&input).await?;
        self.sessions.register_worker(session_id, worker.clone()).await;
        Ok(worker)
    }

    /// Apply a worker's status report.
    ///
    /// Rejects updates to finished tasks and to tasks outside the key's
    /// team. Only whitelisted fields are written.
    pub async fn apply_update(&self, principal: &Principal, update: &TaskUpdate) -> StoreResult<Task> {
        let id = update.task_id;
        let task = self.find(id).await?;

        if !principal.permits_team(task.team_id) {
            return Err(CoreError::Unauthorized(format!(
                "API key may not update task {id}"
            ))
            .into());
        }
        if task.is_finished() {
            return Err(CoreError::InvalidTransition(format!(
                "Task {id} already finished as {}",
                task.status
            ))
            .into());
        }

        let change = change_from(&update.data);
        let claiming = task.status == TaskStatus::Pending && change.status == Some(TaskStatus::Running);

        let applied = if claiming {
            self.with_task_lock(id, self.stores.tasks.apply_change(id, &change))
                .await?
        } else {
            self.stores.tasks.apply_change(id, &change).await?
        };

        applied.ok_or_else(|| {
            CoreError::InvalidTransition(format!("Task {id} finished before the update applied"))
                .into()
        })
    }
}

/// Reduce a worker payload to the writable fields, truncating output.
fn change_from(data: &TaskUpdateData) -> TaskChange {
    TaskChange {
        status: data.status,
        output: data
            .output
            .as_deref()
            .map(|o| truncate_output(o, MAX_OUTPUT_BYTES).to_owned()),
        next: data.next,
        worker_id: data.worker_id,
        worker_name: data.worker_name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_keeps_only_whitelisted_fields_and_truncates() {
        let data = TaskUpdateData {
            status: Some(TaskStatus::Success),
            output: Some("é".repeat(MAX_OUTPUT_BYTES)),
            next: Some(9),
            worker_id: None,
            worker_name: Some("w1".into()),
        };
        let change = change_from(&data);

        assert_eq!(change.status, Some(TaskStatus::Success));
        let output = change.output.unwrap();
        assert!(output.len() <= MAX_OUTPUT_BYTES);
        assert!(output.chars().all(|c| c == 'é'));
        assert_eq!(change.next, Some(9));
        assert_eq!(change.worker_name.as_deref(), Some("w1"));
    }
}
