//! Store implementations over the static repos.

use std::time::Duration;

use async_trait::async_trait;
use cronhub_core::api_keys::{hash_api_key, AuthOutcome};
use cronhub_core::error::CoreError;
use cronhub_core::lock::{generate_token, Lock, LockCheck};
use cronhub_core::types::{DbId, WorkerId};

use super::{CredentialStore, LockStore, StoreResult, TaskStore, WorkerStore};
use crate::models::task::{NewTask, Task, TaskChange, TaskListQuery};
use crate::models::worker::{UpsertWorker, Worker};
use crate::repositories::{ApiKeyRepo, LockRepo, TaskRepo, WorkerRepo};
use crate::DbPool;

pub struct PgLockStore {
    pool: DbPool,
}

impl PgLockStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LockStore for PgLockStore {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> StoreResult<Option<Lock>> {
        let token = generate_token();
        let row = LockRepo::try_acquire(&self.pool, key, &token, ttl).await?;
        Ok(row.map(Lock::from))
    }

    async fn release(&self, key: &str, token: &str) -> StoreResult<()> {
        if LockRepo::release(&self.pool, key, token).await? {
            Ok(())
        } else {
            Err(CoreError::LockNotOwned { key: key.to_string() }.into())
        }
    }

    async fn refresh(&self, key: &str, token: &str, ttl: Duration) -> StoreResult<Lock> {
        if let Some(row) = LockRepo::refresh(&self.pool, key, token, ttl).await? {
            return Ok(row.into());
        }
        // The conditional update missed; find out why.
        let key = key.to_string();
        match LockRepo::find_live(&self.pool, &key).await? {
            Some(_) => Err(CoreError::LockNotOwned { key }.into()),
            None => Err(CoreError::LockExpired { key }.into()),
        }
    }

    async fn check(&self, key: &str, token: Option<&str>) -> StoreResult<LockCheck> {
        let current = LockRepo::find_live(&self.pool, key).await?;
        Ok(LockCheck::from_current(current.map(|row| row.token), token))
    }
}

pub struct PgTaskStore {
    pool: DbPool,
}

impl PgTaskStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn create(&self, input: &NewTask) -> StoreResult<Task> {
        Ok(TaskRepo::create(&self.pool, input).await?)
    }

    async fn find_by_id(&self, id: DbId) -> StoreResult<Option<Task>> {
        Ok(TaskRepo::find_by_id(&self.pool, id).await?)
    }

    async fn list(&self, params: &TaskListQuery) -> StoreResult<Vec<Task>> {
        Ok(TaskRepo::list(&self.pool, params).await?)
    }

    async fn list_awaiting_dispatch(&self, after_id: DbId, limit: i64) -> StoreResult<Vec<Task>> {
        Ok(TaskRepo::list_awaiting_dispatch(&self.pool, after_id, limit).await?)
    }

    async fn apply_change(&self, id: DbId, change: &TaskChange) -> StoreResult<Option<Task>> {
        Ok(TaskRepo::apply_change(&self.pool, id, change).await?)
    }

    async fn cancel_if_pending(&self, id: DbId) -> StoreResult<Option<Task>> {
        Ok(TaskRepo::cancel_if_pending(&self.pool, id).await?)
    }

    async fn create_retry(&self, original: &Task) -> StoreResult<Task> {
        Ok(TaskRepo::create_retry(&self.pool, original).await?)
    }
}

pub struct PgWorkerStore {
    pool: DbPool,
}

impl PgWorkerStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkerStore for PgWorkerStore {
    async fn upsert(&self, input: &UpsertWorker) -> StoreResult<Worker> {
        Ok(WorkerRepo::upsert(&self.pool, input).await?)
    }

    async fn find_by_id(&self, id: WorkerId) -> StoreResult<Option<Worker>> {
        Ok(WorkerRepo::find_by_id(&self.pool, id).await?)
    }

    async fn list(&self) -> StoreResult<Vec<Worker>> {
        Ok(WorkerRepo::list(&self.pool).await?)
    }

    async fn touch(&self, id: WorkerId) -> StoreResult<bool> {
        Ok(WorkerRepo::touch(&self.pool, id).await?)
    }

    async fn mark_inactive(&self, id: WorkerId) -> StoreResult<bool> {
        Ok(WorkerRepo::mark_inactive(&self.pool, id).await?)
    }
}

pub struct PgCredentialStore {
    pool: DbPool,
}

impl PgCredentialStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn verify(&self, api_key: &str) -> StoreResult<AuthOutcome> {
        let hash = hash_api_key(api_key);
        let outcome = match ApiKeyRepo::find_active_by_hash(&self.pool, &hash).await? {
            Some(key) => AuthOutcome::Authenticated(key.principal()),
            None => AuthOutcome::Rejected,
        };
        Ok(outcome)
    }
}
