//! Storage ports used by the API server.
//!
//! Each trait has a Postgres implementation ([`postgres`]) that delegates to
//! the static repos, and an in-memory one ([`memory`]) for single-process
//! runs and tests. [`Stores`] bundles one of each behind `Arc<dyn _>`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cronhub_core::api_keys::AuthOutcome;
use cronhub_core::lock::{Lock, LockCheck};
use cronhub_core::types::{DbId, WorkerId};

use crate::models::task::{NewTask, Task, TaskChange, TaskListQuery};
use crate::models::worker::{UpsertWorker, Worker};
use crate::{DbPool, StoreError};

pub mod memory;
pub mod postgres;

pub type StoreResult<T> = Result<T, StoreError>;

/// Lease-based mutual exclusion shared by every API instance.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Take `key` for `ttl` with a freshly minted token.
    ///
    /// Returns `None` while another unexpired lease exists. Never blocks.
    async fn try_acquire(&self, key: &str, ttl: Duration) -> StoreResult<Option<Lock>>;

    /// Delete the lease if `token` owns it.
    ///
    /// Fails with `LockNotOwned` when the token differs or the lease is gone.
    async fn release(&self, key: &str, token: &str) -> StoreResult<()>;

    /// Push the expiry out to now + `ttl`, keeping the token.
    ///
    /// Fails with `LockNotOwned` when someone else holds the key and with
    /// `LockExpired` when nobody does.
    async fn refresh(&self, key: &str, token: &str, ttl: Duration) -> StoreResult<Lock>;

    /// Inspect `key`, optionally comparing a presented token.
    async fn check(&self, key: &str, token: Option<&str>) -> StoreResult<LockCheck>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create(&self, input: &NewTask) -> StoreResult<Task>;

    async fn find_by_id(&self, id: DbId) -> StoreResult<Option<Task>>;

    async fn list(&self, params: &TaskListQuery) -> StoreResult<Vec<Task>>;

    /// Pending or retrying tasks with `id > after_id`, oldest first.
    async fn list_awaiting_dispatch(&self, after_id: DbId, limit: i64) -> StoreResult<Vec<Task>>;

    /// Apply a worker-reported change. `None` if missing or already finished.
    async fn apply_change(&self, id: DbId, change: &TaskChange) -> StoreResult<Option<Task>>;

    /// `pending` → `canceled`. `None` if missing or in any other status.
    async fn cancel_if_pending(&self, id: DbId) -> StoreResult<Option<Task>>;

    /// New pending task cloned from `original` with `retry_count + 1`.
    async fn create_retry(&self, original: &Task) -> StoreResult<Task>;
}

#[async_trait]
pub trait WorkerStore: Send + Sync {
    async fn upsert(&self, input: &UpsertWorker) -> StoreResult<Worker>;

    async fn find_by_id(&self, id: WorkerId) -> StoreResult<Option<Worker>>;

    async fn list(&self) -> StoreResult<Vec<Worker>>;

    /// Mark active and stamp `last_active`. `false` if unknown.
    async fn touch(&self, id: WorkerId) -> StoreResult<bool>;

    async fn mark_inactive(&self, id: WorkerId) -> StoreResult<bool>;
}

/// Verifies the API key a worker presents on each event.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn verify(&self, api_key: &str) -> StoreResult<AuthOutcome>;
}

/// One implementation of every store, shared through `AppState`.
#[derive(Clone)]
pub struct Stores {
    pub locks: Arc<dyn LockStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub workers: Arc<dyn WorkerStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pool: Option<DbPool>,
}

impl Stores {
    /// Postgres-backed stores sharing one pool.
    pub fn postgres(pool: DbPool) -> Self {
        Self {
            locks: Arc::new(postgres::PgLockStore::new(pool.clone())),
            tasks: Arc::new(postgres::PgTaskStore::new(pool.clone())),
            workers: Arc::new(postgres::PgWorkerStore::new(pool.clone())),
            credentials: Arc::new(postgres::PgCredentialStore::new(pool.clone())),
            pool: Some(pool),
        }
    }

    /// Process-local stores. Nothing survives a restart and locks are not
    /// shared with other instances.
    pub fn in_memory(credentials: Arc<memory::MemoryCredentialStore>) -> Self {
        Self {
            locks: Arc::new(memory::MemoryLockStore::default()),
            tasks: Arc::new(memory::MemoryTaskStore::default()),
            workers: Arc::new(memory::MemoryWorkerStore::default()),
            credentials,
            pool: None,
        }
    }

    /// The Postgres pool, when running against a database.
    pub fn pool(&self) -> Option<&DbPool> {
        self.pool.as_ref()
    }

    /// `true` when the backing store answers. Always `true` in memory.
    pub async fn is_healthy(&self) -> bool {
        match &self.pool {
            Some(pool) => crate::health_check(pool).await.is_ok(),
            None => true,
        }
    }
}
