//! Process-local stores.
//!
//! Used when no `DATABASE_URL` is configured and by the test suites. Every
//! operation that reads and then writes does so under a single guard, which
//! gives the same atomicity the conditional SQL statements give the
//! Postgres stores. Lease deadlines use `tokio::time::Instant` so tests can
//! drive expiry with a paused clock.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use cronhub_core::api_keys::{generate_api_key, hash_api_key, AuthOutcome, Principal};
use cronhub_core::error::CoreError;
use cronhub_core::lock::{generate_token, Lock, LockCheck};
use cronhub_core::status::stamps_for;
use cronhub_core::types::{DbId, WorkerId};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use super::{CredentialStore, LockStore, StoreResult, TaskStore, WorkerStore};
use crate::models::status::TaskStatus;
use crate::models::task::{NewTask, Task, TaskChange, TaskListQuery};
use crate::models::worker::{default_worker_name, merge_metadata, UpsertWorker, Worker};

// ---------------------------------------------------------------------------
// Locks
// ---------------------------------------------------------------------------

struct Lease {
    token: String,
    deadline: Instant,
    expires_at: cronhub_core::types::Timestamp,
}

impl Lease {
    fn new(token: String, ttl: Duration) -> Self {
        Self {
            token,
            deadline: Instant::now() + ttl,
            expires_at: Utc::now() + ttl,
        }
    }

    fn is_live(&self) -> bool {
        Instant::now() < self.deadline
    }

    fn to_lock(&self, key: &str) -> Lock {
        Lock {
            key: key.to_string(),
            token: self.token.clone(),
            expires_at: self.expires_at,
        }
    }
}

#[derive(Default)]
pub struct MemoryLockStore {
    leases: Mutex<HashMap<String, Lease>>,
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> StoreResult<Option<Lock>> {
        let mut leases = self.leases.lock().await;
        if leases.get(key).is_some_and(Lease::is_live) {
            return Ok(None);
        }
        let lease = Lease::new(generate_token(), ttl);
        let lock = lease.to_lock(key);
        leases.insert(key.to_string(), lease);
        Ok(Some(lock))
    }

    async fn release(&self, key: &str, token: &str) -> StoreResult<()> {
        let mut leases = self.leases.lock().await;
        match leases.get(key) {
            Some(lease) if lease.is_live() && lease.token == token => {
                leases.remove(key);
                Ok(())
            }
            _ => Err(CoreError::LockNotOwned { key: key.to_string() }.into()),
        }
    }

    async fn refresh(&self, key: &str, token: &str, ttl: Duration) -> StoreResult<Lock> {
        let mut leases = self.leases.lock().await;
        let key_owned = key.to_string();
        match leases.get_mut(key) {
            Some(lease) if lease.is_live() => {
                if lease.token != token {
                    return Err(CoreError::LockNotOwned { key: key_owned }.into());
                }
                *lease = Lease::new(lease.token.clone(), ttl);
                Ok(lease.to_lock(key))
            }
            _ => Err(CoreError::LockExpired { key: key_owned }.into()),
        }
    }

    async fn check(&self, key: &str, token: Option<&str>) -> StoreResult<LockCheck> {
        let leases = self.leases.lock().await;
        let current = leases
            .get(key)
            .filter(|lease| lease.is_live())
            .map(|lease| lease.token.clone());
        Ok(LockCheck::from_current(current, token))
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TaskTable {
    last_id: DbId,
    rows: BTreeMap<DbId, Task>,
}

impl TaskTable {
    fn next_id(&mut self) -> DbId {
        self.last_id += 1;
        self.last_id
    }
}

#[derive(Default)]
pub struct MemoryTaskStore {
    table: Mutex<TaskTable>,
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn create(&self, input: &NewTask) -> StoreResult<Task> {
        let mut table = self.table.lock().await;
        let now = Utc::now();
        let task = Task {
            id: table.next_id(),
            team_id: input.team_id,
            cronjob_id: input.cronjob_id,
            workflow_id: input.workflow_id,
            worker_id: input.worker_id,
            worker_name: None,
            name: input.name.clone(),
            command: input.command.clone(),
            args: input.args.clone().unwrap_or_else(|| serde_json::json!([])),
            context: input.context.clone().unwrap_or_else(|| serde_json::json!({})),
            status: TaskStatus::Pending,
            time_plan: input.time_plan.unwrap_or(now),
            time_start: None,
            time_end: None,
            timeout_secs: input.timeout_secs.unwrap_or(0),
            retry_count: 0,
            max_retry: input.max_retry.unwrap_or(0),
            retryable: input.retryable,
            retry_of: None,
            output: String::new(),
            previous: input.previous,
            next: None,
            created_at: now,
            updated_at: now,
        };
        table.rows.insert(task.id, task.clone());
        Ok(task)
    }

    async fn find_by_id(&self, id: DbId) -> StoreResult<Option<Task>> {
        Ok(self.table.lock().await.rows.get(&id).cloned())
    }

    async fn list(&self, params: &TaskListQuery) -> StoreResult<Vec<Task>> {
        let table = self.table.lock().await;
        let tasks = table
            .rows
            .values()
            .rev()
            .filter(|t| params.status.is_none_or(|s| t.status == s))
            .filter(|t| params.worker_id.is_none_or(|w| t.worker_id == Some(w)))
            .skip(params.offset() as usize)
            .take(params.limit() as usize)
            .cloned()
            .collect();
        Ok(tasks)
    }

    async fn list_awaiting_dispatch(&self, after_id: DbId, limit: i64) -> StoreResult<Vec<Task>> {
        let table = self.table.lock().await;
        let tasks = table
            .rows
            .range(after_id + 1..)
            .map(|(_, t)| t)
            .filter(|t| t.status.is_awaiting_dispatch() && t.time_end.is_none())
            .take(limit.max(0) as usize)
            .cloned()
            .collect();
        Ok(tasks)
    }

    async fn apply_change(&self, id: DbId, change: &TaskChange) -> StoreResult<Option<Task>> {
        let mut table = self.table.lock().await;
        let Some(task) = table.rows.get_mut(&id) else {
            return Ok(None);
        };
        if task.is_finished() {
            return Ok(None);
        }

        let now = Utc::now();
        if let Some(status) = change.status {
            let stamps = stamps_for(status, task.time_start.is_some(), task.time_end.is_some());
            if stamps.start {
                task.time_start = Some(now);
            }
            if stamps.end {
                task.time_end = Some(now);
            }
            task.status = status;
        }
        if let Some(output) = &change.output {
            task.output = output.clone();
        }
        if let Some(next) = change.next {
            task.next = Some(next);
        }
        if let Some(worker_id) = change.worker_id {
            task.worker_id = Some(worker_id);
        }
        if let Some(worker_name) = &change.worker_name {
            task.worker_name = Some(worker_name.clone());
        }
        task.updated_at = now;
        Ok(Some(task.clone()))
    }

    async fn cancel_if_pending(&self, id: DbId) -> StoreResult<Option<Task>> {
        let mut table = self.table.lock().await;
        match table.rows.get_mut(&id) {
            Some(task) if task.status == TaskStatus::Pending && !task.is_finished() => {
                let now = Utc::now();
                task.status = TaskStatus::Canceled;
                task.time_end = Some(now);
                task.updated_at = now;
                Ok(Some(task.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn create_retry(&self, original: &Task) -> StoreResult<Task> {
        let mut table = self.table.lock().await;
        let now = Utc::now();
        let task = Task {
            id: table.next_id(),
            worker_name: None,
            status: TaskStatus::Pending,
            time_plan: now,
            time_start: None,
            time_end: None,
            retry_count: original.retry_count + 1,
            retry_of: Some(original.id),
            output: String::new(),
            next: None,
            created_at: now,
            updated_at: now,
            ..original.clone()
        };
        table.rows.insert(task.id, task.clone());
        Ok(task)
    }
}

// ---------------------------------------------------------------------------
// Workers
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryWorkerStore {
    workers: RwLock<HashMap<WorkerId, Worker>>,
}

#[async_trait]
impl WorkerStore for MemoryWorkerStore {
    async fn upsert(&self, input: &UpsertWorker) -> StoreResult<Worker> {
        let mut workers = self.workers.write().await;
        let now = Utc::now();
        let activated = input.is_active == Some(true);

        let worker = match workers.get_mut(&input.id) {
            Some(existing) => {
                if let Some(team_id) = input.team_id {
                    existing.team_id = Some(team_id);
                }
                if let Some(name) = &input.name {
                    existing.name = name.clone();
                }
                if let Some(description) = &input.description {
                    existing.description = description.clone();
                }
                if let Some(metadata) = &input.metadata {
                    existing.metadata = merge_metadata(&existing.metadata, metadata);
                }
                if let Some(is_active) = input.is_active {
                    existing.is_active = is_active;
                }
                if activated {
                    existing.last_active = Some(now);
                }
                existing.updated_at = now;
                existing.clone()
            }
            None => {
                let worker = Worker {
                    id: input.id,
                    team_id: input.team_id,
                    name: input
                        .name
                        .clone()
                        .unwrap_or_else(|| default_worker_name(input.id)),
                    description: input.description.clone().unwrap_or_default(),
                    is_active: activated,
                    last_active: activated.then_some(now),
                    metadata: input
                        .metadata
                        .clone()
                        .unwrap_or_else(|| serde_json::json!({})),
                    created_at: now,
                    updated_at: now,
                };
                workers.insert(worker.id, worker.clone());
                worker
            }
        };
        Ok(worker)
    }

    async fn find_by_id(&self, id: WorkerId) -> StoreResult<Option<Worker>> {
        Ok(self.workers.read().await.get(&id).cloned())
    }

    async fn list(&self) -> StoreResult<Vec<Worker>> {
        let mut workers: Vec<Worker> = self.workers.read().await.values().cloned().collect();
        workers.sort_by(|a, b| {
            b.last_active
                .cmp(&a.last_active)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(workers)
    }

    async fn touch(&self, id: WorkerId) -> StoreResult<bool> {
        let mut workers = self.workers.write().await;
        let Some(worker) = workers.get_mut(&id) else {
            return Ok(false);
        };
        let now = Utc::now();
        worker.is_active = true;
        worker.last_active = Some(now);
        worker.updated_at = now;
        Ok(true)
    }

    async fn mark_inactive(&self, id: WorkerId) -> StoreResult<bool> {
        let mut workers = self.workers.write().await;
        let Some(worker) = workers.get_mut(&id) else {
            return Ok(false);
        };
        worker.is_active = false;
        worker.updated_at = Utc::now();
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// API keys held as digests, like the `api_keys` table.
#[derive(Default)]
pub struct MemoryCredentialStore {
    keys: RwLock<HashMap<String, Principal>>,
}

impl MemoryCredentialStore {
    /// Seed the store with known plaintext keys, each valid for every team.
    pub fn with_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys = keys
            .into_iter()
            .zip(1..)
            .map(|(key, id)| {
                let principal = Principal {
                    api_key_id: id,
                    team_id: None,
                };
                (hash_api_key(key.as_ref()), principal)
            })
            .collect();
        Self {
            keys: RwLock::new(keys),
        }
    }

    /// Mint a new key scoped to `team_id` and return its plaintext.
    pub async fn issue(&self, team_id: Option<DbId>) -> String {
        let generated = generate_api_key();
        let mut keys = self.keys.write().await;
        let principal = Principal {
            api_key_id: keys.len() as DbId + 1,
            team_id,
        };
        keys.insert(generated.hash, principal);
        generated.plaintext
    }

    /// Number of registered keys.
    pub async fn key_count(&self) -> usize {
        self.keys.read().await.len()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn verify(&self, api_key: &str) -> StoreResult<AuthOutcome> {
        let keys = self.keys.read().await;
        let outcome = match keys.get(&hash_api_key(api_key)) {
            Some(principal) => AuthOutcome::Authenticated(principal.clone()),
            None => AuthOutcome::Rejected,
        };
        Ok(outcome)
    }
}
