mod api_key_repo;
mod lock_repo;
mod task_repo;
mod worker_repo;

pub use api_key_repo::ApiKeyRepo;
pub use lock_repo::LockRepo;
pub use task_repo::TaskRepo;
pub use worker_repo::WorkerRepo;
