#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Another owner holds an unexpired lease on the key.
    #[error("Lock '{key}' is held by another owner")]
    LockHeld { key: String },

    /// The presented token does not own the key (or the key is absent).
    #[error("Lock '{key}' is not owned by the presented token")]
    LockNotOwned { key: String },

    /// The lease the token referred to has already lapsed.
    #[error("Lock '{key}' has expired")]
    LockExpired { key: String },

    /// No live session exists for the worker a signal was addressed to.
    #[error("Worker {worker_id} has no live session")]
    WorkerUnreachable { worker_id: String },

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for a [`CoreError::NotFound`] keyed by anything displayable.
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        CoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}
