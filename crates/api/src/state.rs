use std::sync::Arc;

use cronhub_db::Stores;

use crate::config::ServerConfig;
use crate::engine::TaskEngine;
use crate::ws::SessionRegistry;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Lock, task, worker and credential stores.
    pub stores: Stores,
    pub config: Arc<ServerConfig>,
    /// Live worker dispatch sessions.
    pub sessions: Arc<SessionRegistry>,
    /// Task lifecycle operations shared by HTTP handlers and sessions.
    pub engine: Arc<TaskEngine>,
}

impl AppState {
    pub fn new(stores: Stores, config: ServerConfig, sessions: Arc<SessionRegistry>) -> Self {
        let engine = TaskEngine::new(stores.clone(), Arc::clone(&sessions), &config.protocol);
        Self {
            stores,
            config: Arc::new(config),
            sessions,
            engine: Arc::new(engine),
        }
    }
}
