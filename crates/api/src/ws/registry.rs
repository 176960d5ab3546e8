use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::ws::Message;
use chrono::Utc;
use cronhub_core::types::{Timestamp, WorkerId};
use cronhub_db::models::worker::Worker;
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};

/// Channel sender half for pushing messages to a dispatch connection.
pub type SessionSender = mpsc::UnboundedSender<Message>;

/// One live dispatch connection.
pub struct WorkerSession {
    /// Channel sender for outbound messages to this connection.
    pub sender: SessionSender,
    /// The worker this connection registered as, once it has.
    pub worker: Option<Worker>,
    pub connected_at: Timestamp,
    /// Last inbound liveness signal (ping or pong).
    pub last_seen: Timestamp,
}

/// Snapshot row returned by [`SessionRegistry::get_workers`].
#[derive(Debug, Clone, Serialize)]
pub struct LiveWorker {
    pub session_id: String,
    pub worker: Worker,
    pub connected_at: Timestamp,
    pub last_seen: Timestamp,
}

/// Process-local index of live worker sessions.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared across the application. The registry owns each session's outbound
/// sender; dropping the entry closes the channel and ends the sender task.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, WorkerSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new connection and return the receiver for its outbound
    /// messages.
    pub async fn add(&self, session_id: String) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let now = Utc::now();
        let session = WorkerSession {
            sender: tx,
            worker: None,
            connected_at: now,
            last_seen: now,
        };
        self.sessions.write().await.insert(session_id, session);
        rx
    }

    /// Drop a session. Returns the worker it was bound to, if any.
    ///
    /// Removing an unknown id is a no-op.
    pub async fn remove(&self, session_id: &str) -> Option<WorkerId> {
        self.sessions
            .write()
            .await
            .remove(session_id)
            .and_then(|session| session.worker.map(|w| w.id))
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Bind (or rebind) a session to a worker. `false` if the session is gone.
    pub async fn register_worker(&self, session_id: &str, worker: Worker) -> bool {
        match self.sessions.write().await.get_mut(session_id) {
            Some(session) => {
                session.worker = Some(worker);
                true
            }
            None => false,
        }
    }

    pub async fn worker_for_session(&self, session_id: &str) -> Option<WorkerId> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .and_then(|s| s.worker.as_ref().map(|w| w.id))
    }

    /// Copy of every registered worker with its session details.
    pub async fn get_workers(&self) -> Vec<LiveWorker> {
        self.sessions
            .read()
            .await
            .iter()
            .filter_map(|(id, session)| {
                session.worker.as_ref().map(|worker| LiveWorker {
                    session_id: id.clone(),
                    worker: worker.clone(),
                    connected_at: session.connected_at,
                    last_seen: session.last_seen,
                })
            })
            .collect()
    }

    /// Whether some live session is registered as `worker_id`.
    pub async fn has_worker(&self, worker_id: WorkerId) -> bool {
        self.sessions
            .read()
            .await
            .values()
            .any(|s| s.worker.as_ref().is_some_and(|w| w.id == worker_id))
    }

    /// Record a liveness signal on the session.
    pub async fn touch(&self, session_id: &str) {
        if let Some(session) = self.sessions.write().await.get_mut(session_id) {
            session.last_seen = Utc::now();
        }
    }

    /// Queue a message on one session. `false` if it is gone or closed.
    pub async fn send_to_session(&self, session_id: &str, message: Message) -> bool {
        self.sessions
            .read()
            .await
            .get(session_id)
            .is_some_and(|s| s.sender.send(message).is_ok())
    }

    /// Queue a message on the first live session bound to `worker_id`.
    ///
    /// Returns `false` when the worker has no live session.
    pub async fn send_to_worker(&self, worker_id: WorkerId, message: Message) -> bool {
        let sessions = self.sessions.read().await;
        sessions
            .values()
            .filter(|s| s.worker.as_ref().is_some_and(|w| w.id == worker_id))
            .any(|s| s.sender.send(message.clone()).is_ok())
    }

    /// Send a Ping frame to every session.
    pub async fn ping_all(&self) {
        let sessions = self.sessions.read().await;
        for session in sessions.values() {
            let _ = session.sender.send(Message::Ping(Bytes::new()));
        }
    }

    /// Send a Close frame to every session, then clear the map.
    pub async fn shutdown_all(&self) {
        let mut sessions = self.sessions.write().await;
        let count = sessions.len();
        for session in sessions.values() {
            let _ = session.sender.send(Message::Close(None));
        }
        sessions.clear();
        tracing::info!(count, "Closed all worker sessions");
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
