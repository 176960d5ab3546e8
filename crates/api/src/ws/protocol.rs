//! Per-session processing of decoded worker frames.
//!
//! The read loop hands complete frames to a [`FrameProcessor`] over a
//! bounded channel. One processor per session handles them strictly in
//! order; sessions never wait on each other. Nothing in here closes the
//! connection: bad frames, failed auth and store errors are logged and the
//! frame is dropped.

use bytes::Bytes;
use cronhub_core::api_keys::{extract_prefix, AuthOutcome, Principal};
use cronhub_core::protocol::{RegisterWorker, TaskUpdate, WorkerEvent};
use cronhub_core::types::WorkerId;
use tokio::sync::mpsc;

use crate::state::AppState;

pub struct FrameProcessor {
    state: AppState,
    session_id: String,
    /// Worker id named in the admission key.
    admitted: WorkerId,
}

impl FrameProcessor {
    pub fn new(state: AppState, session_id: String, admitted: WorkerId) -> Self {
        Self {
            state,
            session_id,
            admitted,
        }
    }

    /// Handle frames until the read loop drops its sender.
    pub async fn run(self, mut frames: mpsc::Receiver<Bytes>) {
        while let Some(frame) = frames.recv().await {
            self.handle_frame(&frame).await;
        }
        tracing::debug!(session_id = %self.session_id, "Frame processor stopped");
    }

    pub async fn handle_frame(&self, frame: &[u8]) {
        let event = match WorkerEvent::decode(frame) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(
                    session_id = %self.session_id,
                    error = %e,
                    len = frame.len(),
                    "Discarding malformed frame",
                );
                return;
            }
        };

        match event {
            WorkerEvent::RegisterWorker(reg) => self.on_register(reg).await,
            WorkerEvent::TaskUpdate(update) => self.on_task_update(update).await,
            WorkerEvent::Unrecognized { action } => {
                tracing::warn!(session_id = %self.session_id, action = %action, "Unrecognized action");
            }
        }
    }

    /// Verify the presented key. `None` means the frame must be dropped.
    async fn authenticate(&self, api_key: &str, action: &str) -> Option<Principal> {
        match self.state.stores.credentials.verify(api_key).await {
            Ok(AuthOutcome::Authenticated(principal)) => Some(principal),
            Ok(AuthOutcome::Rejected) => {
                tracing::warn!(
                    session_id = %self.session_id,
                    action,
                    key_prefix = extract_prefix(api_key),
                    "Rejected worker credential",
                );
                None
            }
            Err(e) => {
                tracing::error!(session_id = %self.session_id, action, error = %e, "Credential check failed");
                None
            }
        }
    }

    async fn on_register(&self, reg: RegisterWorker) {
        if reg.worker_id != self.admitted {
            tracing::warn!(
                session_id = %self.session_id,
                admitted = %self.admitted,
                worker_id = %reg.worker_id,
                "Worker id does not match admission key",
            );
            return;
        }
        let Some(principal) = self.authenticate(&reg.api_key, "register_worker").await else {
            return;
        };

        match self
            .state
            .engine
            .register_worker(&self.session_id, &principal, &reg)
            .await
        {
            Ok(worker) => tracing::info!(
                session_id = %self.session_id,
                worker_id = %worker.id,
                name = %worker.name,
                "Worker registered",
            ),
            Err(e) => tracing::warn!(
                session_id = %self.session_id,
                worker_id = %reg.worker_id,
                error = %e,
                "Worker registration failed",
            ),
        }
    }

    async fn on_task_update(&self, update: TaskUpdate) {
        let Some(principal) = self.authenticate(&update.api_key, "task_update").await else {
            return;
        };

        match self.state.engine.apply_update(&principal, &update).await {
            Ok(task) => tracing::debug!(
                session_id = %self.session_id,
                task_id = task.id,
                status = %task.status,
                "Task updated",
            ),
            Err(e) => tracing::warn!(
                session_id = %self.session_id,
                task_id = update.task_id,
                error = %e,
                "Task update rejected",
            ),
        }
    }
}
