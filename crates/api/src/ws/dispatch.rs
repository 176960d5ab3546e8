//! Outbound task pushes: frame encoding and the connect-time drip-feed.

use std::time::Duration;

use axum::extract::ws::Message;
use cronhub_core::framer::FrameBoundary;
use cronhub_core::protocol::{DispatchAction, ServerMessage};
use cronhub_core::types::{DbId, WorkerId};
use cronhub_db::models::task::Task;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

/// Serialize a server frame and wrap it in the session's boundary.
pub fn encode_frame<T: Serialize>(
    boundary: &FrameBoundary,
    action: DispatchAction,
    tasks: Vec<T>,
) -> Result<Message, serde_json::Error> {
    let payload = serde_json::to_vec(&ServerMessage::new(action, tasks))?;
    let framed = boundary.encode(&payload);
    Ok(Message::Text(String::from_utf8_lossy(&framed).into_owned().into()))
}

/// Whether a waiting task may be offered to `worker_id`.
fn addressed_to(task: &Task, worker_id: WorkerId) -> bool {
    task.worker_id.is_none_or(|id| id == worker_id)
}

/// Push every task waiting for dispatch to a freshly connected session.
///
/// Tasks go out in id order, `batch_size` per `run` frame, with `pause`
/// between batches. Stops early when `cancel` fires (the session closed) or
/// the session's channel is gone.
pub async fn drip_feed(
    state: AppState,
    session_id: String,
    worker_id: WorkerId,
    cancel: CancellationToken,
) {
    let protocol = &state.config.protocol;
    let boundary = protocol.boundary();
    let batch_size = protocol.dispatch_batch_size;
    let pause = protocol.dispatch_batch_pause;

    let mut after_id: DbId = 0;
    let mut sent = 0usize;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let page = match state
            .stores
            .tasks
            .list_awaiting_dispatch(after_id, batch_size as i64)
            .await
        {
            Ok(page) => page,
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "Failed to load pending tasks");
                break;
            }
        };
        let Some(last) = page.last() else {
            break;
        };
        after_id = last.id;
        let exhausted = page.len() < batch_size;

        let batch: Vec<&Task> = page.iter().filter(|t| addressed_to(t, worker_id)).collect();
        if !batch.is_empty() {
            let count = batch.len();
            let frame = match encode_frame(&boundary, DispatchAction::Run, batch) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::error!(session_id = %session_id, error = %e, "Failed to encode run frame");
                    break;
                }
            };
            if !state.sessions.send_to_session(&session_id, frame).await {
                break;
            }
            sent += count;
        }

        if exhausted {
            break;
        }
        if pause_or_cancel(pause, &cancel).await {
            break;
        }
    }

    tracing::debug!(session_id = %session_id, sent, "Drip-feed finished");
}

/// Sleep for `pause`; `true` if cancelled first.
async fn pause_or_cancel(pause: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(pause) => false,
    }
}
