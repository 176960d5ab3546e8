use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use cronhub_core::framer::Framer;
use cronhub_core::lock::parse_admission_key;
use cronhub_core::types::WorkerId;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::AppResult;
use crate::state::AppState;
use crate::ws::dispatch::drip_feed;
use crate::ws::protocol::FrameProcessor;

/// `?key=/ws/{worker_id}&value={token}` on the upgrade request.
#[derive(Debug, Deserialize)]
pub struct AdmissionQuery {
    pub key: String,
    pub value: String,
}

/// GET /api/v1/ws/task/
///
/// Consumes the admission lock (a successful `release` of `key` with token
/// `value`) before upgrading. Any failure answers with a plain HTTP error
/// and no upgrade.
pub async fn ws_task_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(admission): Query<AdmissionQuery>,
) -> AppResult<Response> {
    let worker_id = parse_admission_key(&admission.key)?;
    state
        .stores
        .locks
        .release(&admission.key, &admission.value)
        .await?;

    tracing::debug!(%worker_id, "Admission token consumed");
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, worker_id)))
}

/// Drive one dispatch connection until it closes.
///
/// Alongside the read loop this runs three tasks: a sender forwarding the
/// registry channel to the socket, a frame processor, and the drip-feed of
/// waiting tasks.
async fn handle_socket(socket: WebSocket, state: AppState, admitted: WorkerId) {
    let session_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(session_id = %session_id, worker_id = %admitted, "Worker connected");

    let mut outbound = state.sessions.add(session_id.clone()).await;
    let (mut sink, mut stream) = socket.split();

    let sender_session_id = session_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(session_id = %sender_session_id, "Worker sink closed");
                break;
            }
        }
    });

    let (frames_tx, frames_rx) = mpsc::channel(state.config.protocol.event_queue_depth);
    let processor = FrameProcessor::new(state.clone(), session_id.clone(), admitted);
    let process_task = tokio::spawn(processor.run(frames_rx));

    let feed_cancel = CancellationToken::new();
    let feed_task = tokio::spawn(drip_feed(
        state.clone(),
        session_id.clone(),
        admitted,
        feed_cancel.clone(),
    ));

    let mut framer = Framer::new(state.config.protocol.boundary());

    while let Some(result) = stream.next().await {
        let chunk = match result {
            Ok(Message::Text(text)) => bytes::Bytes::copy_from_slice(text.as_str().as_bytes()),
            Ok(Message::Binary(data)) => data,
            Ok(Message::Ping(_)) => {
                // The Pong reply is queued by the socket itself.
                on_liveness(&state, &session_id).await;
                continue;
            }
            Ok(Message::Pong(_)) => {
                on_liveness(&state, &session_id).await;
                continue;
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::debug!(session_id = %session_id, error = %e, "Worker receive error");
                break;
            }
        };

        let frames = match framer.push(&chunk) {
            Ok(frames) => frames,
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Dropping oversized frame");
                continue;
            }
        };
        for frame in frames {
            if frames_tx.send(frame).await.is_err() {
                break;
            }
        }
    }

    // Queued frames drain before the session goes, so a late
    // register_worker cannot outlive the mark-inactive below.
    feed_cancel.cancel();
    drop(framer);
    drop(frames_tx);
    let _ = process_task.await;
    let bound = state.sessions.remove(&session_id).await;
    let _ = feed_task.await;
    send_task.abort();

    if let Some(worker_id) = bound {
        let sessions = state.sessions.clone();
        let workers = state.stores.workers.clone();
        tokio::spawn(async move {
            // The worker may already be back on a newer session.
            if sessions.has_worker(worker_id).await {
                tracing::debug!(%worker_id, "Worker reconnected; keeping it active");
                return;
            }
            if let Err(e) = workers.mark_inactive(worker_id).await {
                tracing::warn!(%worker_id, error = %e, "Failed to mark worker inactive");
            }
        });
    }

    tracing::info!(session_id = %session_id, "Worker disconnected");
}

/// Refresh session and worker liveness without holding up the read loop.
async fn on_liveness(state: &AppState, session_id: &str) {
    state.sessions.touch(session_id).await;

    let Some(worker_id) = state.sessions.worker_for_session(session_id).await else {
        return;
    };
    let workers = state.stores.workers.clone();
    tokio::spawn(async move {
        if let Err(e) = workers.touch(worker_id).await {
            tracing::warn!(%worker_id, error = %e, "Failed to record worker liveness");
        }
    });
}
