//! Worker wire protocol: the JSON documents exchanged over a dispatch
//! connection once the framer has isolated them.
//!
//! Inbound frames carry an `action` discriminator:
//!
//! ```text
//! {"action":"register_worker","worker_id":"<uuid>","api_key":"..","team_id":7,"data":{..}}
//! {"action":"task_update","task_id":42,"api_key":"..","data":{"status":"running",..}}
//! ```
//!
//! Outbound frames carry `action: run|stop|kill` and a list of tasks.

use serde::{Deserialize, Serialize};

use crate::status::TaskStatus;
use crate::types::{DbId, WorkerId};

/// Longest task output kept from a single update (64 KiB).
pub const MAX_OUTPUT_BYTES: usize = 64 * 1024;

pub const ACTION_REGISTER_WORKER: &str = "register_worker";
pub const ACTION_TASK_UPDATE: &str = "task_update";

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    RegisterWorker(RegisterWorker),
    TaskUpdate(TaskUpdate),
    /// A well-formed frame whose `action` this server does not handle.
    Unrecognized { action: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RegisterWorker {
    pub worker_id: WorkerId,
    pub api_key: String,
    pub team_id: Option<DbId>,
    #[serde(default)]
    pub data: WorkerProfile,
}

/// Self-description a worker sends when registering.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WorkerProfile {
    pub name: Option<String>,
    pub description: Option<String>,
    /// Merged key-by-key into the stored metadata object.
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskUpdate {
    pub task_id: DbId,
    pub api_key: String,
    #[serde(default)]
    pub data: TaskUpdateData,
}

/// The only task fields a worker is allowed to change. Anything else in the
/// payload is ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TaskUpdateData {
    pub status: Option<TaskStatus>,
    pub output: Option<String>,
    pub next: Option<DbId>,
    pub worker_id: Option<WorkerId>,
    pub worker_name: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Frame is not valid JSON: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("Frame has no string 'action' field")]
    MissingAction,

    #[error("Invalid '{action}' payload: {source}")]
    InvalidPayload {
        action: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl WorkerEvent {
    /// Decode one complete frame.
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let value: serde_json::Value =
            serde_json::from_slice(frame).map_err(ProtocolError::Malformed)?;

        let action = value
            .get("action")
            .and_then(|a| a.as_str())
            .ok_or(ProtocolError::MissingAction)?
            .to_owned();

        match action.as_str() {
            ACTION_REGISTER_WORKER => serde_json::from_value(value)
                .map(WorkerEvent::RegisterWorker)
                .map_err(|source| ProtocolError::InvalidPayload {
                    action: ACTION_REGISTER_WORKER,
                    source,
                }),
            ACTION_TASK_UPDATE => serde_json::from_value(value)
                .map(WorkerEvent::TaskUpdate)
                .map_err(|source| ProtocolError::InvalidPayload {
                    action: ACTION_TASK_UPDATE,
                    source,
                }),
            _ => Ok(WorkerEvent::Unrecognized { action }),
        }
    }

    /// The `action` string, for logging.
    pub fn action(&self) -> &str {
        match self {
            WorkerEvent::RegisterWorker(_) => ACTION_REGISTER_WORKER,
            WorkerEvent::TaskUpdate(_) => ACTION_TASK_UPDATE,
            WorkerEvent::Unrecognized { action } => action,
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Instruction pushed to a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchAction {
    Run,
    /// Graceful stop.
    Stop,
    /// Forced termination.
    Kill,
}

impl DispatchAction {
    pub fn for_stop(force: bool) -> Self {
        if force {
            DispatchAction::Kill
        } else {
            DispatchAction::Stop
        }
    }
}

/// Server-to-worker frame.
#[derive(Debug, Clone, Serialize)]
pub struct ServerMessage<T: Serialize> {
    pub action: DispatchAction,
    pub tasks: Vec<T>,
}

impl<T: Serialize> ServerMessage<T> {
    pub fn new(action: DispatchAction, tasks: Vec<T>) -> Self {
        Self { action, tasks }
    }
}

/// Cut `output` down to at most `max_bytes`, never splitting a character.
pub fn truncate_output(output: &str, max_bytes: usize) -> &str {
    if output.len() <= max_bytes {
        return output;
    }
    let mut end = max_bytes;
    while !output.is_char_boundary(end) {
        end -= 1;
    }
    &output[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_register_worker() {
        let id = uuid::Uuid::new_v4();
        let frame = format!(
            r#"{{"action":"register_worker","worker_id":"{id}","api_key":"k","team_id":3,
               "data":{{"name":"w1","metadata":{{"os":"linux"}}}}}}"#
        );
        let event = WorkerEvent::decode(frame.as_bytes()).unwrap();
        let WorkerEvent::RegisterWorker(reg) = event else {
            panic!("expected register_worker, got {event:?}");
        };
        assert_eq!(reg.worker_id, id);
        assert_eq!(reg.team_id, Some(3));
        assert_eq!(reg.data.name.as_deref(), Some("w1"));
        assert_eq!(reg.data.metadata, Some(serde_json::json!({"os": "linux"})));
    }

    #[test]
    fn decodes_task_update_and_ignores_extra_fields() {
        let frame = br#"{"action":"task_update","task_id":42,"api_key":"k",
            "data":{"status":"running","output":"hi","retry_count":99,"time_end":"x"}}"#;
        let event = WorkerEvent::decode(frame).unwrap();
        assert_eq!(
            event,
            WorkerEvent::TaskUpdate(TaskUpdate {
                task_id: 42,
                api_key: "k".into(),
                data: TaskUpdateData {
                    status: Some(TaskStatus::Running),
                    output: Some("hi".into()),
                    ..Default::default()
                },
            })
        );
    }

    #[test]
    fn unknown_action_is_unrecognized() {
        let event = WorkerEvent::decode(br#"{"action":"shutdown_now"}"#).unwrap();
        assert_eq!(
            event,
            WorkerEvent::Unrecognized {
                action: "shutdown_now".into()
            }
        );
        assert_eq!(event.action(), "shutdown_now");
    }

    #[test]
    fn malformed_frames_are_errors() {
        assert!(matches!(
            WorkerEvent::decode(b"{not json"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            WorkerEvent::decode(br#"{"task_id":1}"#),
            Err(ProtocolError::MissingAction)
        ));
        assert!(matches!(
            WorkerEvent::decode(br#"{"action":"task_update","api_key":"k"}"#),
            Err(ProtocolError::InvalidPayload { action: "task_update", .. })
        ));
        assert!(matches!(
            WorkerEvent::decode(br#"{"action":"task_update","task_id":1,"api_key":"k","data":{"status":"exploded"}}"#),
            Err(ProtocolError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn server_message_shape() {
        let msg = ServerMessage::new(DispatchAction::for_stop(true), vec![serde_json::json!({"id": 1})]);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, serde_json::json!({"action": "kill", "tasks": [{"id": 1}]}));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_output("hello", 10), "hello");
        assert_eq!(truncate_output("hello", 3), "hel");
        // 'é' is two bytes; cutting at 2 would split it.
        assert_eq!(truncate_output("aé", 2), "a");
    }
}
