//! Worker dispatch connections.
//!
//! Admission, the per-session read loop and frame processing, the session
//! registry, outbound task pushes and the heartbeat.

pub mod dispatch;
mod handler;
mod heartbeat;
pub mod protocol;
pub mod registry;

pub use handler::{ws_task_handler, AdmissionQuery};
pub use heartbeat::start_heartbeat;
pub use registry::{LiveWorker, SessionRegistry};
