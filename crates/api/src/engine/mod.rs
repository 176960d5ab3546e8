//! Task lifecycle engine: cancel, stop/kill, retry, submission and the
//! task/worker mutations driven by worker frames.

mod lifecycle;

pub use lifecycle::{StopInstruction, TaskEngine};
