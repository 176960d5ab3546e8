//! Status lookup enums. The definitions live in `cronhub-core` so the
//! lifecycle rules can be used without a database; re-exported here so
//! model and repository code reads the same as for any other table.

pub use cronhub_core::status::{StatusId, TaskStatus, ALL_TASK_STATUSES};
