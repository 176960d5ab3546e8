//! Worker entity models and DTOs.

use serde::Serialize;
use sqlx::FromRow;
use cronhub_core::types::{DbId, Timestamp, WorkerId};

/// A worker row from the `workers` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Worker {
    pub id: WorkerId,
    pub team_id: Option<DbId>,
    pub name: String,
    pub description: String,
    pub is_active: bool,
    pub last_active: Option<Timestamp>,
    pub metadata: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating or updating a worker in one step.
///
/// `None` fields leave the stored value untouched on update; on create they
/// fall back to defaults.
#[derive(Debug, Clone, Default)]
pub struct UpsertWorker {
    pub id: WorkerId,
    pub team_id: Option<DbId>,
    pub name: Option<String>,
    pub description: Option<String>,
    /// Merged key-by-key into the stored object.
    pub metadata: Option<serde_json::Value>,
    /// Distinguishes "leave as is" (`None`) from an explicit `false`.
    pub is_active: Option<bool>,
}

/// Name given to a worker that registered without one.
pub fn default_worker_name(id: WorkerId) -> String {
    let id = id.simple().to_string();
    format!("worker-{}", &id[..8])
}

/// Shallow merge of `incoming` into `existing` when both are objects;
/// otherwise `incoming` replaces `existing`.
pub fn merge_metadata(existing: &serde_json::Value, incoming: &serde_json::Value) -> serde_json::Value {
    match (existing, incoming) {
        (serde_json::Value::Object(old), serde_json::Value::Object(new)) => {
            let mut merged = old.clone();
            for (k, v) in new {
                merged.insert(k.clone(), v.clone());
            }
            serde_json::Value::Object(merged)
        }
        _ => incoming.clone(),
    }
}
