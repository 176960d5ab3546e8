//! Row model for the `distributed_locks` table.

use cronhub_core::lock::Lock;
use cronhub_core::types::Timestamp;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct LockRow {
    pub key: String,
    pub token: String,
    pub expires_at: Timestamp,
}

impl From<LockRow> for Lock {
    fn from(row: LockRow) -> Self {
        Lock {
            key: row.key,
            token: row.token,
            expires_at: row.expires_at,
        }
    }
}
