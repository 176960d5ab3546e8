//! Worker API key model.

use cronhub_core::api_keys::Principal;
use cronhub_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `api_keys` table. The plaintext key is never stored.
#[derive(Debug, Clone, FromRow)]
pub struct ApiKey {
    pub id: DbId,
    pub key_hash: String,
    pub key_prefix: String,
    pub team_id: Option<DbId>,
    pub is_active: bool,
    pub created_at: Timestamp,
}

impl ApiKey {
    pub fn principal(&self) -> Principal {
        Principal {
            api_key_id: self.id,
            team_id: self.team_id,
        }
    }
}
