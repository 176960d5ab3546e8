//! Repository for the `api_keys` table.

use sqlx::PgPool;

use crate::models::api_key::ApiKey;

const COLUMNS: &str = "id, key_hash, key_prefix, team_id, is_active, created_at";

pub struct ApiKeyRepo;

impl ApiKeyRepo {
    /// Look up an active key by the SHA-256 digest of its plaintext.
    pub async fn find_active_by_hash(
        pool: &PgPool,
        key_hash: &str,
    ) -> Result<Option<ApiKey>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM api_keys WHERE key_hash = $1 AND is_active = TRUE");
        sqlx::query_as::<_, ApiKey>(&query)
            .bind(key_hash)
            .fetch_optional(pool)
            .await
    }
}
