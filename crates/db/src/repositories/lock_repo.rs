//! Repository for the `distributed_locks` table.
//!
//! Every write is a single conditional statement so two API instances can
//! never both believe they own a key. An expired row is treated exactly
//! like a missing one.

use std::time::Duration;

use sqlx::PgPool;

use crate::models::lock::LockRow;

/// Column list for `distributed_locks` queries.
const COLUMNS: &str = "key, token, expires_at";

pub struct LockRepo;

impl LockRepo {
    /// Insert the lease, or take over a lapsed one, in one statement.
    ///
    /// Returns `None` when an unexpired lease already exists.
    pub async fn try_acquire(
        pool: &PgPool,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<Option<LockRow>, sqlx::Error> {
        let query = format!(
            "INSERT INTO distributed_locks (key, token, expires_at) \
             VALUES ($1, $2, NOW() + make_interval(secs => $3)) \
             ON CONFLICT (key) DO UPDATE \
                 SET token = EXCLUDED.token, \
                     expires_at = EXCLUDED.expires_at, \
                     acquired_at = NOW() \
                 WHERE distributed_locks.expires_at <= NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, LockRow>(&query)
            .bind(key)
            .bind(token)
            .bind(ttl.as_secs_f64())
            .fetch_optional(pool)
            .await
    }

    /// Delete the lease if `token` owns it. Returns `true` if a row went away.
    pub async fn release(pool: &PgPool, key: &str, token: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM distributed_locks \
             WHERE key = $1 AND token = $2 AND expires_at > NOW()",
        )
        .bind(key)
        .bind(token)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Push the expiry out to `NOW() + ttl` if `token` still owns the lease.
    pub async fn refresh(
        pool: &PgPool,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<Option<LockRow>, sqlx::Error> {
        let query = format!(
            "UPDATE distributed_locks \
             SET expires_at = NOW() + make_interval(secs => $3) \
             WHERE key = $1 AND token = $2 AND expires_at > NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, LockRow>(&query)
            .bind(key)
            .bind(token)
            .bind(ttl.as_secs_f64())
            .fetch_optional(pool)
            .await
    }

    /// The unexpired lease on `key`, if any.
    pub async fn find_live(pool: &PgPool, key: &str) -> Result<Option<LockRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM distributed_locks WHERE key = $1 AND expires_at > NOW()"
        );
        sqlx::query_as::<_, LockRow>(&query)
            .bind(key)
            .fetch_optional(pool)
            .await
    }
}
