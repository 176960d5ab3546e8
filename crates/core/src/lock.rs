//! Distributed lock domain rules: TTL bounds, key validation, token minting
//! and the well-known key shapes used across the platform.
//!
//! The store implementations live in `cronhub-db`; everything here is pure.

use std::time::Duration;

use serde::Serialize;

use crate::error::CoreError;
use crate::types::{DbId, Timestamp, WorkerId};

/// Lease length used when the caller does not ask for one.
pub const DEFAULT_TTL_SECS: u64 = 60;

/// Longest lease any caller may request.
pub const MAX_TTL_SECS: u64 = 3600;

/// Length of a minted owner token.
pub const TOKEN_LENGTH: usize = 48;

/// Upper bound on key length (matches the `distributed_locks.key` column).
pub const MAX_KEY_LEN: usize = 255;

/// Prefix of the connection-admission key, followed by the worker id.
pub const ADMISSION_KEY_PREFIX: &str = "/ws/";

/// A lease held by the owner of `token` until `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lock {
    pub key: String,
    pub token: String,
    pub expires_at: Timestamp,
}

/// Result of inspecting a key without taking it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockCheck {
    pub exists: bool,
    pub current_token: Option<String>,
    /// Only populated when the caller presented a token to compare.
    pub matched: Option<bool>,
}

impl LockCheck {
    /// Build a check result from the currently stored token.
    pub fn from_current(current_token: Option<String>, presented: Option<&str>) -> Self {
        let matched = presented.map(|p| current_token.as_deref() == Some(p));
        Self {
            exists: current_token.is_some(),
            current_token,
            matched,
        }
    }
}

/// Mint a fresh, opaque owner token.
pub fn generate_token() -> String {
    crate::api_keys::random_alphanumeric(TOKEN_LENGTH)
}

/// Validate a requested TTL and resolve the default.
///
/// `None` resolves to [`DEFAULT_TTL_SECS`]; zero and anything above
/// [`MAX_TTL_SECS`] are rejected.
pub fn resolve_ttl(expire_seconds: Option<u64>) -> Result<Duration, CoreError> {
    let secs = expire_seconds.unwrap_or(DEFAULT_TTL_SECS);
    if secs == 0 {
        return Err(CoreError::Validation(
            "expire_seconds must be at least 1".into(),
        ));
    }
    if secs > MAX_TTL_SECS {
        return Err(CoreError::Validation(format!(
            "expire_seconds must not exceed {MAX_TTL_SECS}"
        )));
    }
    Ok(Duration::from_secs(secs))
}

/// Validate a lock key.
pub fn validate_key(key: &str) -> Result<(), CoreError> {
    if key.trim().is_empty() {
        return Err(CoreError::Validation("Lock key must not be empty".into()));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(CoreError::Validation(format!(
            "Lock key must be at most {MAX_KEY_LEN} bytes"
        )));
    }
    Ok(())
}

/// Key a worker acquires before opening its dispatch connection.
pub fn admission_key(worker_id: WorkerId) -> String {
    format!("{ADMISSION_KEY_PREFIX}{worker_id}")
}

/// Parse the worker id out of an admission key of the form `/ws/{worker_id}`.
pub fn parse_admission_key(key: &str) -> Result<WorkerId, CoreError> {
    let raw = key.strip_prefix(ADMISSION_KEY_PREFIX).ok_or_else(|| {
        CoreError::Validation(format!(
            "Admission key must look like {ADMISSION_KEY_PREFIX}{{worker_id}}"
        ))
    })?;
    raw.parse::<WorkerId>()
        .map_err(|_| CoreError::Validation(format!("Invalid worker id in admission key: {raw}")))
}

/// Key guarding the cancel-versus-claim race on a single task.
pub fn task_key(task_id: DbId) -> String {
    format!("task:{task_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_defaults_to_sixty_seconds() {
        assert_eq!(resolve_ttl(None).unwrap(), Duration::from_secs(60));
    }

    #[test]
    fn ttl_accepts_upper_bound() {
        assert_eq!(
            resolve_ttl(Some(MAX_TTL_SECS)).unwrap(),
            Duration::from_secs(3600)
        );
    }

    #[test]
    fn ttl_rejects_zero_and_above_max() {
        assert!(matches!(resolve_ttl(Some(0)), Err(CoreError::Validation(_))));
        assert!(matches!(
            resolve_ttl(Some(MAX_TTL_SECS + 1)),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn key_validation() {
        assert!(validate_key("job:x").is_ok());
        assert!(validate_key("  ").is_err());
        assert!(validate_key(&"k".repeat(MAX_KEY_LEN + 1)).is_err());
    }

    #[test]
    fn admission_key_parses_back() {
        let id = uuid::Uuid::new_v4();
        assert_eq!(parse_admission_key(&admission_key(id)).unwrap(), id);
    }

    #[test]
    fn admission_key_rejects_foreign_shapes() {
        assert!(parse_admission_key("job:x").is_err());
        assert!(parse_admission_key("/ws/not-a-uuid").is_err());
        assert!(parse_admission_key("/ws/").is_err());
    }

    #[test]
    fn tokens_are_unique_and_sized() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), TOKEN_LENGTH);
        assert_ne!(a, b);
    }

    #[test]
    fn check_reports_match_only_when_token_presented() {
        let held = LockCheck::from_current(Some("abc".into()), None);
        assert!(held.exists);
        assert_eq!(held.matched, None);

        let matched = LockCheck::from_current(Some("abc".into()), Some("abc"));
        assert_eq!(matched.matched, Some(true));

        let free = LockCheck::from_current(None, Some("abc"));
        assert!(!free.exists);
        assert_eq!(free.matched, Some(false));
    }
}
