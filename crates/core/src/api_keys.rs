//! Worker API key generation and hashing.
//!
//! Workers present a plaintext key on every `register_worker` and
//! `task_update` frame. Only the SHA-256 digest is ever stored, so lookups
//! hash the presented key and match on the digest.

use rand::Rng;

use crate::types::DbId;

/// Length of the generated API key string (alphanumeric characters).
pub const KEY_LENGTH: usize = 48;

/// Number of leading characters stored as a human-visible prefix.
pub const KEY_PREFIX_LENGTH: usize = 8;

/// The result of generating a new API key.
pub struct GeneratedApiKey {
    /// The plaintext key (shown to the operator exactly once, never stored).
    pub plaintext: String,
    /// The first [`KEY_PREFIX_LENGTH`] characters of the key for display.
    pub prefix: String,
    /// The SHA-256 hex digest of the plaintext key (stored in the database).
    pub hash: String,
}

/// Generate a new random API key.
pub fn generate_api_key() -> GeneratedApiKey {
    let key = random_alphanumeric(KEY_LENGTH);
    let prefix = key[..KEY_PREFIX_LENGTH].to_string();
    let hash = hash_api_key(&key);

    GeneratedApiKey {
        plaintext: key,
        prefix,
        hash,
    }
}

/// Compute the SHA-256 hex digest of an API key.
pub fn hash_api_key(key: &str) -> String {
    crate::hashing::sha256_hex(key.as_bytes())
}

/// Extract the prefix from a plaintext API key.
pub fn extract_prefix(key: &str) -> &str {
    match key.char_indices().nth(KEY_PREFIX_LENGTH) {
        Some((end, _)) => &key[..end],
        None => key,
    }
}

// ---------------------------------------------------------------------------
// Verification outcome
// ---------------------------------------------------------------------------

/// The identity behind a verified key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub api_key_id: DbId,
    /// `None` for platform-wide keys that may act for any team.
    pub team_id: Option<DbId>,
}

impl Principal {
    /// Whether this key may act on a resource owned by `team_id`.
    pub fn permits_team(&self, team_id: Option<DbId>) -> bool {
        match (self.team_id, team_id) {
            (None, _) | (_, None) => true,
            (Some(own), Some(other)) => own == other,
        }
    }
}

/// Result of checking a presented credential.
///
/// Rejection is an ordinary outcome, not an error: the protocol handler
/// drops the event and keeps the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Authenticated(Principal),
    Rejected,
}

/// Random ASCII alphanumeric string of length `len`.
pub(crate) fn random_alphanumeric(len: usize) -> String {
    rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
