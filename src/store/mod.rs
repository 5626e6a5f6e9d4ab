//! Key/value store adapter
//!
//! Narrow capability over an external key/value store with TTL. This is the
//! only source of cross-instance shared state: every stateful limiter and
//! the quota manager write through it, each under its own key prefix.
//!
//! Each single operation is assumed atomic with respect to other operations
//! on the same key, but no read-modify-write atomicity is assumed across a
//! `get` followed by a `put`. Under concurrent access from the same client
//! key this admits slightly more than `limit` requests; the overshoot is
//! bounded by the number of concurrent workers.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by a KV backend. All of these are transient from the
/// caller's perspective; the policy pipeline fails open on them.
#[derive(Debug, Error)]
pub enum KvError {
    /// The backend could not be reached or refused the operation
    #[error("kv store unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be decoded
    #[error("kv value corrupt for key {key}: {details}")]
    Corrupt { key: String, details: String },
}

/// Capability over the external key/value store.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Fetch the raw value for `key`, if present and not expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;

    /// Store `value` under `key`, expiring after `ttl`.
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), KvError>;

    /// Remove `key` if present.
    async fn delete(&self, key: &str) -> Result<(), KvError>;
}

/// Decode a JSON state record fetched from the store.
pub fn decode_json<T: serde::de::DeserializeOwned>(key: &str, raw: &[u8]) -> Result<T, KvError> {
    serde_json::from_slice(raw).map_err(|e| KvError::Corrupt {
        key: key.to_string(),
        details: e.to_string(),
    })
}

/// Encode a JSON state record for storage.
pub fn encode_json<T: serde::Serialize>(key: &str, value: &T) -> Result<Vec<u8>, KvError> {
    serde_json::to_vec(value).map_err(|e| KvError::Corrupt {
        key: key.to_string(),
        details: e.to_string(),
    })
}
