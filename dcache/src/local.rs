//! Local-cache contract.

use std::error::Error as StdError;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Result alias for local-cache writes.
pub type LocalResult<T> = Result<T, LocalError>;

/// Error from a local-cache write.
///
/// Local-cache failures never fail a cache operation; the client logs them
/// and moves on.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct LocalError(Box<dyn StdError + Send + Sync>);

impl LocalError {
    /// Wraps an adapter-specific error.
    pub fn new<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        LocalError(Box::new(err))
    }
}

/// Process-local in-memory cache keyed by raw bytes.
///
/// The adapter is optional: a cache built without one skips the local read
/// path entirely and starts no invalidation tasks. TTLs are whole seconds;
/// the client never calls [`set`](LocalCache::set) with a zero TTL, but
/// adapters should treat one as "do not cache" regardless. Eviction policy
/// is the adapter's own business.
#[async_trait]
pub trait LocalCache: Send + Sync + 'static {
    /// Reads the value stored at `key`, or `None` on a miss or after expiry.
    async fn get(&self, key: &[u8]) -> Option<Bytes>;

    /// Writes `value` at `key` for `ttl_seconds` seconds.
    async fn set(&self, key: &[u8], value: Bytes, ttl_seconds: u64) -> LocalResult<()>;

    /// Deletes the value stored at `key`, if any.
    async fn del(&self, key: &[u8]);
}
