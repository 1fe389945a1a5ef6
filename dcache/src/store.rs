//! Remote-store contract.
//!
//! The cache consumes a shared key-value store through this trait: plain
//! get/set with TTLs, a set-if-absent primitive for the distributed read
//! lock, and a pub/sub channel for invalidation broadcasts. The store is
//! expected to deliver published messages at least once; lost messages only
//! widen the staleness window of peer local caches.

use std::error::Error as StdError;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

/// Result alias for remote-store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Stream of raw pub/sub message payloads for one subscription.
///
/// Dropping the stream ends the subscription.
pub type MessageStream = BoxStream<'static, String>;

/// Error type for remote-store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Network interaction with the remote store failed.
    #[error(transparent)]
    Connection(Box<dyn StdError + Send + Sync>),

    /// Any store failure not related to network interaction.
    #[error(transparent)]
    Internal(Box<dyn StdError + Send + Sync>),
}

/// Shared remote key-value store with TTLs and pub/sub.
///
/// Implementations must be safe for concurrent use; the cache calls them
/// from request tasks and from its background loops simultaneously.
#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    /// Reads the value stored at `key`, or `None` on a miss.
    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>>;

    /// Writes `value` at `key` with the given time to live.
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> StoreResult<()>;

    /// Writes `value` at `key` with the given time to live only if the key
    /// is absent. Returns whether the write happened.
    async fn set_nx(&self, key: &str, value: Bytes, ttl: Duration) -> StoreResult<bool>;

    /// Deletes the value stored at `key`, if any.
    async fn del(&self, key: &str) -> StoreResult<()>;

    /// Publishes `payload` on `topic` to every subscriber.
    async fn publish(&self, topic: &str, payload: String) -> StoreResult<()>;

    /// Subscribes to `topic` and returns the stream of payloads.
    async fn subscribe(&self, topic: &str) -> StoreResult<MessageStream>;
}
