//! Error types for the Redis remote-store adapter.

use dcache::StoreError;
use redis::RedisError;

/// Error type for Redis store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An error from the underlying Redis client: connection failures,
    /// protocol errors, authentication failures, command errors.
    #[error("redis store error: {0}")]
    Redis(#[from] RedisError),
}

impl From<Error> for StoreError {
    fn from(error: Error) -> Self {
        StoreError::Connection(Box::new(error))
    }
}
