#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

mod broadcast;
mod client;
mod envelope;
mod flight;

/// Error types for cache operations.
pub mod error;

/// Cache key derivation shared by the read path, the write path, and
/// invalidation broadcasts.
pub mod key;

/// The process-local cache contract implemented by adapter crates.
pub mod local;

/// Metric names, labels, and histogram buckets.
pub mod metrics;

/// Payload marshalling between caller values and cached bytes.
pub mod payload;

/// The remote-store contract implemented by adapter crates.
pub mod store;

pub use broadcast::{DELIMITER, INVALIDATE_TOPIC};
pub use client::{Cache, CacheBuilder, GetOptions};
pub use error::{CacheError, OriginError};
pub use key::{lock_key, store_key};
pub use local::{LocalCache, LocalError, LocalResult};
pub use metrics::LATENCY_BUCKETS_MS;
pub use payload::{MsgPack, Payload};
pub use store::{MessageStream, RemoteStore, StoreError, StoreResult};
