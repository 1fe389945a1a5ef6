#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Error types for the Redis adapter.
pub mod error;

/// The Redis [`dcache::RemoteStore`] implementation.
pub mod store;

pub use crate::error::Error;
pub use crate::store::{RedisStore, RedisStoreBuilder};
