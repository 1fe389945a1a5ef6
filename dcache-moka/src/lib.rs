#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// The Moka [`dcache::LocalCache`] implementation.
pub mod cache;

pub use crate::cache::{MokaCache, MokaCacheBuilder};
