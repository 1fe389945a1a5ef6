//! The value envelope persisted in the remote store.

use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Record stored at `store_key(k)`: the marshalled payload plus its absolute
/// expiration timestamp.
///
/// Encoded as a MessagePack map with single-character field tags so the
/// wire layout stays stable across versions and processes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Envelope {
    /// Marshalled payload bytes. May be empty for absent values.
    #[serde(rename = "v")]
    pub(crate) value_bytes: Bytes,
    /// Absolute wall-clock expiration, milliseconds since the Unix epoch.
    #[serde(rename = "e")]
    pub(crate) expires_at_ms: i64,
}

impl Envelope {
    pub(crate) fn new(value_bytes: Bytes, expires_at_ms: i64) -> Self {
        Envelope {
            value_bytes,
            expires_at_ms,
        }
    }

    pub(crate) fn encode(&self) -> Result<Bytes, CacheError> {
        let raw = rmp_serde::to_vec_named(self).map_err(CacheError::codec)?;
        Ok(Bytes::from(raw))
    }

    pub(crate) fn decode(raw: &[u8]) -> Result<Self, CacheError> {
        rmp_serde::from_slice(raw).map_err(CacheError::codec)
    }

    /// Whole-second TTL remaining for the local cache.
    ///
    /// Sub-second remnants round down; a result of zero or less means the
    /// local cache must not be populated.
    pub(crate) fn local_ttl_seconds(&self) -> i64 {
        self.local_ttl_seconds_at(Utc::now().timestamp())
    }

    fn local_ttl_seconds_at(&self, now_seconds: i64) -> i64 {
        self.expires_at_ms / 1000 - now_seconds
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
