//! Moka local-cache implementation.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dcache::{LocalCache, LocalResult};
use moka::{Expiry, future::Cache};

/// One cached payload with the lifetime it was inserted with.
#[derive(Clone, Debug)]
struct LocalEntry {
    data: Bytes,
    ttl: Duration,
}

/// Per-entry expiration policy driven by the TTL recorded on each entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Expiration;

impl Expiry<Bytes, LocalEntry> for Expiration {
    fn expire_after_create(
        &self,
        _key: &Bytes,
        value: &LocalEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &Bytes,
        value: &LocalEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        // Use the NEW value's TTL; the default would keep the old
        // expiration and expire replacements prematurely.
        Some(value.ttl)
    }
}

/// [`LocalCache`] backed by a [`moka::future::Cache`].
///
/// Entries carry their own whole-second TTL; capacity overflow evicts via
/// Moka's TinyLFU policy.
///
/// ```
/// use dcache_moka::MokaCache;
///
/// let cache = MokaCache::builder(10_000).build();
/// # let _ = cache;
/// ```
#[derive(Clone)]
pub struct MokaCache {
    cache: Cache<Bytes, LocalEntry>,
}

/// Builder for [`MokaCache`].
pub struct MokaCacheBuilder {
    max_capacity: u64,
}

impl MokaCacheBuilder {
    /// Builds the cache.
    pub fn build(self) -> MokaCache {
        let cache = Cache::builder()
            .max_capacity(self.max_capacity)
            .expire_after(Expiration)
            .build();
        MokaCache { cache }
    }
}

impl MokaCache {
    /// Creates a builder for a cache holding up to `max_capacity` entries.
    pub fn builder(max_capacity: u64) -> MokaCacheBuilder {
        MokaCacheBuilder { max_capacity }
    }
}

#[async_trait]
impl LocalCache for MokaCache {
    async fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.cache.get(key).await.map(|entry| entry.data)
    }

    async fn set(&self, key: &[u8], value: Bytes, ttl_seconds: u64) -> LocalResult<()> {
        if ttl_seconds == 0 {
            return Ok(());
        }
        let entry = LocalEntry {
            data: value,
            ttl: Duration::from_secs(ttl_seconds),
        };
        self.cache.insert(Bytes::copy_from_slice(key), entry).await;
        Ok(())
    }

    async fn del(&self, key: &[u8]) {
        self.cache.invalidate(key).await;
    }
}
