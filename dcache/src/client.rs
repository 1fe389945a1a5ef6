//! The cache client: read coordination, writes, invalidation, lifecycle.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::broadcast::{self, Broadcaster, INVALIDATE_TOPIC};
use crate::envelope::{Envelope, now_ms};
use crate::error::{CacheError, OriginError};
use crate::flight::{FlightGroup, FlightResult, SharedFlight};
use crate::key::{lock_key, store_key};
use crate::local::LocalCache;
use crate::metrics::{ERR_SET_CACHE, HIT_DB, HIT_MEM, HIT_REDIS, MetricSet};
use crate::payload::Payload;
use crate::store::RemoteStore;

/// Pause between attempts to take the distributed read lock.
const LOCK_SLEEP: Duration = Duration::from_millis(50);

/// Per-call read behavior flags.
///
/// ```
/// use dcache::GetOptions;
///
/// let defaults = GetOptions::default();
/// assert!(!defaults.no_cache && !defaults.no_store);
///
/// let refresh = GetOptions::default().no_cache();
/// assert!(refresh.no_cache);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct GetOptions {
    /// Skip the local and remote read paths and go straight to the origin.
    /// The fresh value is still written back unless `no_store` is also set.
    pub no_cache: bool,
    /// Do not write the obtained value to the remote store or local cache.
    pub no_store: bool,
}

impl GetOptions {
    /// Sets the `no_cache` flag.
    pub fn no_cache(mut self) -> Self {
        self.no_cache = true;
        self
    }

    /// Sets the `no_store` flag.
    pub fn no_store(mut self) -> Self {
        self.no_store = true;
        self
    }
}

struct CacheInner {
    store: Arc<dyn RemoteStore>,
    local: Option<Arc<dyn LocalCache>>,
    read_interval: Duration,
    flights: FlightGroup,
    stats: Option<MetricSet>,
    broadcast: Option<Arc<Broadcaster>>,
    lifecycle: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for CacheInner {
    fn drop(&mut self) {
        // Stops the background tasks even when close() was never called;
        // they hold the token and the adapters, not the inner state.
        self.lifecycle.cancel();
    }
}

/// Two-tier read-through cache client.
///
/// Reads consult the optional local cache, then the remote store, and only
/// then the caller-supplied origin function — with concurrent misses on one
/// key collapsed to a single origin read both inside the process (the
/// flight group) and across the fleet (a `set_nx` lock on the remote store,
/// held for the configured read interval).
///
/// Writes and invalidations keep all tiers aligned and notify peer
/// processes over the store's pub/sub channel so their local copies are
/// dropped within roughly a second.
///
/// `Cache` is cheap to clone; clones share all state. Call
/// [`close`](Cache::close) once when the process shuts down.
#[derive(Clone)]
pub struct Cache {
    inner: Arc<CacheInner>,
}

/// Builder for [`Cache`].
///
/// ```ignore
/// let cache = Cache::builder()
///     .app_name("orders")
///     .store(redis_store)
///     .local_cache(moka_cache)
///     .read_interval(Duration::from_secs(3))
///     .enable_stats(true)
///     .build()
///     .await?;
/// ```
pub struct CacheBuilder {
    app_name: String,
    store: Option<Arc<dyn RemoteStore>>,
    local: Option<Arc<dyn LocalCache>>,
    read_interval: Duration,
    enable_stats: bool,
}

impl Default for CacheBuilder {
    fn default() -> Self {
        CacheBuilder {
            app_name: String::from("dcache"),
            store: None,
            local: None,
            read_interval: Duration::from_secs(1),
            enable_stats: false,
        }
    }
}

impl CacheBuilder {
    /// Metric name prefix. Must be unique per cache instance when several
    /// share one process, or their metrics collide.
    ///
    /// Default: `"dcache"`.
    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    /// The shared remote store. Required.
    pub fn store(mut self, store: Arc<dyn RemoteStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Optional process-local cache. Attaching one enables the local read
    /// path and starts the invalidation broadcaster.
    pub fn local_cache(mut self, local: Arc<dyn LocalCache>) -> Self {
        self.local = Some(local);
        self
    }

    /// TTL of the distributed read lock, which is also the minimum spacing
    /// between origin reads of one key across the fleet.
    ///
    /// Default: 1 second.
    pub fn read_interval(mut self, read_interval: Duration) -> Self {
        self.read_interval = read_interval;
        self
    }

    /// Whether to record metrics. Default: `false`.
    pub fn enable_stats(mut self, enable_stats: bool) -> Self {
        self.enable_stats = enable_stats;
        self
    }

    /// Builds the cache. When a local cache is attached this subscribes to
    /// the invalidation topic and starts the aggregator and listener tasks.
    ///
    /// # Errors
    ///
    /// [`CacheError::MissingStore`] when no remote store was configured, or
    /// a store error when the pub/sub subscription fails.
    pub async fn build(self) -> Result<Cache, CacheError> {
        let store = self.store.ok_or(CacheError::MissingStore)?;
        let stats = self.enable_stats.then(|| MetricSet::new(&self.app_name));
        let id = Uuid::new_v4().to_string();
        let lifecycle = CancellationToken::new();
        let mut workers = Vec::new();

        let broadcaster = match &self.local {
            Some(local) => {
                let messages = store.subscribe(INVALIDATE_TOPIC).await?;
                let (broadcaster, pressure_rx) = Broadcaster::new(id.clone());
                workers.push(tokio::spawn(Arc::clone(&broadcaster).aggregate(
                    Arc::clone(&store),
                    pressure_rx,
                    lifecycle.clone(),
                )));
                workers.push(tokio::spawn(broadcast::listen(
                    messages,
                    id,
                    Arc::clone(local),
                    stats.clone(),
                    lifecycle.clone(),
                )));
                Some(broadcaster)
            }
            None => None,
        };

        Ok(Cache {
            inner: Arc::new(CacheInner {
                store,
                local: self.local,
                read_interval: self.read_interval,
                flights: FlightGroup::default(),
                stats,
                broadcast: broadcaster,
                lifecycle,
                workers: Mutex::new(workers),
            }),
        })
    }
}

impl Cache {
    /// Returns a builder with default settings.
    pub fn builder() -> CacheBuilder {
        CacheBuilder::default()
    }

    /// Reads `key`, calling `read` on a miss and caching its result for a
    /// fixed `ttl`. See [`get_with_ttl`](Cache::get_with_ttl).
    pub async fn get<T, F, Fut>(
        &self,
        ctx: &CancellationToken,
        key: &str,
        ttl: Duration,
        read: F,
        options: GetOptions,
    ) -> Result<T, CacheError>
    where
        T: Payload + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, OriginError>> + Send + 'static,
    {
        let read_with_ttl = move || async move { read().await.map(|value| (value, ttl)) };
        self.get_with_ttl(ctx, key, read_with_ttl, options).await
    }

    /// Reads `key`, calling `read_with_ttl` on a miss and caching its
    /// result for the TTL it returns.
    ///
    /// The lookup order is local cache, remote store, origin; concurrent
    /// misses on one key share a single origin read. While a peer process
    /// holds the read lock, the call polls the remote store every 50 ms
    /// until the peer's write lands or `ctx` is cancelled
    /// ([`CacheError::Timeout`]).
    ///
    /// Concurrent callers of one key coalesce onto the earliest caller's
    /// flight, and a flight delivers one shared outcome: if the context of
    /// the caller that started it is cancelled, every coalesced caller
    /// observes `Timeout` for that attempt. Cancelling a waiting caller's
    /// own `ctx` only abandons that caller; the flight keeps running for
    /// its peers.
    pub async fn get_with_ttl<T, F, Fut>(
        &self,
        ctx: &CancellationToken,
        key: &str,
        read_with_ttl: F,
        options: GetOptions,
    ) -> Result<T, CacheError>
    where
        T: Payload + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(T, Duration), OriginError>> + Send + 'static,
    {
        // Marshal inside the flight so one origin read serves every waiter
        // its bytes, whatever their target type.
        let read = move || async move {
            let (value, ttl) = read_with_ttl().await.map_err(CacheError::origin)?;
            Ok((value.marshal()?, ttl))
        };

        if options.no_cache {
            let flight = self.inner.read_value(key, read, options.no_store);
            let bytes = wait(ctx, flight).await?;
            return T::unmarshal(&bytes);
        }

        if let Some(local) = &self.inner.local {
            if let Some(bytes) = local.get(store_key(key).as_bytes()).await {
                self.inner.record_hit(HIT_MEM);
                return T::unmarshal(&bytes);
            }
        }

        let executor =
            Arc::clone(&self.inner).coordinate(key.to_owned(), ctx.clone(), read, options.no_store);
        let flight = self.inner.flights.join(&lock_key(key), executor);
        let bytes = wait(ctx, flight).await?;
        T::unmarshal(&bytes)
    }

    /// Writes `value` at `key` with the given TTL to the remote store and
    /// the local cache, broadcasting an invalidation when the local copy
    /// changed.
    ///
    /// # Errors
    ///
    /// Marshalling and remote-store failures propagate; local-cache
    /// failures are logged only.
    pub async fn set<T: Payload>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let bytes = value.marshal()?;
        self.inner.set_key(key, bytes, ttl).await
    }

    /// Removes `key` from the remote store and the local cache, and
    /// broadcasts the eviction to peers holding a local copy.
    ///
    /// Always succeeds; store failures are logged and the local eviction
    /// still happens.
    pub async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        self.inner.delete_key(key).await;
        Ok(())
    }

    /// Stops the invalidation tasks and waits for them, including any
    /// in-flight batch publishes. Idempotent.
    pub async fn close(&self) {
        self.inner.lifecycle.cancel();
        let workers: Vec<JoinHandle<()>> = {
            let mut workers = self
                .inner
                .workers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            workers.drain(..).collect()
        };
        for worker in workers {
            let _ = worker.await;
        }
    }
}

/// Waits on a shared flight, abandoning the wait (not the flight) when the
/// caller's context is cancelled.
async fn wait(ctx: &CancellationToken, flight: SharedFlight) -> FlightResult {
    tokio::select! {
        result = flight => result,
        _ = ctx.cancelled() => Err(CacheError::Timeout),
    }
}

impl CacheInner {
    fn record_hit(&self, layer: &'static str) {
        if let Some(stats) = &self.stats {
            stats.hit(layer);
        }
    }

    fn record_latency(&self, layer: &'static str, started: Instant) {
        if let Some(stats) = &self.stats {
            stats.latency(layer, started);
        }
    }

    fn record_error(&self, site: &'static str) {
        if let Some(stats) = &self.stats {
            stats.error(site);
        }
    }

    /// The cross-process read path, executed by at most one flight per key.
    ///
    /// Loops remote read → lock attempt → sleep until the value appears,
    /// the lock is won (then the origin is read), or `ctx` is cancelled.
    async fn coordinate<F, Fut>(
        self: Arc<Self>,
        key: String,
        ctx: CancellationToken,
        read: F,
        no_store: bool,
    ) -> FlightResult
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(Bytes, Duration), CacheError>> + Send + 'static,
    {
        let skey = store_key(&key);
        let lkey = lock_key(&key);
        let started = Instant::now();
        let mut read = Some(read);
        loop {
            let fetched = tokio::select! {
                fetched = self.store.get(&skey) => fetched,
                _ = ctx.cancelled() => return Err(CacheError::Timeout),
            };
            match fetched {
                Ok(Some(raw)) => match Envelope::decode(&raw) {
                    Ok(envelope) => {
                        self.record_hit(HIT_REDIS);
                        self.record_latency(HIT_REDIS, started);
                        if !no_store {
                            self.update_local(&key, &envelope).await;
                        }
                        return Ok(envelope.value_bytes);
                    }
                    // An undecodable envelope is a miss; the origin path
                    // will overwrite it.
                    Err(err) => {
                        debug!(key = %skey, error = %err, "undecodable remote entry");
                    }
                },
                Ok(None) => {}
                Err(err) => {
                    debug!(key = %skey, error = %err, "remote read failed");
                }
            }

            // One lock attempt per process per round; losers wait for the
            // winner's write to land instead of hammering the origin.
            let acquired = tokio::select! {
                acquired = self.store.set_nx(&lkey, Bytes::new(), self.read_interval) => {
                    acquired.unwrap_or(false)
                }
                _ = ctx.cancelled() => return Err(CacheError::Timeout),
            };
            if acquired {
                if let Some(read) = read.take() {
                    return self.read_value(&key, read, no_store).await;
                }
            }

            tokio::select! {
                _ = ctx.cancelled() => return Err(CacheError::Timeout),
                _ = tokio::time::sleep(LOCK_SLEEP) => {}
            }
        }
    }

    /// Reads the origin under a per-key flight and writes the result back
    /// unless `no_store`. The flight key is the user key so that `no_cache`
    /// callers coalesce with lock winners.
    fn read_value<F, Fut>(self: &Arc<Self>, key: &str, read: F, no_store: bool) -> SharedFlight
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(Bytes, Duration), CacheError>> + Send + 'static,
    {
        let inner = Arc::clone(self);
        let owned_key = key.to_owned();
        self.flights.join(key, async move {
            let started = Instant::now();
            let result = read().await;
            inner.record_hit(HIT_DB);
            inner.record_latency(HIT_DB, started);
            let (bytes, ttl) = result?;
            if !no_store {
                // The value was obtained; a failed cache write must not
                // mask it.
                if let Err(err) = inner.set_key(&owned_key, bytes.clone(), ttl).await {
                    warn!(key = %owned_key, error = %err, "failed to cache origin value");
                    inner.record_error(ERR_SET_CACHE);
                }
            }
            Ok(bytes)
        })
    }

    async fn set_key(&self, key: &str, value_bytes: Bytes, ttl: Duration) -> Result<(), CacheError> {
        let envelope = Envelope::new(value_bytes, now_ms() + ttl.as_millis() as i64);
        let raw = envelope.encode()?;
        self.store.set(&store_key(key), raw, ttl).await?;
        self.update_local(key, &envelope).await;
        Ok(())
    }

    /// Writes the envelope payload to the local cache. When a different
    /// copy was already present, a peer may hold the same stale copy, so
    /// the key is queued for broadcast.
    async fn update_local(&self, key: &str, envelope: &Envelope) {
        let Some(local) = &self.local else { return };
        let ttl = envelope.local_ttl_seconds();
        if ttl <= 0 {
            return;
        }
        let skey = store_key(key);
        if let Some(current) = local.get(skey.as_bytes()).await {
            if current != envelope.value_bytes {
                if let Some(broadcast) = &self.broadcast {
                    broadcast.enqueue(skey.clone());
                }
            }
        }
        if let Err(err) = local.set(skey.as_bytes(), envelope.value_bytes.clone(), ttl as u64).await
        {
            warn!(key = %skey, error = %err, "failed to update local cache");
        }
    }

    async fn delete_key(&self, key: &str) {
        let skey = store_key(key);
        if let Err(err) = self.store.del(&skey).await {
            warn!(key = %skey, error = %err, "failed to delete remote entry");
        }
        let Some(local) = &self.local else { return };
        if local.get(skey.as_bytes()).await.is_some() {
            if let Some(broadcast) = &self.broadcast {
                broadcast.enqueue(skey.clone());
            }
        }
        local.del(skey.as_bytes()).await;
    }
}
