//! In-memory doubles for the remote store and local cache.
//!
//! One `MemoryStore` shared by several `Cache` instances stands in for a
//! Redis deployment shared by several processes; its pub/sub fan-out runs
//! over a broadcast channel so every subscriber (including the publisher)
//! sees every message.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dcache::{
    Cache, LocalCache, LocalResult, MessageStream, RemoteStore, StoreResult,
};
use futures::StreamExt;
use tokio::sync::broadcast;

pub struct MemoryStore {
    entries: Mutex<HashMap<String, (Bytes, Instant)>>,
    publisher: broadcast::Sender<String>,
}

impl MemoryStore {
    pub fn new() -> Arc<MemoryStore> {
        let (publisher, _) = broadcast::channel(64);
        Arc::new(MemoryStore {
            entries: Mutex::new(HashMap::new()),
            publisher,
        })
    }

    /// Whether a live (unexpired) entry exists at `key`.
    pub fn contains(&self, key: &str) -> bool {
        let entries = self.entries.lock().unwrap();
        entries
            .get(key)
            .is_some_and(|(_, expires)| *expires > Instant::now())
    }

    /// Raw receiver observing everything published on any topic.
    pub fn raw_messages(&self) -> broadcast::Receiver<String> {
        self.publisher.subscribe()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>> {
        let mut entries = self.entries.lock().unwrap();
        if let Some((value, expires)) = entries.get(key) {
            if *expires > Instant::now() {
                return Ok(Some(value.clone()));
            }
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> StoreResult<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(key.to_owned(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: Bytes, ttl: Duration) -> StoreResult<bool> {
        let mut entries = self.entries.lock().unwrap();
        let live = entries
            .get(key)
            .is_some_and(|(_, expires)| *expires > Instant::now());
        if live {
            return Ok(false);
        }
        entries.insert(key.to_owned(), (value, Instant::now() + ttl));
        Ok(true)
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn publish(&self, _topic: &str, payload: String) -> StoreResult<()> {
        let _ = self.publisher.send(payload);
        Ok(())
    }

    async fn subscribe(&self, _topic: &str) -> StoreResult<MessageStream> {
        let receiver = self.publisher.subscribe();
        let messages = futures::stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(message) => return Some((message, receiver)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(messages.boxed())
    }
}

pub struct MemoryLocal {
    entries: Mutex<HashMap<Vec<u8>, (Bytes, Instant)>>,
}

impl MemoryLocal {
    pub fn new() -> Arc<MemoryLocal> {
        Arc::new(MemoryLocal {
            entries: Mutex::new(HashMap::new()),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[async_trait]
impl LocalCache for MemoryLocal {
    async fn get(&self, key: &[u8]) -> Option<Bytes> {
        let mut entries = self.entries.lock().unwrap();
        if let Some((value, expires)) = entries.get(key) {
            if *expires > Instant::now() {
                return Some(value.clone());
            }
            entries.remove(key);
        }
        None
    }

    async fn set(&self, key: &[u8], value: Bytes, ttl_seconds: u64) -> LocalResult<()> {
        if ttl_seconds == 0 {
            return Ok(());
        }
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            key.to_vec(),
            (value, Instant::now() + Duration::from_secs(ttl_seconds)),
        );
        Ok(())
    }

    async fn del(&self, key: &[u8]) {
        self.entries.lock().unwrap().remove(key);
    }
}

/// A cache instance standing in for one process of the fleet.
pub async fn process_cache(store: &Arc<MemoryStore>, local: &Arc<MemoryLocal>) -> Cache {
    Cache::builder()
        .store(store.clone())
        .local_cache(local.clone())
        .build()
        .await
        .expect("cache build")
}

/// A cache instance without a local tier.
pub async fn store_only_cache(store: &Arc<MemoryStore>) -> Cache {
    Cache::builder()
        .store(store.clone())
        .build()
        .await
        .expect("cache build")
}
