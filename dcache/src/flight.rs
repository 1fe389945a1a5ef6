//! In-process single flight.
//!
//! Collapses concurrent reads of the same key onto one execution. The
//! winning caller's future runs on its own task, so a waiter that gives up
//! never cancels the work for its peers; every caller of the same key
//! observes the same terminal result.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

use crate::error::CacheError;

pub(crate) type FlightResult = Result<Bytes, CacheError>;

/// Cloneable handle to one in-flight execution's result.
pub(crate) type SharedFlight = Shared<BoxFuture<'static, FlightResult>>;

#[derive(Default)]
pub(crate) struct FlightGroup {
    calls: Arc<DashMap<String, SharedFlight>>,
}

impl FlightGroup {
    /// Joins the flight for `key`, starting it with `flight` if none is
    /// running. The returned future is cloneable and shared by every
    /// concurrent caller; late joiners created while the flight runs attach
    /// to it, and the entry is removed once the flight completes.
    pub(crate) fn join<F>(&self, key: &str, flight: F) -> SharedFlight
    where
        F: Future<Output = FlightResult> + Send + 'static,
    {
        if let Some(existing) = self.calls.get(key) {
            return existing.clone();
        }
        match self.calls.entry(key.to_owned()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let calls = Arc::clone(&self.calls);
                let owned_key = entry.key().clone();
                let handle = tokio::spawn(async move {
                    let result = flight.await;
                    calls.remove(&owned_key);
                    result
                });
                let shared = async move {
                    match handle.await {
                        Ok(result) => result,
                        Err(_) => Err(CacheError::Aborted),
                    }
                }
                .boxed()
                .shared();
                entry.insert(shared.clone());
                shared
            }
        }
    }
}
