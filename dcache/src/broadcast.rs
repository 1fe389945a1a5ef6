//! Cross-process invalidation broadcasting.
//!
//! Writers enqueue store keys whose local copy changed; an aggregator task
//! flushes the pending set once per second (or early, under pressure) as a
//! single pub/sub message tagged with the publishing process id. A listener
//! task applies incoming batches to the local cache, dropping batches that
//! originated here.

use std::collections::HashSet;
use std::mem;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::local::LocalCache;
use crate::metrics::{ERR_INVALIDATE, MetricSet};
use crate::store::{MessageStream, RemoteStore};

/// Pub/sub topic shared by every cache instance on one remote store.
pub const INVALIDATE_TOPIC: &str = "dcache:invalidate";

/// Separator between the sender id and each key in a broadcast payload.
/// Multi-character on purpose; it must not occur inside keys.
pub const DELIMITER: &str = "~|~";

/// Pending-set size that triggers an early flush.
const MAX_INVALIDATE: usize = 100;

/// Capacity of the pressure channel. Sized so enqueue bursts between two
/// aggregator wakeups cannot block request tasks.
const PRESSURE_CAPACITY: usize = 100;

const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Accumulates keys awaiting broadcast.
pub(crate) struct Broadcaster {
    id: String,
    pending: Mutex<HashSet<String>>,
    pressure: mpsc::Sender<()>,
}

impl Broadcaster {
    pub(crate) fn new(id: String) -> (Arc<Self>, mpsc::Receiver<()>) {
        let (pressure, pressure_rx) = mpsc::channel(PRESSURE_CAPACITY);
        let broadcaster = Arc::new(Broadcaster {
            id,
            pending: Mutex::new(HashSet::new()),
            pressure,
        });
        (broadcaster, pressure_rx)
    }

    /// Queues `key` for the next broadcast batch. When the pending set
    /// reaches the flush threshold, the aggregator is woken early; a full
    /// pressure channel drops the wakeup and the periodic tick flushes
    /// instead.
    pub(crate) fn enqueue(&self, key: String) {
        let len = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            pending.insert(key);
            pending.len()
        };
        if len >= MAX_INVALIDATE {
            let _ = self.pressure.try_send(());
        }
    }

    fn drain(&self) -> Vec<String> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        mem::take(&mut *pending).into_iter().collect()
    }

    /// Flush loop. Each non-empty batch is published from a short-lived
    /// child task so a slow remote store cannot delay the next wakeup;
    /// children are joined before the loop exits.
    pub(crate) async fn aggregate(
        self: Arc<Self>,
        store: Arc<dyn RemoteStore>,
        mut pressure: mpsc::Receiver<()>,
        shutdown: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(FLUSH_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut publishes: JoinSet<()> = JoinSet::new();

        loop {
            while publishes.try_join_next().is_some() {}

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
                _ = pressure.recv() => {}
            }

            let keys = self.drain();
            if keys.is_empty() {
                continue;
            }
            let payload = encode_batch(&self.id, &keys);
            let store = Arc::clone(&store);
            publishes.spawn(async move {
                if let Err(err) = store.publish(INVALIDATE_TOPIC, payload).await {
                    warn!(error = %err, "failed to publish invalidation batch");
                }
            });
        }

        while publishes.join_next().await.is_some() {}
    }
}

/// Builds the wire payload: `id ~|~ key1 ~|~ key2 …`.
fn encode_batch(id: &str, keys: &[String]) -> String {
    let extra: usize = keys.iter().map(|k| k.len() + DELIMITER.len()).sum();
    let mut payload = String::with_capacity(id.len() + extra);
    payload.push_str(id);
    for key in keys {
        payload.push_str(DELIMITER);
        payload.push_str(key);
    }
    payload
}

/// Applies incoming invalidation batches to the local cache until the
/// subscription ends or shutdown is signalled. Batches published by this
/// process are ignored.
pub(crate) async fn listen(
    mut messages: MessageStream,
    id: String,
    local: Arc<dyn LocalCache>,
    stats: Option<MetricSet>,
    shutdown: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            _ = shutdown.cancelled() => break,
            message = messages.next() => message,
        };
        let Some(payload) = message else {
            debug!("invalidation subscription closed");
            break;
        };
        let fields: Vec<&str> = payload.split(DELIMITER).collect();
        if fields.len() < 2 {
            warn!(payload = %payload, "received malformed invalidation payload");
            if let Some(stats) = &stats {
                stats.error(ERR_INVALIDATE);
            }
            continue;
        }
        if fields[0] == id {
            continue;
        }
        for key in &fields[1..] {
            local.del(key.as_bytes()).await;
        }
    }
}
