//! The SSE event bus: per-run broadcast channels for connected clients,
//! with every event mirrored into a bounded cache stream so reconnecting
//! clients can replay what they missed.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use spool_domain::chunk::StreamChunk;
use spool_store::CacheBackend;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

pub fn stream_key(run_id: &str) -> String {
    format!("stream:{run_id}")
}

pub struct EventBus {
    channels: RwLock<HashMap<String, broadcast::Sender<StreamChunk>>>,
    cache: Arc<dyn CacheBackend>,
    max_entries: usize,
    ttl_secs: u64,
}

impl EventBus {
    pub fn new(cache: Arc<dyn CacheBackend>, max_entries: usize, ttl_secs: u64) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            cache,
            max_entries,
            ttl_secs,
        }
    }

    /// Register an SSE subscriber for a run.
    pub fn subscribe(&self, run_id: &str) -> broadcast::Receiver<StreamChunk> {
        let mut channels = self.channels.write();
        channels
            .entry(run_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Broadcast to live subscribers and mirror into the replay stream.
    /// Cache failure never blocks delivery.
    pub async fn publish(&self, chunk: &StreamChunk) {
        let run_id = chunk.run_id().to_string();
        {
            let channels = self.channels.read();
            if let Some(tx) = channels.get(&run_id) {
                let _ = tx.send(chunk.clone());
            }
        }
        if let Err(e) = self
            .cache
            .stream_append(
                &stream_key(&run_id),
                &chunk.to_json(),
                self.max_entries,
                self.ttl_secs,
            )
            .await
        {
            tracing::debug!(run_id, error = %e, "event mirror append failed");
        }
    }

    /// Replay the mirrored stream for a run, oldest first.
    pub async fn replay(&self, run_id: &str) -> Vec<StreamChunk> {
        match self.cache.stream_read(&stream_key(run_id)).await {
            Ok(entries) => entries
                .iter()
                .filter_map(|raw| serde_json::from_str(raw).ok())
                .collect(),
            Err(e) => {
                tracing::debug!(run_id, error = %e, "event replay read failed");
                Vec::new()
            }
        }
    }

    /// Drop the channel once a run is terminal and its last subscriber is
    /// gone.
    pub fn cleanup(&self, run_id: &str) {
        self.channels.write().remove(run_id);
    }

    pub fn subscriber_count(&self, run_id: &str) -> usize {
        self.channels
            .read()
            .get(run_id)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

/// Fan-out handle owned by one run: every chunk goes to the caller's
/// channel and to the bus (subscribers + replay mirror) in emission order.
#[derive(Clone)]
pub struct Emitter {
    pub tx: tokio::sync::mpsc::Sender<StreamChunk>,
    pub bus: Arc<EventBus>,
}

impl Emitter {
    pub async fn emit(&self, chunk: StreamChunk) {
        // A gone caller (disconnected client) does not stop the run;
        // other subscribers and the mirror still receive events.
        let _ = self.tx.send(chunk.clone()).await;
        self.bus.publish(&chunk).await;
    }
}
