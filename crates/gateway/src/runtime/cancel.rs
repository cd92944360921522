//! Per-run cancellation: a local stop token checked at every chunk
//! boundary, plus a cache-key watcher so cancel requests reach runs in
//! any process.
//!
//! The flag lives under `cancel:{run_id}` in the shared cache; a watcher
//! task polls it and flips the local token.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use spool_store::CacheBackend;

/// A cancellation token checked by the run loop.
#[derive(Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Active tokens per run id.
#[derive(Default)]
pub struct CancelMap {
    tokens: Mutex<HashMap<String, CancelToken>>,
}

impl CancelMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, run_id: &str) -> CancelToken {
        let token = CancelToken::new();
        self.tokens
            .lock()
            .insert(run_id.to_string(), token.clone());
        token
    }

    /// Cancel a running run. Returns true if a token was found.
    pub fn cancel(&self, run_id: &str) -> bool {
        match self.tokens.lock().get(run_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, run_id: &str) {
        self.tokens.lock().remove(run_id);
    }

    pub fn is_running(&self, run_id: &str) -> bool {
        self.tokens.lock().contains_key(run_id)
    }
}

pub fn cancel_key(run_id: &str) -> String {
    format!("cancel:{run_id}")
}

/// Request cancellation: write the shared flag (so other processes see
/// it) and flip any local token immediately.
pub async fn request_cancel(cache: &dyn CacheBackend, map: &CancelMap, run_id: &str) {
    if let Err(e) = cache.set_ex(&cancel_key(run_id), "1", 3600).await {
        tracing::warn!(run_id, error = %e, "failed to write cancel flag");
    }
    map.cancel(run_id);
}

/// Spawn the per-run watcher: polls the cache flag until it appears or
/// the returned handle is aborted when the run finishes.
pub fn spawn_cancel_watch(
    cache: Arc<dyn CacheBackend>,
    token: CancelToken,
    run_id: String,
    poll_ms: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let key = cancel_key(&run_id);
        loop {
            if token.is_cancelled() {
                return;
            }
            match cache.exists(&key).await {
                Ok(true) => {
                    tracing::info!(run_id, "cancel flag observed");
                    token.cancel();
                    return;
                }
                Ok(false) => {}
                // Cache trouble never blocks the run; local cancel still works.
                Err(e) => tracing::debug!(run_id, error = %e, "cancel watch poll failed"),
            }
            tokio::time::sleep(std::time::Duration::from_millis(poll_ms)).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use spool_store::MemoryCache;

    #[test]
    fn token_lifecycle() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn token_clone_shares_state() {
        let token = CancelToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn map_register_cancel_remove() {
        let map = CancelMap::new();
        let token = map.register("run_1");
        assert!(map.is_running("run_1"));
        assert!(map.cancel("run_1"));
        assert!(token.is_cancelled());

        map.remove("run_1");
        assert!(!map.is_running("run_1"));
        assert!(!map.cancel("run_1"));
    }

    #[tokio::test]
    async fn request_cancel_sets_flag_and_token() {
        let cache = MemoryCache::new();
        let map = CancelMap::new();
        let token = map.register("run_9");

        request_cancel(&cache, &map, "run_9").await;
        assert!(token.is_cancelled());
        assert!(cache.exists(&cancel_key("run_9")).await.unwrap());
    }

    #[tokio::test]
    async fn watcher_flips_token_on_flag() {
        let cache: Arc<dyn CacheBackend> = Arc::new(MemoryCache::new());
        let token = CancelToken::new();
        let handle = spawn_cancel_watch(cache.clone(), token.clone(), "run_w".into(), 10);

        cache.set_ex(&cancel_key("run_w"), "1", 0).await.unwrap();
        for _ in 0..100 {
            if token.is_cancelled() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(token.is_cancelled());
        let _ = handle.await;
    }

    #[tokio::test]
    async fn watcher_stops_when_token_cancelled_locally() {
        let cache: Arc<dyn CacheBackend> = Arc::new(MemoryCache::new());
        let token = CancelToken::new();
        let handle = spawn_cancel_watch(cache, token.clone(), "run_x".into(), 10);
        token.cancel();
        // The watcher observes the token and exits on its own.
        let _ = tokio::time::timeout(std::time::Duration::from_secs(1), handle).await;
    }
}
