//! The shared-cache seam. Every cache the engine relies on (assistant
//! records, thread history lists, web sessions, cancel flags, run event
//! streams) goes through this trait so the Redis deployment and the
//! in-memory test/dev backend are interchangeable.
//!
//! Callers treat every error as a miss: caches are advisory and the
//! authoritative store is always consulted on failure.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use spool_domain::Result;

#[async_trait::async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get a string value.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Set a string value with a TTL. `ttl_secs = 0` means no expiry.
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;

    /// Delete a key (any kind). Missing keys are not an error.
    async fn del(&self, key: &str) -> Result<()>;

    /// True if the key exists (used for cancellation flags).
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Append to a list and trim it to the trailing `cap` entries.
    async fn rpush_capped(&self, key: &str, value: &str, cap: usize) -> Result<()>;

    /// Read the whole list, oldest first.
    async fn lrange_all(&self, key: &str) -> Result<Vec<String>>;

    /// Append to a bounded event stream with a TTL refresh.
    async fn stream_append(
        &self,
        key: &str,
        payload: &str,
        maxlen: usize,
        ttl_secs: u64,
    ) -> Result<()>;

    /// Read the whole stream, oldest first.
    async fn stream_read(&self, key: &str) -> Result<Vec<String>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory backend
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

enum Slot {
    Str(String),
    List(Vec<String>),
    Stream(Vec<String>),
}

struct Entry {
    slot: Slot,
    expires_at: Option<Instant>,
}

impl Entry {
    fn live(&self) -> bool {
        self.expires_at.map_or(true, |t| Instant::now() < t)
    }
}

/// Process-local cache used by tests and cache-less deployments.
/// Single mutex; every operation is a short critical section.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn ttl_to_deadline(ttl_secs: u64) -> Option<Instant> {
        (ttl_secs > 0).then(|| Instant::now() + Duration::from_secs(ttl_secs))
    }
}

#[async_trait::async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(e) if e.live() => {
                if let Slot::Str(s) = &e.slot {
                    return Ok(Some(s.clone()));
                }
                Ok(None)
            }
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                slot: Slot::Str(value.to_string()),
                expires_at: Self::ttl_to_deadline(ttl_secs),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(e) if e.live() => Ok(true),
            Some(_) => {
                entries.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn rpush_capped(&self, key: &str, value: &str, cap: usize) -> Result<()> {
        let mut entries = self.entries.lock();
        let entry = entries.entry(key.to_string()).or_insert(Entry {
            slot: Slot::List(Vec::new()),
            expires_at: None,
        });
        if !entry.live() {
            entry.slot = Slot::List(Vec::new());
            entry.expires_at = None;
        }
        if let Slot::List(list) = &mut entry.slot {
            list.push(value.to_string());
            if list.len() > cap {
                let excess = list.len() - cap;
                list.drain(..excess);
            }
        } else {
            entry.slot = Slot::List(vec![value.to_string()]);
        }
        Ok(())
    }

    async fn lrange_all(&self, key: &str) -> Result<Vec<String>> {
        let entries = self.entries.lock();
        match entries.get(key) {
            Some(e) if e.live() => {
                if let Slot::List(list) = &e.slot {
                    return Ok(list.clone());
                }
                Ok(Vec::new())
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn stream_append(
        &self,
        key: &str,
        payload: &str,
        maxlen: usize,
        ttl_secs: u64,
    ) -> Result<()> {
        let mut entries = self.entries.lock();
        let entry = entries.entry(key.to_string()).or_insert(Entry {
            slot: Slot::Stream(Vec::new()),
            expires_at: None,
        });
        if !entry.live() {
            entry.slot = Slot::Stream(Vec::new());
        }
        entry.expires_at = Self::ttl_to_deadline(ttl_secs);
        if let Slot::Stream(items) = &mut entry.slot {
            items.push(payload.to_string());
            if items.len() > maxlen {
                let excess = items.len() - maxlen;
                items.drain(..excess);
            }
        } else {
            entry.slot = Slot::Stream(vec![payload.to_string()]);
        }
        Ok(())
    }

    async fn stream_read(&self, key: &str) -> Result<Vec<String>> {
        let entries = self.entries.lock();
        match entries.get(key) {
            Some(e) if e.live() => {
                if let Slot::Stream(items) = &e.slot {
                    return Ok(items.clone());
                }
                Ok(Vec::new())
            }
            _ => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn kv_set_get_del() {
        let cache = MemoryCache::new();
        cache.set_ex("k", "v", 0).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        cache.del("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_value_reads_as_miss() {
        let cache = MemoryCache::new();
        cache.set_ex("k", "v", 1).await.unwrap();
        // Force the deadline into the past.
        {
            let mut entries = cache.entries.lock();
            entries.get_mut("k").unwrap().expires_at =
                Some(Instant::now() - Duration::from_secs(1));
        }
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(!cache.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn list_is_capped_to_trailing_entries() {
        let cache = MemoryCache::new();
        for i in 0..10 {
            cache
                .rpush_capped("list", &format!("m{i}"), 5)
                .await
                .unwrap();
        }
        let items = cache.lrange_all("list").await.unwrap();
        assert_eq!(items.len(), 5);
        assert_eq!(items[0], "m5");
        assert_eq!(items[4], "m9");
    }

    #[tokio::test]
    async fn stream_bounded_and_ordered() {
        let cache = MemoryCache::new();
        for i in 0..7 {
            cache
                .stream_append("stream:r1", &format!("e{i}"), 5, 3600)
                .await
                .unwrap();
        }
        let events = cache.stream_read("stream:r1").await.unwrap();
        assert_eq!(events, vec!["e2", "e3", "e4", "e5", "e6"]);
    }

    #[tokio::test]
    async fn exists_tracks_cancel_flag() {
        let cache = MemoryCache::new();
        assert!(!cache.exists("cancel:run_1").await.unwrap());
        cache.set_ex("cancel:run_1", "1", 0).await.unwrap();
        assert!(cache.exists("cancel:run_1").await.unwrap());
    }

    #[tokio::test]
    async fn missing_list_reads_empty() {
        let cache = MemoryCache::new();
        assert!(cache.lrange_all("nope").await.unwrap().is_empty());
        assert!(cache.stream_read("nope").await.unwrap().is_empty());
    }
}
