//! Redis implementation of [`CacheBackend`] over a shared
//! `ConnectionManager` (auto-reconnecting, cheap to clone).

use redis::streams::StreamRangeReply;
use redis::AsyncCommands;
use spool_domain::{Error, Result};

use crate::cache::CacheBackend;

pub struct RedisCache {
    manager: redis::aio::ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| Error::Cache(e.to_string()))?;
        let manager = redis::aio::ConnectionManager::new(client)
            .await
            .map_err(|e| Error::Cache(e.to_string()))?;
        Ok(Self { manager })
    }

    fn conn(&self) -> redis::aio::ConnectionManager {
        self.manager.clone()
    }
}

fn cache_err(e: redis::RedisError) -> Error {
    Error::Cache(e.to_string())
}

#[async_trait::async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.conn().get(key).await.map_err(cache_err)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut conn = self.conn();
        if ttl_secs == 0 {
            conn.set::<_, _, ()>(key, value).await.map_err(cache_err)
        } else {
            conn.set_ex::<_, _, ()>(key, value, ttl_secs)
                .await
                .map_err(cache_err)
        }
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.conn().del::<_, ()>(key).await.map_err(cache_err)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.conn().exists(key).await.map_err(cache_err)
    }

    async fn rpush_capped(&self, key: &str, value: &str, cap: usize) -> Result<()> {
        let mut conn = self.conn();
        conn.rpush::<_, _, ()>(key, value).await.map_err(cache_err)?;
        // Keep the trailing `cap` entries.
        conn.ltrim::<_, ()>(key, -(cap as isize), -1)
            .await
            .map_err(cache_err)
    }

    async fn lrange_all(&self, key: &str) -> Result<Vec<String>> {
        self.conn().lrange(key, 0, -1).await.map_err(cache_err)
    }

    async fn stream_append(
        &self,
        key: &str,
        payload: &str,
        maxlen: usize,
        ttl_secs: u64,
    ) -> Result<()> {
        let mut conn = self.conn();
        redis::cmd("XADD")
            .arg(key)
            .arg("MAXLEN")
            .arg("~")
            .arg(maxlen)
            .arg("*")
            .arg("data")
            .arg(payload)
            .query_async::<()>(&mut conn)
            .await
            .map_err(cache_err)?;
        if ttl_secs > 0 {
            conn.expire::<_, ()>(key, ttl_secs as i64)
                .await
                .map_err(cache_err)?;
        }
        Ok(())
    }

    async fn stream_read(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn();
        let reply: StreamRangeReply = conn.xrange_all(key).await.map_err(cache_err)?;
        let mut out = Vec::with_capacity(reply.ids.len());
        for entry in reply.ids {
            if let Some(data) = entry.get::<String>("data") {
                out.push(data);
            }
        }
        Ok(out)
    }
}
