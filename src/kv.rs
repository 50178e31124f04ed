// src/kv.rs
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use crate::error::Result;
use crate::rdconfig::get_redis_conn;


/// What the tracker needs from an expiring key-value store.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Writes `value` and clears any expiration on the key. When
    /// `expire_at > 0` the key is then set to expire at that unix time.
    async fn set(&self, key: &str, value: &str, expire_at: i64) -> Result<()>;
}


pub struct RedisKv {
    conn: MultiplexedConnection,
}

impl RedisKv {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }

    pub async fn connect(redis_url: &str) -> Result<Self> {
        Ok(Self::new(get_redis_conn(redis_url).await?))
    }
}

#[async_trait]
impl KvStore for RedisKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str, expire_at: i64) -> Result<()> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic().set(key, value).ignore();
        if expire_at > 0 {
            pipe.cmd("EXPIREAT").arg(key).arg(expire_at).ignore();
        }
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }
}


struct Entry {
    value: String,
    expire_at: Option<i64>,
}

impl Entry {
    fn is_expired(&self, now_millis: i64) -> bool {
        matches!(self.expire_at, Some(at) if now_millis > at.saturating_mul(1000))
    }
}

/// In-process store with Redis-like expiry: keys are evicted lazily once
/// their deadline has passed.
#[derive(Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds left before `key` expires, Redis `TTL` style:
    /// -2 if missing, -1 if it has no expiration.
    pub fn ttl(&self, key: &str) -> i64 {
        let now = Utc::now().timestamp_millis();
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => match entry.expire_at {
                Some(at) => at.saturating_mul(1000).saturating_sub(now).max(0) / 1000,
                None => -1,
            },
            _ => -2,
        }
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Utc::now().timestamp_millis();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.get(key).is_some_and(|e| e.is_expired(now)) {
            entries.remove(key);
        }
        Ok(entries.get(key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, expire_at: i64) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expire_at: (expire_at > 0).then_some(expire_at),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_key_is_none() {
        let kv = MemoryKv::new();
        assert_eq!(kv.get("nope").await.unwrap(), None);
        assert_eq!(kv.ttl("nope"), -2);
    }

    #[tokio::test]
    async fn test_set_without_expiry_persists() {
        let kv = MemoryKv::new();
        kv.set("k", "v", 0).await.unwrap();
        assert_eq!(kv.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(kv.ttl("k"), -1);
    }

    #[tokio::test]
    async fn test_past_deadline_evicts() {
        let kv = MemoryKv::new();
        kv.set("k", "v", Utc::now().timestamp() - 5).await.unwrap();
        assert_eq!(kv.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_clears_previous_expiry() {
        let kv = MemoryKv::new();
        let at = Utc::now().timestamp() + 100;
        kv.set("k", "v1", at).await.unwrap();
        assert!(kv.ttl("k") > 90);

        kv.set("k", "v2", 0).await.unwrap();
        assert_eq!(kv.ttl("k"), -1);
        assert_eq!(kv.get("k").await.unwrap().as_deref(), Some("v2"));

        kv.set("k", "v3", at).await.unwrap();
        assert!(kv.ttl("k") > 90);
    }

    #[tokio::test]
    async fn test_far_future_deadline_does_not_overflow() {
        let kv = MemoryKv::new();
        kv.set("k", "v", i64::MAX).await.unwrap();
        assert_eq!(kv.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(kv.ttl("k") > 0);
    }
}
