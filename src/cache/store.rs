//! Key-value store seam and the in-process implementation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use thiserror::Error;

/// Errors raised by a backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection failed: {0}")]
    Connection(#[from] std::io::Error),

    #[error("store call timed out after {0} ms")]
    Timeout(u64),

    #[error("store protocol error: {0}")]
    Protocol(String),

    #[error("store replied with error: {0}")]
    Server(String),
}

/// TTL-capable key-value store.
///
/// Each call is atomic on its own; callers get no cross-call guarantees.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError>;

    /// Delete keys, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError>;

    async fn flush_all(&self) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
struct StoredValue {
    value: Bytes,
    expires_at: Instant,
}

/// In-process store backed by a concurrent map.
///
/// Expired entries are dropped lazily on read and by [`MemoryStore::purge_expired`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<DashMap<String, StoredValue>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) -> usize {
        let before = self.inner.len();
        let now = Instant::now();
        self.inner.retain(|_, v| v.expires_at > now);
        before - self.inner.len()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let now = Instant::now();
        let expired = match self.inner.get(key) {
            Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.inner.remove_if(key, |_, v| v.expires_at <= now);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError> {
        self.inner.insert(
            key.to_string(),
            StoredValue {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        Ok(keys.iter().filter(|k| self.inner.remove(k.as_str()).is_some()).count() as u64)
    }

    async fn flush_all(&self) -> Result<(), StoreError> {
        self.inner.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete() {
        let store = MemoryStore::new();
        store.set("a", Bytes::from_static(b"1"), Duration::from_secs(60)).await.unwrap();
        store.set("b", Bytes::from_static(b"2"), Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.get("a").await.unwrap(), Some(Bytes::from_static(b"1")));
        assert_eq!(store.delete(&["a".into(), "zzz".into()]).await.unwrap(), 1);
        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.len(), 1);

        store.flush_all().await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn expired_entries_read_as_missing() {
        let store = MemoryStore::new();
        store.set("gone", Bytes::from_static(b"x"), Duration::ZERO).await.unwrap();
        store.set("kept", Bytes::from_static(b"y"), Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.get("gone").await.unwrap(), None);
        assert!(store.get("kept").await.unwrap().is_some());
    }
}
