use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::Instant;

use super::{Backend, ExpiringStore, Store, StoreError};

struct Entry {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// An in-process store backed by a hash map.
///
/// Expired entries are dropped lazily when read, or in bulk with
/// [`purge_expired`](Self::purge_expired). Clones share the same map.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, key: &str, value: Bytes, expires_at: Option<Instant>) {
        self.lock()
            .insert(key.to_owned(), Entry { value, expires_at });
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.is_live(Instant::now()) => Ok(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                Err(StoreError::NotFound)
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        self.insert(key, value, None);
        Ok(())
    }
}

#[async_trait]
impl ExpiringStore for MemoryStore {
    async fn set_with_ttl(
        &self,
        key: &str,
        value: Bytes,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.insert(key, value, Instant::now().checked_add(ttl));
        Ok(())
    }
}

impl From<MemoryStore> for Backend {
    fn from(store: MemoryStore) -> Self {
        Backend::expiring(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_after_set() {
        let store = MemoryStore::new();
        assert!(matches!(store.get("k").await, Err(StoreError::NotFound)));

        store.set("k", Bytes::from_static(b"v1")).await.unwrap();
        store.set("k", Bytes::from_static(b"v2")).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), "v2");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire() {
        let store = MemoryStore::new();
        store
            .set_with_ttl("k", Bytes::from_static(b"v"), Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(store.get("k").await.unwrap(), "v");

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(matches!(store.get("k").await, Err(StoreError::NotFound)));
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_only_expired() {
        let store = MemoryStore::new();
        store.set("forever", Bytes::new()).await.unwrap();
        store
            .set_with_ttl("short", Bytes::new(), Duration::from_secs(1))
            .await
            .unwrap();
        store
            .set_with_ttl("long", Bytes::new(), Duration::from_secs(600))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn clones_share_entries() {
        let store = MemoryStore::new();
        let other = store.clone();
        store.set("k", Bytes::from_static(b"v")).await.unwrap();
        assert_eq!(other.get("k").await.unwrap(), "v");
    }
}
