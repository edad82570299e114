use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use sled::{Db, IVec};

use super::{Backend, ExpiringStore, Store, StoreError};

/// Size of the expiry prefix on every stored value.
const HEADER_LEN: usize = 8;

/// An embedded, persistent store on top of [`sled`].
///
/// Values are stored with an 8-byte big-endian expiry (unix milliseconds,
/// `0` for never) in front of the payload. Expired values are deleted when
/// read.
#[derive(Clone)]
pub struct SledStore {
    db: Db,
}

impl SledStore {
    /// Opens (or creates) a database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self {
            db: sled::open(path)?,
        })
    }

    /// Opens a throwaway database that is removed when dropped.
    pub fn temporary() -> Result<Self, StoreError> {
        Ok(Self {
            db: sled::Config::new().temporary(true).open()?,
        })
    }

    /// Wraps an already opened database.
    pub fn from_db(db: Db) -> Self {
        Self { db }
    }

    /// Flushes dirty pages to disk.
    pub async fn flush(&self) -> Result<(), StoreError> {
        self.db.flush_async().await?;
        Ok(())
    }

    fn insert(&self, key: &str, value: &[u8], expires_at: u64) -> Result<(), StoreError> {
        let mut raw = Vec::with_capacity(HEADER_LEN + value.len());
        raw.extend_from_slice(&expires_at.to_be_bytes());
        raw.extend_from_slice(value);
        self.db.insert(key, raw)?;
        Ok(())
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Splits a stored value into its expiry and payload.
fn unpack(raw: &[u8]) -> Result<(u64, &[u8]), StoreError> {
    if raw.len() < HEADER_LEN {
        return Err(StoreError::Corrupt(format!(
            "sled value is {} bytes, shorter than its header",
            raw.len()
        )));
    }
    let (header, payload) = raw.split_at(HEADER_LEN);
    let mut expires_at = [0u8; HEADER_LEN];
    expires_at.copy_from_slice(header);
    Ok((u64::from_be_bytes(expires_at), payload))
}

#[async_trait]
impl Store for SledStore {
    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        let raw = self.db.get(key)?.ok_or(StoreError::NotFound)?;
        let (expires_at, payload) = unpack(&raw)?;
        if expires_at != 0 && expires_at <= now_millis() {
            // Only delete the value we saw; a concurrent write wins.
            let _ = self
                .db
                .compare_and_swap(key, Some(&raw[..]), None::<IVec>)?;
            return Err(StoreError::NotFound);
        }
        Ok(Bytes::copy_from_slice(payload))
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        self.insert(key, &value, 0)
    }
}

#[async_trait]
impl ExpiringStore for SledStore {
    async fn set_with_ttl(
        &self,
        key: &str,
        value: Bytes,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        self.insert(key, &value, now_millis().saturating_add(ttl_ms))
    }
}

impl From<SledStore> for Backend {
    fn from(store: SledStore) -> Self {
        Backend::expiring(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_values() {
        let store = SledStore::temporary().unwrap();
        assert!(matches!(store.get("k").await, Err(StoreError::NotFound)));

        store.set("k", Bytes::from_static(b"value")).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), "value");

        store
            .set_with_ttl("t", Bytes::from_static(b"ttl"), Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(store.get("t").await.unwrap(), "ttl");
    }

    #[tokio::test]
    async fn expired_values_are_removed() {
        let store = SledStore::temporary().unwrap();
        store.insert("k", b"stale", now_millis() - 1).unwrap();

        assert!(matches!(store.get("k").await, Err(StoreError::NotFound)));
        assert!(store.db.get("k").unwrap().is_none());
    }

    #[tokio::test]
    async fn short_values_are_corrupt() {
        let store = SledStore::temporary().unwrap();
        store.db.insert("k", &b"abc"[..]).unwrap();
        assert!(matches!(store.get("k").await, Err(StoreError::Corrupt(_))));
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SledStore::open(dir.path()).unwrap();
            store.set("k", Bytes::from_static(b"kept")).await.unwrap();
            store.flush().await.unwrap();
        }
        let store = SledStore::open(dir.path()).unwrap();
        assert_eq!(store.get("k").await.unwrap(), "kept");
    }
}
