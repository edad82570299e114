use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use super::{Backend, ExpiringStore, Store, StoreError};

/// A store on a Redis server, reached through a reconnecting
/// [`ConnectionManager`].
///
/// Keys are written as `<prefix><key>`; the prefix is empty unless set with
/// [`with_prefix`](Self::with_prefix). Expiry uses Redis' own `PX` option.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisStore {
    /// Connects to the server at `url` (for example `redis://127.0.0.1/`).
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self::from_manager(conn))
    }

    /// Uses an existing connection manager.
    pub fn from_manager(conn: ConnectionManager) -> Self {
        Self {
            conn,
            prefix: String::new(),
        }
    }

    /// Namespaces every key under `prefix`.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

fn namespaced(prefix: &str, key: &str) -> String {
    let mut out = String::with_capacity(prefix.len() + key.len());
    out.push_str(prefix);
    out.push_str(key);
    out
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.get(namespaced(&self.prefix, key)).await?;
        value.map(Bytes::from).ok_or(StoreError::NotFound)
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set(namespaced(&self.prefix, key), &value[..])
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ExpiringStore for RedisStore {
    async fn set_with_ttl(
        &self,
        key: &str,
        value: Bytes,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(namespaced(&self.prefix, key))
            .arg(&value[..])
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

impl From<RedisStore> for Backend {
    fn from(store: RedisStore) -> Self {
        Backend::expiring(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_prefixed() {
        assert_eq!(namespaced("", "abc"), "abc");
        assert_eq!(namespaced("httpc:", "abc"), "httpc:abc");
    }
}
