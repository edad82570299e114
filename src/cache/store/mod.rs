//! Storage backends for cached responses.
//!
//! A backend is a plain key → bytes store ([`Store`]). Some can also expire
//! entries ([`ExpiringStore`]), and some want to pick their own keys
//! ([`KeyDeriver`]). Those capabilities are captured once, when a concrete
//! store is turned into a [`Backend`] handle, rather than queried per request.
//!
//! | Store             | Expiry | Custom keys |
//! |-------------------|--------|-------------|
//! | [`MemoryStore`]   | yes    | no          |
//! | [`FileStore`]     | no     | yes         |
//! | `SledStore`       | yes    | no          |
//! | `RedisStore`      | yes    | no          |

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use super::key::{Fingerprint, KeyDeriver, KeyError};
use crate::http::Request;

mod file;
mod memory;
#[cfg(feature = "redis")]
mod redis;
#[cfg(feature = "sled")]
mod sled;

pub use file::FileStore;
pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;
#[cfg(feature = "sled")]
pub use self::sled::SledStore;

/// Errors raised by storage backends.
///
/// [`StoreError::NotFound`] is an ordinary cache miss; the cache never
/// surfaces any of these to callers.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache entry not found")]
    NotFound,

    #[error("invalid cache key {0:?}")]
    InvalidKey(String),

    #[error("corrupt cache entry: {0}")]
    Corrupt(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "sled")]
    #[error("sled error: {0}")]
    Sled(#[from] ::sled::Error),

    #[cfg(feature = "redis")]
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

/// A key → bytes store.
#[async_trait]
pub trait Store: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// Returns [`StoreError::NotFound`] when there is none (or it expired).
    async fn get(&self, key: &str) -> Result<Bytes, StoreError>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: Bytes) -> Result<(), StoreError>;
}

/// A [`Store`] that can also write entries which expire after a time-to-live.
#[async_trait]
pub trait ExpiringStore: Store {
    /// Stores `value` under `key` until `ttl` elapses.
    async fn set_with_ttl(&self, key: &str, value: Bytes, ttl: Duration)
    -> Result<(), StoreError>;
}

/// What a [`Backend`] can do beyond plain reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// Writes can carry a time-to-live.
    pub expiry: bool,
    /// The backend chooses cache keys itself.
    pub custom_keys: bool,
}

/// A store together with its resolved capabilities.
///
/// Every bundled store converts into a `Backend` via `From`, so
/// [`CacheMiddleware::new`](crate::cache::CacheMiddleware::new) accepts them
/// directly. Custom stores are wrapped with [`Backend::new`] or
/// [`Backend::expiring`].
///
/// # Examples
///
/// ```
/// use httpc::cache::store::{Backend, FileStore, MemoryStore};
///
/// let memory = Backend::from(MemoryStore::new());
/// assert!(memory.capabilities().expiry);
///
/// let files = Backend::from(FileStore::new("/tmp/httpc-cache"));
/// assert!(!files.capabilities().expiry);
/// assert!(files.capabilities().custom_keys);
/// ```
#[derive(Clone)]
pub struct Backend {
    store: Arc<dyn Store>,
    expiring: Option<Arc<dyn ExpiringStore>>,
    keys: Option<Arc<dyn KeyDeriver>>,
}

impl Backend {
    /// Wraps a store that only supports plain writes.
    pub fn new<S>(store: S) -> Self
    where
        S: Store + 'static,
    {
        Self {
            store: Arc::new(store),
            expiring: None,
            keys: None,
        }
    }

    /// Wraps a store that supports expiring writes.
    pub fn expiring<S>(store: S) -> Self
    where
        S: ExpiringStore + 'static,
    {
        let store = Arc::new(store);
        Self {
            store: Arc::clone(&store) as Arc<dyn Store>,
            expiring: Some(store),
            keys: None,
        }
    }

    /// Derives cache keys with `keys` instead of the default fingerprint.
    #[must_use]
    pub fn with_key_deriver<K>(mut self, keys: K) -> Self
    where
        K: KeyDeriver + 'static,
    {
        self.keys = Some(Arc::new(keys));
        self
    }

    /// Returns what this backend supports.
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            expiry: self.expiring.is_some(),
            custom_keys: self.keys.is_some(),
        }
    }

    /// Computes the cache key for `request`.
    ///
    /// Uses the deriver set with [`with_key_deriver`](Self::with_key_deriver)
    /// if there is one, else [`fingerprint`](crate::cache::fingerprint).
    ///
    /// # Errors
    ///
    /// Whatever the custom deriver fails with. The default fingerprint
    /// never fails.
    pub async fn derive_key(&self, request: &Request) -> Result<String, KeyError> {
        match &self.keys {
            Some(keys) => keys.derive_key(request).await,
            None => Fingerprint.derive_key(request).await,
        }
    }

    /// Reads the entry stored under `key`.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] on a miss (including an expired entry), or
    /// the store's own failure.
    pub async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        self.store.get(key).await
    }

    /// Writes an entry, replacing any previous one.
    ///
    /// # Arguments
    ///
    /// - `key`: the key from [`derive_key`](Self::derive_key).
    /// - `value`: the serialized response.
    /// - `ttl`: how long the entry may live. It is honoured only when the
    ///   backend was built with [`Backend::expiring`]; a plain store, a zero
    ///   duration or `None` all give a write that never expires.
    ///
    /// # Errors
    ///
    /// The store's write failure, such as [`StoreError::InvalidKey`] from a
    /// [`FileStore`] or an I/O error.
    pub async fn put(
        &self,
        key: &str,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        match (ttl, &self.expiring) {
            (Some(ttl), Some(store)) if !ttl.is_zero() => store.set_with_ttl(key, value, ttl).await,
            _ => self.store.set(key, value).await,
        }
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("capabilities", &self.capabilities())
            .finish_non_exhaustive()
    }
}
