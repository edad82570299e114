//! Client-side response caching.
//!
//! [`CacheMiddleware`] sits in a [`Pipeline`](crate::Pipeline) and answers
//! requests from a [`Backend`] when it can. On a miss, concurrent identical
//! requests are coalesced so that exactly one of them reaches the rest of the
//! chain; its response is serialized with [`encode_response`] and written
//! back before every waiter receives a copy.
//!
//! Caching is keyed purely by request fingerprint. There is no freshness
//! validation: an entry is served until its backend drops it.
//!
//! The cache fails open. A key that cannot be derived, a store that cannot
//! be read or written, or an entry that cannot be decoded all degrade to
//! forwarding the request; only forward errors and per-caller timeouts ever
//! reach the caller.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::http::codec::{decode_response, encode_response};
use crate::http::{Request, Response};
use crate::middleware::{Middleware, Next};
use crate::transport::BoxFuture;

pub mod key;
pub mod singleflight;
pub mod store;

pub use self::key::{Fingerprint, KeyDeriver, KeyError, fingerprint};
use self::singleflight::Group;
#[cfg(feature = "redis")]
pub use self::store::RedisStore;
#[cfg(feature = "sled")]
pub use self::store::SledStore;
pub use self::store::{
    Backend, Capabilities, ExpiringStore, FileStore, MemoryStore, Store, StoreError,
};

/// Decides whether a request may be served from, and written to, the cache.
pub type Cacheable = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// Serializable cache settings, e.g. loaded from a JSON config file.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use httpc::cache::CacheOptions;
///
/// let options: CacheOptions = serde_json::from_str(r#"{ "ttl_secs": 300 }"#).unwrap();
/// assert_eq!(options.ttl(), Some(Duration::from_secs(300)));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheOptions {
    /// Lifetime of written entries in seconds. Absent or `0` means entries
    /// never expire.
    pub ttl_secs: Option<u64>,
}

impl CacheOptions {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// Middleware that serves responses from a cache and coalesces misses.
///
/// Every response produced by a successful forward is cached, whatever its
/// status. Use [`cacheable`](Self::cacheable) to keep requests out of the
/// cache entirely.
///
/// Clones share the backend and the set of in-flight forwards.
///
/// # Cancellation
///
/// A caller that gives up (its future is dropped, or the deadline set with
/// [`Request::timeout`] elapses) only stops waiting. The forward it started or
/// joined runs to completion on its own task, still writes the cache and
/// still answers the other waiters.
///
/// # Examples
///
/// ```rust,no_run
/// use std::time::Duration;
/// use httpc::{CacheMiddleware, MemoryStore, Pipeline};
///
/// let cache = CacheMiddleware::new(MemoryStore::new())
///     .ttl(Duration::from_secs(300))
///     .cacheable(|request| request.method().is_safe());
///
/// let pipeline = Pipeline::new().with(cache);
/// ```
#[derive(Clone)]
pub struct CacheMiddleware {
    backend: Backend,
    cacheable: Cacheable,
    ttl: Option<Duration>,
    in_flight: Group<Result<Response>>,
}

impl CacheMiddleware {
    /// Creates a cache over `backend` that caches every request and never
    /// expires entries.
    ///
    /// # Arguments
    ///
    /// - `backend`: any bundled store ([`MemoryStore`], [`FileStore`], and
    ///   the sled and Redis stores when their features are on) or a
    ///   [`Backend`] wrapping a custom [`Store`].
    pub fn new(backend: impl Into<Backend>) -> Self {
        Self {
            backend: backend.into(),
            cacheable: Arc::new(|_| true),
            ttl: None,
            in_flight: Group::new(),
        }
    }

    /// Expires written entries after `ttl` on backends that support expiry.
    /// A zero duration disables expiry.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl).filter(|ttl| !ttl.is_zero());
        self
    }

    /// Only caches requests for which `predicate` returns `true`; the rest
    /// bypass the cache completely.
    #[must_use]
    pub fn cacheable<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.cacheable = Arc::new(predicate);
        self
    }

    /// Applies serialized settings.
    #[must_use]
    pub fn with_options(mut self, options: &CacheOptions) -> Self {
        self.ttl = options.ttl();
        self
    }

    /// Reports what the configured backend can do.
    ///
    /// # Returns
    ///
    /// A [`Capabilities`] with `expiry` set when [`ttl`](Self::ttl) will be
    /// honoured, and `custom_keys` set when the backend derives its own keys
    /// instead of using [`fingerprint`].
    pub fn capabilities(&self) -> Capabilities {
        self.backend.capabilities()
    }

    /// The backend this cache reads and writes.
    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Serves `request` from the cache, or forwards it through `next`.
    ///
    /// A deadline set with [`Request::timeout`] is fixed when this call
    /// starts and bounds the whole call: key derivation, the cache read and
    /// the wait for a shared forward all count against it.
    ///
    /// # Arguments
    ///
    /// - `request`: The outgoing request. It is handed to `next` without
    ///   its deadline, so a forward outlives the caller that started it.
    /// - `next`: The rest of the chain, run at most once per key among
    ///   concurrent callers.
    ///
    /// # Errors
    ///
    /// The forward's error, shared by every caller coalesced onto it;
    /// [`Error::Timeout`] when this caller's deadline elapses first; or
    /// [`Error::Aborted`] if the forward task panicked.
    pub async fn process(&self, request: Request, next: Next) -> Result<Response> {
        if !(self.cacheable)(&request) {
            debug!(method = %request.method(), url = %request.url(), "not cacheable, bypassing cache");
            return next.run(request).await;
        }

        let deadline = request
            .deadline()
            .map(|limit| (Instant::now() + limit, limit));

        let key = match within(deadline, self.lookup(&request)).await? {
            Lookup::Hit(response) => return Ok(response),
            Lookup::Miss(key) => key,
            Lookup::NoKey => return within(deadline, next.run(request)).await?,
        };

        let forward = {
            let backend = self.backend.clone();
            let ttl = self.ttl;
            let key = key.clone();
            move || async move {
                let result = next.run(request.without_deadline()).await;
                if let Ok(response) = &result {
                    write_back(&backend, &key, response, ttl).await;
                }
                result
            }
        };

        let shared = self.in_flight.run(&key, forward);
        within(deadline, shared).await?.unwrap_or(Err(Error::Aborted))
    }

    async fn lookup(&self, request: &Request) -> Lookup {
        let key = match self.backend.derive_key(request).await {
            Ok(key) => key,
            Err(e) => {
                warn!(url = %request.url(), error = %e, "failed to derive cache key, forwarding");
                return Lookup::NoKey;
            }
        };

        match self.backend.get(&key).await {
            Ok(data) => match decode_response(&data, request) {
                Ok(response) => {
                    debug!(%key, "cache hit");
                    return Lookup::Hit(response);
                }
                Err(e) => warn!(%key, error = %e, "undecodable cache entry, treating as miss"),
            },
            Err(StoreError::NotFound) => debug!(%key, "cache miss"),
            Err(e) => warn!(%key, error = %e, "cache read failed, treating as miss"),
        }
        Lookup::Miss(key)
    }
}

enum Lookup {
    Hit(Response),
    Miss(String),
    NoKey,
}

/// Runs `fut` until the caller's deadline, if there is one.
async fn within<F: Future>(deadline: Option<(Instant, Duration)>, fut: F) -> Result<F::Output> {
    match deadline {
        Some((at, limit)) => timeout_at(at, fut).await.map_err(|_| Error::Timeout(limit)),
        None => Ok(fut.await),
    }
}

async fn write_back(backend: &Backend, key: &str, response: &Response, ttl: Option<Duration>) {
    let encoded = match encode_response(response) {
        Ok(encoded) => encoded,
        Err(e) => {
            warn!(key, error = %e, "failed to encode response, not caching");
            return;
        }
    };
    match backend.put(key, encoded, ttl).await {
        Ok(()) => debug!(key, ?ttl, "stored response"),
        Err(e) => warn!(key, error = %e, "failed to write cache entry"),
    }
}

impl Middleware for CacheMiddleware {
    fn handle(&self, request: Request, next: Next) -> BoxFuture<Result<Response>> {
        let cache = self.clone();
        Box::pin(async move { cache.process(request, next).await })
    }
}

impl fmt::Debug for CacheMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheMiddleware")
            .field("backend", &self.backend)
            .field("ttl", &self.ttl)
            .field("in_flight", &self.in_flight.in_flight())
            .finish_non_exhaustive()
    }
}
