//! Request fingerprints.
//!
//! The default fingerprint is FNV-1a (64-bit) over the method, the full URL
//! and the body bytes, in that order, rendered as lowercase hex. It only has to
//! keep ordinary traffic apart; it is not collision resistant against an
//! adversary.
//!
//! Hashing borrows the request: the body is an immutable shared buffer, so
//! the request forwarded after fingerprinting is exactly the one hashed.

use std::hash::Hasher;

use async_trait::async_trait;
use fnv::FnvHasher;
use thiserror::Error;

use crate::http::Request;
use crate::http::codec::CodecError;

/// Errors from deriving a cache key. The cache treats any of them as
/// "not cacheable this time" and forwards the request directly.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("{0}")]
    Other(String),
}

/// A strategy for computing the cache key of a request.
///
/// Backends that need control over their keys (the file store names
/// directories after them) supply one; everything else uses [`fingerprint`].
#[async_trait]
pub trait KeyDeriver: Send + Sync {
    /// Computes the key for `request`.
    async fn derive_key(&self, request: &Request) -> Result<String, KeyError>;
}

/// The default [`KeyDeriver`]: [`fingerprint`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Fingerprint;

#[async_trait]
impl KeyDeriver for Fingerprint {
    async fn derive_key(&self, request: &Request) -> Result<String, KeyError> {
        Ok(fingerprint(request))
    }
}

/// Computes the default fingerprint of `request`.
///
/// # Examples
///
/// ```
/// use httpc::cache::key::fingerprint;
/// use httpc::Request;
///
/// let a = Request::get("http://example.com/?page=1").unwrap();
/// let b = Request::get("http://example.com/?page=2").unwrap();
/// assert_eq!(fingerprint(&a), fingerprint(&a.clone()));
/// assert_ne!(fingerprint(&a), fingerprint(&b));
/// ```
pub fn fingerprint(request: &Request) -> String {
    let hash = fnv64a(&[
        request.method().as_str().as_bytes(),
        request.url().as_str().as_bytes(),
        request.body_ref().as_bytes(),
    ]);
    format!("{hash:x}")
}

fn fnv64a(parts: &[&[u8]]) -> u64 {
    let mut hasher = FnvHasher::default();
    for part in parts {
        hasher.write(part);
    }
    hasher.finish()
}
