//! Errors surfaced to callers of the pipeline.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::http::codec::CodecError;

/// Errors produced while sending a request through a [`Pipeline`](crate::Pipeline).
///
/// `Error` is `Clone` so that a single failed forward can be handed to every
/// caller that was waiting on it; non-cloneable sources are held behind
/// [`Arc`].
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("URL has no host: {0}")]
    MissingHost(String),

    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("malformed HTTP message: {0}")]
    Codec(#[from] CodecError),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("in-flight request was aborted before completing")]
    Aborted,

    #[error(transparent)]
    Other(Arc<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wraps an arbitrary error, typically from a custom transport.
    pub fn other<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Other(Arc::new(err))
    }

    /// Returns `true` if the caller's deadline elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

/// Shorthand for results whose error type is [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;
