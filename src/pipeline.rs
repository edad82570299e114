//! Pipeline composition: an ordered middleware stack around a transport.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::http::{Request, Response};
use crate::middleware::{Middleware, MiddlewareHandler, Next, from_middleware};
use crate::transport::{BoxFuture, HttpTransport, Transport};

/// An ordered chain of middleware wrapped around a terminal [`Transport`].
///
/// Middleware is applied in onion order: the first one registered sees the
/// request first and the response last. A `Pipeline` is itself a
/// [`Transport`], so pipelines nest.
///
/// Cloning is cheap; clones share the same middleware instances (and thus,
/// for example, the same cache).
///
/// # Examples
///
/// ```rust,no_run
/// use std::time::Duration;
/// use httpc::{CacheMiddleware, MemoryStore, Pipeline, Request};
/// use httpc::middleware::LoggerMiddleware;
///
/// # async fn run() -> httpc::Result<()> {
/// let pipeline = Pipeline::new()
///     .with(LoggerMiddleware)
///     .with(CacheMiddleware::new(MemoryStore::new()).ttl(Duration::from_secs(300)));
///
/// let response = pipeline.send(Request::get("http://127.0.0.1:8080/")?).await?;
/// println!("{}", response.text().unwrap_or_default());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Pipeline {
    middlewares: Arc<[MiddlewareHandler]>,
    transport: Arc<dyn Transport>,
}

impl Pipeline {
    /// Creates an empty pipeline over the default [`HttpTransport`].
    pub fn new() -> Self {
        Self::with_transport(HttpTransport::new())
    }

    /// Creates an empty pipeline over the given terminal transport.
    ///
    /// # Arguments
    ///
    /// - `transport`: where requests go once every middleware has run. Any
    ///   [`Transport`] works, including another `Pipeline` or a closure
    ///   wrapped with [`transport_fn`](crate::transport::transport_fn).
    ///
    /// # Examples
    ///
    /// ```
    /// use httpc::{Pipeline, Response, StatusCode};
    /// use httpc::transport::transport_fn;
    ///
    /// let canned = transport_fn(|_request| async { Ok(Response::new(StatusCode::OK)) });
    /// let pipeline = Pipeline::with_transport(canned);
    /// assert!(pipeline.is_empty());
    /// ```
    pub fn with_transport(transport: impl Transport) -> Self {
        Self {
            middlewares: Arc::from(Vec::new()),
            transport: Arc::new(transport),
        }
    }

    /// Appends a middleware to the end of the chain (closest to the transport).
    ///
    /// # Arguments
    ///
    /// - `middleware`: the [`Middleware`] to add. It is shared, not copied,
    ///   by clones of the returned pipeline.
    ///
    /// # Returns
    ///
    /// The pipeline with `middleware` as its innermost layer.
    #[must_use]
    pub fn with<M>(self, middleware: M) -> Self
    where
        M: Middleware + 'static,
    {
        self.with_handler(from_middleware(Arc::new(middleware)))
    }

    /// Appends an already type-erased handler, e.g. from
    /// [`middleware_fn`](crate::middleware::middleware_fn).
    #[must_use]
    pub fn with_handler(mut self, handler: MiddlewareHandler) -> Self {
        let mut middlewares = self.middlewares.to_vec();
        middlewares.push(handler);
        self.middlewares = middlewares.into();
        self
    }

    /// Returns the number of middleware in the chain.
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Returns `true` if requests go straight to the transport.
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Sends `request` through every middleware and the transport.
    ///
    /// # Arguments
    ///
    /// - `request`: the outgoing request. A deadline set with
    ///   [`Request::timeout`] is enforced by the cache and the transport.
    ///
    /// # Returns
    ///
    /// The [`Response`] produced by the first layer that answers: a
    /// middleware that short-circuits (such as a cache hit), or else the
    /// transport.
    ///
    /// # Errors
    ///
    /// Whatever the middleware or transport fail with; see [`Error`](crate::Error).
    pub async fn send(&self, request: Request) -> Result<Response> {
        Next::new(Arc::clone(&self.middlewares), Arc::clone(&self.transport))
            .run(request)
            .await
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("middlewares", &self.middlewares.len())
            .finish_non_exhaustive()
    }
}

impl Transport for Pipeline {
    fn round_trip(&self, request: Request) -> BoxFuture<Result<Response>> {
        let pipeline = self.clone();
        Box::pin(async move { pipeline.send(request).await })
    }
}
