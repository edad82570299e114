//! Middleware pipeline: composable before/after logic around a transport.
//!
//! This module defines the core types for building an ordered middleware stack.
//! Each middleware wraps the next layer, enabling request inspection,
//! short-circuit responses (a cache hit, for instance) and response decoration
//! without coupling callers to infrastructure concerns.
//!
//! ## Core types
//!
//! - [`Middleware`]: trait implemented by all middleware.
//! - [`Next`]: cursor into the remaining middleware chain; call [`Next::run`] to
//!   advance to the next layer, ending at the terminal [`Transport`].
//! - [`MiddlewareHandler`]: type-erased, cheaply-cloneable middleware function.
//! - [`from_middleware`] / [`middleware_fn`]: build a [`MiddlewareHandler`].
//! - [`LoggerMiddleware`]: built-in request/response logger.

use std::{future::Future, sync::Arc};
use tokio::time::Instant;

use crate::error::Result;
use crate::http::{Request, Response};
use crate::transport::{BoxFuture, Transport};

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is passed to each middleware's [`Middleware::handle`] implementation.
/// Calling [`Next::run`] advances the cursor by one position and invokes the
/// next middleware, or the terminal transport once the chain is exhausted.
///
/// `Next` is consumed on each call to [`run`](Self::run), so it cannot be called
/// more than once per middleware invocation. It owns everything it refers to,
/// so it can be moved into a spawned task.
///
/// # Examples
///
/// ```rust,no_run
/// use httpc::{Request, Response, Result};
/// use httpc::middleware::{Middleware, Next};
/// use httpc::transport::BoxFuture;
///
/// struct PassThrough;
///
/// impl Middleware for PassThrough {
///     fn handle(&self, request: Request, next: Next) -> BoxFuture<Result<Response>> {
///         Box::pin(async move { next.run(request).await })
///     }
/// }
/// ```
pub struct Next {
    middlewares: Arc<[MiddlewareHandler]>,
    // Tracks which middleware to invoke on the next `run` call.
    index: usize,
    transport: Arc<dyn Transport>,
}

/// A type-erased, reference-counted middleware function.
///
/// Every entry in the middleware stack is stored as a `MiddlewareHandler`.
/// The [`Arc`] wrapper makes handlers cheap to clone so that [`Next`] can
/// advance through the chain without copying closures.
pub type MiddlewareHandler =
    Arc<dyn Fn(Request, Next) -> BoxFuture<Result<Response>> + Send + Sync + 'static>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use httpc::middleware::{LoggerMiddleware, from_middleware};
///
/// let handler = from_middleware(Arc::new(LoggerMiddleware));
/// ```
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |request: Request, next: Next| middleware.handle(request, next))
}

/// Converts an async closure into a [`MiddlewareHandler`].
///
/// # Examples
///
/// ```rust,no_run
/// use httpc::middleware::middleware_fn;
///
/// let tag = middleware_fn(|request, next| async move {
///     let mut response = next.run(request).await?;
///     response.add_header("X-Via", "httpc");
///     Ok(response)
/// });
/// ```
pub fn middleware_fn<F, Fut>(f: F) -> MiddlewareHandler
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    Arc::new(
        move |request: Request, next: Next| -> BoxFuture<Result<Response>> {
            Box::pin(f(request, next))
        },
    )
}

impl Next {
    /// Creates a new `Next` positioned at the start of the given middleware stack.
    ///
    /// # Arguments
    ///
    /// - `middlewares`: the ordered list of handlers that make up the pipeline.
    /// - `transport`: the terminal transport invoked after the last handler.
    pub fn new(middlewares: Arc<[MiddlewareHandler]>, transport: Arc<dyn Transport>) -> Self {
        Self {
            middlewares,
            index: 0,
            transport,
        }
    }

    /// Invokes the next middleware in the chain and returns its response.
    ///
    /// Advances the internal cursor by one, clones the handler at the current
    /// position, and awaits it. Once no handler remains the request goes to the
    /// terminal transport.
    pub async fn run(mut self, request: Request) -> Result<Response> {
        if self.index < self.middlewares.len() {
            let handler = self.middlewares[self.index].clone();
            self.index += 1;
            handler(request, self).await
        } else {
            self.transport.round_trip(request).await
        }
    }
}

/// The core trait for all httpc middleware.
///
/// Implementors receive a [`Request`] and a [`Next`] cursor. They may:
///
/// - **Pass through**: call `next.run(request).await` without modification.
/// - **Short-circuit**: return a [`Response`] directly without calling `next`.
/// - **Decorate**: call `next.run(request).await`, inspect the response, and
///   return a modified copy.
///
/// # Contract
///
/// - Implementations **must** be `Send + Sync` because middleware is shared across
///   Tokio tasks.
/// - `handle` **must** return a pinned, `Send` future so it can be awaited across
///   `.await` points in multi-threaded runtimes.
/// - Implementations **should not** hold `&mut` references to shared state across
///   an `.await` point.
pub trait Middleware: Send + Sync {
    /// Handle the request and optionally delegate to the next middleware.
    fn handle(&self, request: Request, next: Next) -> BoxFuture<Result<Response>>;
}

/// Built-in middleware that logs each exchange's method, URL, status, and duration.
///
/// Emits a single `tracing::info!` line after the downstream layers complete,
/// in the format:
///
/// ```text
/// METHOD url - STATUS (duration)
/// ```
///
/// Failed exchanges are logged at `warn` level with the error.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, request: Request, next: Next) -> BoxFuture<Result<Response>> {
        Box::pin(async move {
            let start = Instant::now();
            let method = request.method().to_string();
            let url = request.url().to_string();

            let result = next.run(request).await;

            let duration = start.elapsed();
            match &result {
                Ok(response) => {
                    tracing::info!(
                        "{} {} - {} ({:?})",
                        method,
                        url,
                        response.status().as_u16(),
                        duration
                    );
                }
                Err(e) => {
                    tracing::warn!(error = %e, "{} {} - failed ({:?})", method, url, duration);
                }
            }

            result
        })
    }
}
