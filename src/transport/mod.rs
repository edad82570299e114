//! Terminal transports: the innermost layer of a [`Pipeline`](crate::Pipeline).
//!
//! A [`Transport`] performs the actual exchange for a request. The crate ships
//! [`HttpTransport`], a plain HTTP/1.1 client over Tokio TCP streams, and
//! [`transport_fn`] for adapting an async closure (stub origins in tests,
//! in-process services, alternative clients).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Result;
use crate::http::{Request, Response};

mod http1;

pub use self::http1::HttpTransport;

/// A pinned, boxed, `Send` future as returned by transports and middleware.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Sends a request and produces its response.
///
/// Implementations must be shareable across Tokio tasks; the returned future
/// owns everything it needs so that callers can spawn it.
pub trait Transport: Send + Sync + 'static {
    /// Performs one request/response exchange.
    fn round_trip(&self, request: Request) -> BoxFuture<Result<Response>>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn round_trip(&self, request: Request) -> BoxFuture<Result<Response>> {
        (**self).round_trip(request)
    }
}

/// A [`Transport`] backed by an async closure. Built with [`transport_fn`].
#[derive(Clone)]
pub struct TransportFn<F> {
    f: F,
}

/// Adapts an async closure into a [`Transport`].
///
/// # Examples
///
/// ```
/// use httpc::http::{Response, StatusCode};
/// use httpc::transport::transport_fn;
///
/// let origin = transport_fn(|_req| async {
///     Ok(Response::new(StatusCode::OK).body("stub"))
/// });
/// # let _ = origin;
/// ```
pub fn transport_fn<F, Fut>(f: F) -> TransportFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    TransportFn { f }
}

impl<F, Fut> Transport for TransportFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    fn round_trip(&self, request: Request) -> BoxFuture<Result<Response>> {
        Box::pin((self.f)(request))
    }
}
