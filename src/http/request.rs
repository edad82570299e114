//! Outbound HTTP requests.

use std::time::Duration;

use bytes::Bytes;
use url::Url;

use super::{Body, Headers, Method, Version};
use crate::error::{Error, Result};

/// An outbound HTTP request addressed by an absolute URL.
///
/// Requests are built with [`Request::new`] (or the [`get`](Self::get) /
/// [`post`](Self::post) shorthands) and decorated with the fluent builder
/// methods. The body is fully buffered; reading it for fingerprinting or
/// logging never consumes it.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use httpc::http::{Method, Request};
///
/// let request = Request::post("http://localhost:8080/items?draft=1")
///     .unwrap()
///     .header("Content-Type", "application/json")
///     .body(r#"{"name":"widget"}"#)
///     .timeout(Duration::from_secs(5));
///
/// assert_eq!(request.method(), &Method::Post);
/// assert_eq!(request.url().query(), Some("draft=1"));
/// assert_eq!(request.body_ref().len(), 17);
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    version: Version,
    headers: Headers,
    body: Body,
    timeout: Option<Duration>,
}

impl Request {
    /// Creates a request with no headers and an empty body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            version: Version::Http11,
            headers: Headers::new(),
            body: Body::empty(),
            timeout: None,
        }
    }

    /// Parses `url` and creates a `GET` request for it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if `url` is not an absolute URL.
    pub fn get(url: &str) -> Result<Self> {
        Ok(Self::new(Method::Get, Url::parse(url)?))
    }

    /// Parses `url` and creates a `POST` request for it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if `url` is not an absolute URL.
    pub fn post(url: &str) -> Result<Self> {
        Ok(Self::new(Method::Post, Url::parse(url)?))
    }

    /// Appends a request header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<Bytes>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets the protocol version written on the request line.
    #[must_use]
    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Sets a deadline for this caller.
    ///
    /// The transport gives up on the exchange once it elapses, and the cache
    /// stops waiting on a shared in-flight forward (which keeps running for
    /// the other waiters).
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the full request URL, query included.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the protocol version.
    pub fn http_version(&self) -> Version {
        self.version
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the request headers for in-place modification by middleware.
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Returns the request body.
    pub fn body_ref(&self) -> &Body {
        &self.body
    }

    /// Returns the caller's deadline, if one was set.
    pub fn deadline(&self) -> Option<Duration> {
        self.timeout
    }

    /// Drops the caller's deadline, for work that must outlive the caller.
    pub(crate) fn without_deadline(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Returns the origin-form request target: path plus `?query`.
    pub fn target(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_owned(),
        }
    }

    /// Returns the `host[:port]` authority used for the `Host` header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingHost`] for URLs without a host.
    pub fn authority(&self) -> Result<String> {
        let host = self
            .url
            .host_str()
            .ok_or_else(|| Error::MissingHost(self.url.to_string()))?;
        Ok(match self.url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_owned(),
        })
    }
}
