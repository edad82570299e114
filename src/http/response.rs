//! HTTP/1.1 responses received from a transport or rebuilt from the cache.

use bytes::Bytes;
use url::Url;

use super::{Body, Headers, StatusCode, Version};

/// An HTTP/1.1 response with a fully buffered body.
///
/// Responses are cheap to clone: the body is a shared immutable buffer, so
/// every clone can be read in full without affecting the others. This is what
/// lets the cache hand one forwarded response to many concurrent callers.
///
/// # Examples
///
/// ```
/// use httpc::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::OK)
///     .header("Content-Type", "application/json")
///     .body(r#"{"status":"ok"}"#);
///
/// assert_eq!(response.status(), StatusCode::OK);
/// assert_eq!(response.reason(), "OK");
/// assert_eq!(response.text().unwrap(), r#"{"status":"ok"}"#);
/// ```
#[derive(Debug, Clone)]
pub struct Response {
    version: Version,
    status: StatusCode,
    reason: Option<String>,
    headers: Headers,
    body: Body,
    url: Option<Url>,
}

impl Response {
    /// Creates a new response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            version: Version::Http11,
            status,
            reason: None,
            headers: Headers::new(),
            body: Body::empty(),
            url: None,
        }
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<Bytes>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Appends a header in-place. Intended for middleware that receives a
    /// `Response` from downstream and decorates it without consuming it.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<Bytes>) {
        self.headers.append(name, value);
    }

    /// Sets the response body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Overrides the reason phrase written on the status line.
    #[must_use]
    pub fn reason_phrase(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Sets the protocol version of the status line.
    #[must_use]
    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Records the URL of the request this response answers.
    #[must_use]
    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    /// Returns the status code of this response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the reason phrase: the one received on the wire, else the
    /// canonical phrase for the status, else an empty string.
    pub fn reason(&self) -> &str {
        self.reason
            .as_deref()
            .or_else(|| self.status.canonical_reason())
            .unwrap_or("")
    }

    /// Returns the protocol version of the status line.
    pub fn http_version(&self) -> Version {
        self.version
    }

    /// Returns the response headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the response headers for in-place modification.
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Returns the response body.
    pub fn body_ref(&self) -> &Body {
        &self.body
    }

    /// Consumes the response and returns its body.
    pub fn into_body(self) -> Body {
        self.body
    }

    /// Returns the URL of the request this response answers, if known.
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// Interprets the body as UTF-8 text.
    pub fn text(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(self.body.as_bytes())
    }

    /// Deserializes the body as JSON.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(self.body.as_bytes())
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}
