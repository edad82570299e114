//! HTTP/1.1 client transport over Tokio TCP streams.
//!
//! Each exchange opens a fresh connection, writes the request with
//! `Connection: close`, and reads one response whose body is framed by
//! `Content-Length`, chunked transfer coding, or connection close.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use super::{BoxFuture, Transport};
use crate::error::{Error, Result};
use crate::http::codec::{self, CodecError, Framing};
use crate::http::{Request, Response};

/// Maximum size of a response head we will buffer before giving up (64 KiB).
const MAX_HEAD_SIZE: usize = 64 * 1024;

/// Initial read buffer capacity per exchange.
const INITIAL_BUF_SIZE: usize = 4096;

/// Plain-`http` HTTP/1.1 client.
///
/// The transport sets `Host`, `Content-Length` (for non-empty bodies) and
/// `Connection: close` unless the request already carries them. A request's
/// own [`timeout`](Request::timeout) bounds the whole exchange; otherwise the
/// transport-wide [`timeout`](Self::timeout), if any, applies.
///
/// `https` URLs are rejected with [`Error::UnsupportedScheme`].
///
/// # Examples
///
/// ```rust,no_run
/// use std::time::Duration;
/// use httpc::{HttpTransport, Pipeline, Request};
///
/// # async fn run() -> httpc::Result<()> {
/// let pipeline = Pipeline::with_transport(
///     HttpTransport::new().timeout(Duration::from_secs(10)),
/// );
/// let response = pipeline.send(Request::get("http://127.0.0.1:8080/")?).await?;
/// println!("{}", response.status());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    timeout: Option<Duration>,
}

impl HttpTransport {
    /// Creates a transport with no default timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds exchanges whose request carries no deadline of its own.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    async fn exchange(request: Request) -> Result<Response> {
        let url = request.url();
        if url.scheme() != "http" {
            return Err(Error::UnsupportedScheme(url.scheme().to_owned()));
        }
        let host = match url.host() {
            Some(url::Host::Domain(domain)) => domain.to_owned(),
            Some(url::Host::Ipv4(addr)) => addr.to_string(),
            Some(url::Host::Ipv6(addr)) => addr.to_string(),
            None => return Err(Error::MissingHost(url.to_string())),
        };
        let port = url.port_or_known_default().unwrap_or(80);

        let outgoing = prepare(&request)?;
        let wire = codec::encode_request(&outgoing)?;

        let mut stream = TcpStream::connect((host.as_str(), port)).await?;
        debug!(host = %host, port, "connection established");

        stream.write_all(&wire).await?;
        stream.flush().await?;

        let response = read_response(&mut stream, &request).await?;
        debug!(
            method = %request.method(),
            url = %request.url(),
            status = response.status().as_u16(),
            "response received"
        );
        Ok(response)
    }
}

impl Transport for HttpTransport {
    fn round_trip(&self, request: Request) -> BoxFuture<Result<Response>> {
        let limit = request.deadline().or(self.timeout);
        Box::pin(async move {
            match limit {
                Some(limit) => tokio::time::timeout(limit, Self::exchange(request))
                    .await
                    .map_err(|_| Error::Timeout(limit))?,
                None => Self::exchange(request).await,
            }
        })
    }
}

/// Adds the headers every outgoing request needs.
fn prepare(request: &Request) -> Result<Request> {
    let mut outgoing = request.clone();
    if !outgoing.headers().contains("host") {
        let authority = request.authority()?;
        outgoing.headers_mut().append("Host", authority);
    }
    let body_len = outgoing.body_ref().len();
    if body_len > 0
        && !outgoing.headers().contains("content-length")
        && !outgoing.headers().contains("transfer-encoding")
    {
        outgoing
            .headers_mut()
            .append("Content-Length", body_len.to_string());
    }
    if !outgoing.headers().contains("connection") {
        outgoing.headers_mut().append("Connection", "close");
    }
    Ok(outgoing)
}

/// Reads one response from `stream`, skipping interim `1xx` responses.
async fn read_response<S>(stream: &mut S, request: &Request) -> Result<Response>
where
    S: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    let head = loop {
        match codec::parse_head(&buf)? {
            Some((head, offset)) => {
                let _ = buf.split_to(offset);
                if head.status.is_informational() && head.status.as_u16() != 101 {
                    continue;
                }
                break head;
            }
            None => {
                if buf.len() > MAX_HEAD_SIZE {
                    return Err(CodecError::HeadTooLarge {
                        max_bytes: MAX_HEAD_SIZE,
                    }
                    .into());
                }
                if stream.read_buf(&mut buf).await? == 0 {
                    return Err(CodecError::Incomplete.into());
                }
            }
        }
    };

    let framing = head.framing(request.method())?;
    let body = match framing {
        Framing::Empty => Bytes::new(),
        Framing::Length(expected) => {
            while buf.len() < expected {
                if stream.read_buf(&mut buf).await? == 0 {
                    return Err(CodecError::Truncated {
                        expected,
                        actual: buf.len(),
                    }
                    .into());
                }
            }
            buf.split_to(expected).freeze()
        }
        Framing::Chunked => {
            // A chunked message can only be complete once a blank line has
            // arrived, so only re-decode when a read brings one in.
            let mut scanned: usize = 0;
            loop {
                if has_blank_line(&buf[scanned.saturating_sub(3)..]) {
                    if let Some((body, _)) = codec::decode_chunked(&buf)? {
                        break body;
                    }
                }
                scanned = buf.len();
                if stream.read_buf(&mut buf).await? == 0 {
                    return Err(CodecError::Incomplete.into());
                }
            }
        }
        Framing::UntilClose => {
            while stream.read_buf(&mut buf).await? != 0 {}
            buf.freeze()
        }
    };

    Ok(head.into_response(framing, body, request.url().clone()))
}

fn has_blank_line(bytes: &[u8]) -> bool {
    bytes.windows(4).any(|w| w == b"\r\n\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Method, StatusCode};

    fn get(url: &str) -> Request {
        Request::get(url).unwrap()
    }

    #[test]
    fn prepare_adds_default_headers() {
        let req = Request::post("http://example.com:8080/submit")
            .unwrap()
            .body("abc");
        let out = prepare(&req).unwrap();
        assert_eq!(out.headers().get("host"), Some("example.com:8080"));
        assert_eq!(out.headers().get("content-length"), Some("3"));
        assert_eq!(out.headers().get("connection"), Some("close"));
    }

    #[test]
    fn prepare_keeps_caller_headers() {
        let req = get("http://example.com/")
            .header("Host", "override.test")
            .header("Connection", "keep-alive");
        let out = prepare(&req).unwrap();
        assert_eq!(out.headers().get_all("host").count(), 1);
        assert_eq!(out.headers().get("host"), Some("override.test"));
        assert_eq!(out.headers().get("connection"), Some("keep-alive"));
        assert!(!out.headers().contains("content-length"));
    }

    #[tokio::test]
    async fn reads_content_length_body() {
        let wire: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhelloEXTRA";
        let mut stream = wire;
        let resp = read_response(&mut stream, &get("http://x/")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.text().unwrap(), "hello");
    }

    #[tokio::test]
    async fn skips_interim_responses() {
        let wire: &[u8] =
            b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 201 Created\r\nContent-Length: 2\r\n\r\nok";
        let mut stream = wire;
        let resp = read_response(&mut stream, &get("http://x/")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(resp.text().unwrap(), "ok");
    }

    #[tokio::test]
    async fn reads_until_close() {
        let wire: &[u8] = b"HTTP/1.0 200 OK\r\nServer: old\r\n\r\nall of it";
        let mut stream = wire;
        let resp = read_response(&mut stream, &get("http://x/")).await.unwrap();
        assert_eq!(resp.text().unwrap(), "all of it");
    }

    #[tokio::test]
    async fn chunked_body_arriving_in_pieces() {
        let (mut writer, mut reader) = tokio::io::duplex(16);
        let sender = tokio::spawn(async move {
            writer
                .write_all(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n")
                .await
                .unwrap();
            for _ in 0..200 {
                writer.write_all(b"5\r\nhello\r\n").await.unwrap();
            }
            // Data that looks like the end of the message must not end it.
            writer.write_all(b"4\r\n\r\n\r\n\r\n").await.unwrap();
            writer.write_all(b"0\r\n\r\n").await.unwrap();
        });

        let resp = read_response(&mut reader, &get("http://x/")).await.unwrap();
        sender.await.unwrap();

        let mut expected = "hello".repeat(200);
        expected.push_str("\r\n\r\n");
        assert_eq!(resp.text().unwrap(), expected);
        assert!(!resp.headers().contains("transfer-encoding"));
        assert_eq!(resp.headers().get("content-length"), Some("1004"));
    }

    #[test]
    fn blank_line_detection() {
        assert!(has_blank_line(b"0\r\n\r\n"));
        assert!(has_blank_line(b"\n\r\n\r\nxyz"));
        assert!(!has_blank_line(b"5\r\nhello\r\n"));
        assert!(!has_blank_line(b"\r\n"));
    }

    #[tokio::test]
    async fn short_body_is_truncated() {
        let wire: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 9\r\n\r\nshort";
        let mut stream = wire;
        let err = read_response(&mut stream, &get("http://x/")).await.unwrap_err();
        assert!(matches!(err, Error::Codec(CodecError::Truncated { .. })));
    }

    #[tokio::test]
    async fn head_response_has_no_body() {
        let wire: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n";
        let mut stream = wire;
        let req = Request::new(Method::Head, url::Url::parse("http://x/").unwrap());
        let resp = read_response(&mut stream, &req).await.unwrap();
        assert!(resp.body_ref().is_empty());
    }

    #[tokio::test]
    async fn https_is_rejected() {
        let err = HttpTransport::new()
            .round_trip(get("https://example.com/"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedScheme(s) if s == "https"));
    }
}
