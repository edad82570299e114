//! HTTP/1.1 wire codec for responses (and request heads).
//!
//! A response is encoded as its status line, every header in original order
//! (duplicates included), a blank line and the raw body. The encoding is
//! self-describing: [`decode_response`] recovers status, headers and body
//! using nothing but the bytes and the request the response answers.
//!
//! Body framing on decode follows RFC 9112 §6.3:
//!
//! 1. `HEAD` requests and `1xx`/`204`/`304` statuses have no body.
//! 2. `Transfer-Encoding: chunked` bodies are de-chunked; the headers are then
//!    rewritten to a `Content-Length` so the message re-encodes consistently.
//! 3. `Content-Length` takes exactly that many bytes.
//! 4. Otherwise the body runs to the end of the buffer.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;
use url::Url;

use super::{Body, Headers, InvalidStatusCode, Method, Request, Response, StatusCode, Version};

/// Maximum number of headers accepted in one message head.
pub const MAX_HEADERS: usize = 128;

/// Errors raised while encoding or decoding HTTP messages.
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    #[error("message is incomplete, more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error(transparent)]
    Status(#[from] InvalidStatusCode),

    #[error("invalid Content-Length: {0:?}")]
    InvalidContentLength(String),

    #[error("invalid chunked body")]
    InvalidChunk,

    #[error("body truncated: expected {expected} bytes, found {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("header {name:?} cannot be encoded")]
    InvalidHeader { name: String },

    #[error("message head exceeds maximum allowed size of {max_bytes} bytes")]
    HeadTooLarge { max_bytes: usize },
}

/// How the body following a response head is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Framing {
    Empty,
    Length(usize),
    Chunked,
    UntilClose,
}

/// A parsed status line and header block.
#[derive(Debug, Clone)]
pub(crate) struct ResponseHead {
    pub(crate) version: Version,
    pub(crate) status: StatusCode,
    pub(crate) reason: String,
    pub(crate) headers: Headers,
}

impl ResponseHead {
    /// Decides how the body is delimited, given the method that produced it.
    pub(crate) fn framing(&self, method: &Method) -> Result<Framing, CodecError> {
        if *method == Method::Head || self.status.forbids_body() {
            return Ok(Framing::Empty);
        }
        if is_chunked(&self.headers) {
            return Ok(Framing::Chunked);
        }
        match content_length(&self.headers)? {
            Some(0) => Ok(Framing::Empty),
            Some(len) => Ok(Framing::Length(len)),
            None => Ok(Framing::UntilClose),
        }
    }

    /// Assembles the response, rewriting chunked framing to a `Content-Length`
    /// since the body is now held de-chunked.
    pub(crate) fn into_response(mut self, framing: Framing, body: Bytes, url: Url) -> Response {
        if framing == Framing::Chunked {
            dechunk_headers(&mut self.headers, body.len());
        }
        let mut response = Response::new(self.status)
            .version(self.version)
            .reason_phrase(self.reason)
            .body(Body::from(body))
            .with_url(url);
        *response.headers_mut() = self.headers;
        response
    }
}

/// Parses a status line and header block from the front of `buf`.
///
/// Returns `Ok(None)` when `buf` does not yet hold the complete head, else the
/// head and the offset at which the body begins.
pub(crate) fn parse_head(buf: &[u8]) -> Result<Option<(ResponseHead, usize)>, CodecError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut raw = httparse::Response::new(&mut headers);

    let offset = match raw.parse(buf)? {
        httparse::Status::Complete(offset) => offset,
        httparse::Status::Partial => return Ok(None),
    };

    // httparse fills every field on a complete parse.
    let version = Version::from_minor(raw.version.unwrap_or(1));
    let status = StatusCode::from_u16(raw.code.unwrap_or(0))?;
    let reason = raw.reason.unwrap_or("").to_owned();
    let headers = Headers::from_parsed(raw.headers);

    Ok(Some((
        ResponseHead {
            version,
            status,
            reason,
            headers,
        },
        offset,
    )))
}

/// De-chunks a chunked body from the front of `buf`.
///
/// Returns `Ok(None)` until the terminating zero-size chunk and trailer
/// section are present, else the body and the number of bytes consumed.
pub(crate) fn decode_chunked(buf: &[u8]) -> Result<Option<(Bytes, usize)>, CodecError> {
    let mut body = BytesMut::new();
    let mut pos = 0usize;

    loop {
        let (consumed, size) = match httparse::parse_chunk_size(&buf[pos..])
            .map_err(|_| CodecError::InvalidChunk)?
        {
            httparse::Status::Complete(pair) => pair,
            httparse::Status::Partial => return Ok(None),
        };
        pos += consumed;

        if size == 0 {
            // Skip trailer fields up to the empty line.
            loop {
                let Some(end) = find_crlf(&buf[pos..]) else {
                    return Ok(None);
                };
                pos += end + 2;
                if end == 0 {
                    return Ok(Some((body.freeze(), pos)));
                }
            }
        }

        let size = usize::try_from(size).map_err(|_| CodecError::InvalidChunk)?;
        let chunk_end = pos.checked_add(size).ok_or(CodecError::InvalidChunk)?;
        if buf.len() < chunk_end + 2 {
            return Ok(None);
        }
        body.put_slice(&buf[pos..chunk_end]);
        if &buf[chunk_end..chunk_end + 2] != b"\r\n" {
            return Err(CodecError::InvalidChunk);
        }
        pos = chunk_end + 2;
    }
}

/// Serializes a response into its HTTP/1.1 wire form.
///
/// Headers are written in order with their raw value bytes, so decoding the
/// output with [`decode_response`] yields the same status, headers and body.
/// The one exception is framing: a `Body` is always held de-chunked, so a
/// response still labelled `Transfer-Encoding: chunked` is written with a
/// `Content-Length` instead, as [`decode_response`] itself would produce.
///
/// # Errors
///
/// Returns [`CodecError::InvalidHeader`] if a header name or value (or the
/// reason phrase) would break the message framing.
pub fn encode_response(response: &Response) -> Result<Bytes, CodecError> {
    let reason = response.reason();
    if has_line_break(reason.as_bytes()) {
        return Err(CodecError::InvalidHeader {
            name: ":reason".to_owned(),
        });
    }

    let body = response.body_ref();
    let dechunked;
    let headers = if is_chunked(response.headers()) {
        let mut headers = response.headers().clone();
        dechunk_headers(&mut headers, body.len());
        dechunked = headers;
        &dechunked
    } else {
        response.headers()
    };

    let mut buf = BytesMut::with_capacity(128 + headers.len() * 64 + body.len());

    buf.put_slice(response.http_version().as_str().as_bytes());
    buf.put_slice(format!(" {} {}\r\n", response.status().as_u16(), reason).as_bytes());
    put_headers(&mut buf, headers)?;
    buf.put_slice(b"\r\n");
    buf.put_slice(body.as_bytes());

    Ok(buf.freeze())
}

/// Rebuilds a response from bytes produced by [`encode_response`] (or read
/// off the wire), attributing it to `request`.
///
/// The request decides body framing (a `HEAD` response has no body) and
/// supplies the URL recorded on the response.
///
/// # Errors
///
/// - [`CodecError::Incomplete`]: the head is cut short.
/// - [`CodecError::Truncated`]: fewer body bytes than `Content-Length` says.
/// - [`CodecError::Parse`] and friends: the bytes are not an HTTP response.
pub fn decode_response(data: &[u8], request: &Request) -> Result<Response, CodecError> {
    let (head, offset) = parse_head(data)?.ok_or(CodecError::Incomplete)?;
    let rest = &data[offset..];

    let framing = head.framing(request.method())?;
    let body = match framing {
        Framing::Empty => Bytes::new(),
        Framing::Length(expected) => {
            if rest.len() < expected {
                return Err(CodecError::Truncated {
                    expected,
                    actual: rest.len(),
                });
            }
            Bytes::copy_from_slice(&rest[..expected])
        }
        Framing::Chunked => decode_chunked(rest)?.ok_or(CodecError::Incomplete)?.0,
        Framing::UntilClose => Bytes::copy_from_slice(rest),
    };

    Ok(head.into_response(framing, body, request.url().clone()))
}

/// Serializes a request line, its headers and body.
///
/// Headers are written as held; transports add `Host` and framing headers
/// before calling this.
///
/// # Errors
///
/// Returns [`CodecError::InvalidHeader`] if a header would break framing.
pub fn encode_request(request: &Request) -> Result<Bytes, CodecError> {
    let body = request.body_ref();
    let mut buf = BytesMut::with_capacity(128 + request.headers().len() * 64 + body.len());

    buf.put_slice(
        format!(
            "{} {} {}\r\n",
            request.method(),
            request.target(),
            request.http_version()
        )
        .as_bytes(),
    );
    put_headers(&mut buf, request.headers())?;
    buf.put_slice(b"\r\n");
    buf.put_slice(body.as_bytes());

    Ok(buf.freeze())
}

fn put_headers(buf: &mut BytesMut, headers: &Headers) -> Result<(), CodecError> {
    for (name, value) in headers.iter() {
        let bad_name = name.is_empty()
            || name
                .bytes()
                .any(|b| b == b':' || b.is_ascii_whitespace() || b.is_ascii_control());
        if bad_name || has_line_break(value) {
            return Err(CodecError::InvalidHeader {
                name: name.to_owned(),
            });
        }
        buf.put_slice(name.as_bytes());
        buf.put_slice(b": ");
        buf.put_slice(value);
        buf.put_slice(b"\r\n");
    }
    Ok(())
}

fn has_line_break(value: &[u8]) -> bool {
    value.iter().any(|&b| b == b'\r' || b == b'\n')
}

/// Relabels a de-chunked body with its actual length.
fn dechunk_headers(headers: &mut Headers, len: usize) {
    headers.remove("transfer-encoding");
    headers.set("Content-Length", len.to_string());
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

fn is_chunked(headers: &Headers) -> bool {
    headers
        .get_all("transfer-encoding")
        .last()
        .and_then(|v| v.rsplit(',').next())
        .is_some_and(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
}

fn content_length(headers: &Headers) -> Result<Option<usize>, CodecError> {
    let mut length = None;
    for value in headers.get_all("content-length") {
        for part in value.split(',') {
            let part = part.trim();
            let parsed: usize = part
                .parse()
                .map_err(|_| CodecError::InvalidContentLength(value.to_owned()))?;
            match length {
                Some(existing) if existing != parsed => {
                    return Err(CodecError::InvalidContentLength(value.to_owned()));
                }
                _ => length = Some(parsed),
            }
        }
    }
    Ok(length)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(url: &str) -> Request {
        Request::get(url).unwrap()
    }

    #[test]
    fn round_trip_preserves_order_and_duplicates() {
        let response = Response::new(StatusCode::CREATED)
            .header("Set-Cookie", "a=1")
            .header("Content-Type", "text/plain")
            .header("Set-Cookie", "b=2")
            .body("Hello, 0");

        let bytes = encode_response(&response).unwrap();
        let decoded = decode_response(&bytes, &get("http://example.com/")).unwrap();

        assert_eq!(decoded.status(), StatusCode::CREATED);
        assert_eq!(decoded.headers(), response.headers());
        assert_eq!(decoded.body_ref().as_bytes(), b"Hello, 0");
        assert_eq!(decoded.url().map(Url::as_str), Some("http://example.com/"));
    }

    #[test]
    fn encoding_is_byte_exact() {
        let wire = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nX-A: 1\r\nX-A: 2\r\n\r\nhello";
        let decoded = decode_response(wire, &get("http://example.com/")).unwrap();
        let encoded = encode_response(&decoded).unwrap();
        assert_eq!(&encoded[..], &wire[..]);
    }

    #[test]
    fn obs_text_header_bytes_round_trip() {
        let wire = b"HTTP/1.1 200 OK\r\nX-Name: caf\xe9\r\nContent-Length: 2\r\n\r\nok";
        let decoded = decode_response(wire, &get("http://example.com/")).unwrap();
        assert_eq!(decoded.headers().get_bytes("x-name"), Some(&b"caf\xe9"[..]));

        let encoded = encode_response(&decoded).unwrap();
        assert_eq!(&encoded[..], &wire[..]);
    }

    #[test]
    fn stale_chunked_label_is_rewritten_on_encode() {
        let response = Response::new(StatusCode::OK)
            .header("Transfer-Encoding", "chunked")
            .header("X-Kept", "1")
            .body("already plain");

        let bytes = encode_response(&response).unwrap();
        let decoded = decode_response(&bytes, &get("http://example.com/")).unwrap();

        assert_eq!(decoded.text().unwrap(), "already plain");
        assert!(!decoded.headers().contains("transfer-encoding"));
        assert_eq!(decoded.headers().get("content-length"), Some("13"));
        assert_eq!(decoded.headers().get("x-kept"), Some("1"));
    }

    #[test]
    fn empty_body_round_trip() {
        let response = Response::new(StatusCode::NO_CONTENT).header("X-Empty", "yes");
        let bytes = encode_response(&response).unwrap();
        let decoded = decode_response(&bytes, &get("http://example.com/")).unwrap();
        assert!(decoded.body_ref().is_empty());
        assert_eq!(decoded.headers().get("x-empty"), Some("yes"));
    }

    #[test]
    fn large_binary_body_round_trip() {
        let body: Vec<u8> = (0..=255u8).cycle().take(1 << 20).collect();
        let response = Response::new(StatusCode::OK)
            .header("Content-Length", body.len().to_string())
            .body(body.clone());
        let bytes = encode_response(&response).unwrap();
        let decoded = decode_response(&bytes, &get("http://example.com/")).unwrap();
        assert_eq!(decoded.body_ref().as_bytes(), &body[..]);
    }

    #[test]
    fn head_request_has_no_body() {
        let wire = b"HTTP/1.1 200 OK\r\nContent-Length: 42\r\n\r\n";
        let request = Request::new(Method::Head, Url::parse("http://example.com/").unwrap());
        let decoded = decode_response(wire, &request).unwrap();
        assert!(decoded.body_ref().is_empty());
        assert_eq!(decoded.headers().get("content-length"), Some("42"));
    }

    #[test]
    fn chunked_body_is_normalized() {
        let wire = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nX-B: 1\r\n\r\n\
                     5\r\nHello\r\n3\r\n, 0\r\n0\r\nX-Trailer: t\r\n\r\n";
        let decoded = decode_response(wire, &get("http://example.com/")).unwrap();
        assert_eq!(decoded.text().unwrap(), "Hello, 0");
        assert!(!decoded.headers().contains("transfer-encoding"));
        assert_eq!(decoded.headers().get("content-length"), Some("8"));

        let again = decode_response(
            &encode_response(&decoded).unwrap(),
            &get("http://example.com/"),
        )
        .unwrap();
        assert_eq!(again.text().unwrap(), "Hello, 0");
    }

    #[test]
    fn partial_chunked_body_needs_more() {
        assert!(decode_chunked(b"5\r\nHel").unwrap().is_none());
        assert!(decode_chunked(b"5\r\nHello\r\n0\r\n").unwrap().is_none());
        assert!(matches!(
            decode_chunked(b"5\r\nHelloXX"),
            Err(CodecError::InvalidChunk)
        ));
    }

    #[test]
    fn truncated_body_is_an_error() {
        let wire = b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nshort";
        let err = decode_response(wire, &get("http://example.com/")).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Truncated {
                expected: 10,
                actual: 5
            }
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(decode_response(b"not http at all\r\n\r\n", &get("http://x/")).is_err());
        assert!(matches!(
            decode_response(b"HTTP/1.1 200 OK\r\nX-A:", &get("http://x/")),
            Err(CodecError::Incomplete)
        ));
    }

    #[test]
    fn conflicting_content_lengths_are_rejected() {
        let wire = b"HTTP/1.1 200 OK\r\nContent-Length: 1\r\nContent-Length: 2\r\n\r\nab";
        assert!(matches!(
            decode_response(wire, &get("http://x/")),
            Err(CodecError::InvalidContentLength(_))
        ));
    }

    #[test]
    fn header_injection_is_refused() {
        let response = Response::new(StatusCode::OK).header("X-Evil", "a\r\nInjected: 1");
        assert!(matches!(
            encode_response(&response),
            Err(CodecError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn request_encoding() {
        let request = get("http://example.com/a?b=c")
            .header("Host", "example.com")
            .body("xyz");
        let bytes = encode_request(&request).unwrap();
        assert_eq!(
            &bytes[..],
            b"GET /a?b=c HTTP/1.1\r\nHost: example.com\r\n\r\nxyz"
        );
    }
}
