//! A counting origin server for integration tests.
//!
//! Every request is answered with `Hello, N`, where N is the number of
//! requests the origin had already served, so a test can tell a cached
//! response from a fresh one by its body alone.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How the origin shapes its responses.
#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    /// Pause before answering each request.
    pub delay: Duration,
    /// Send the body with `Transfer-Encoding: chunked`.
    pub chunked: bool,
}

/// A request as the origin saw it.
#[derive(Debug, Clone)]
pub struct Seen {
    pub method: String,
    pub path: String,
    pub body: Vec<u8>,
}

pub struct Origin {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<Seen>>>,
    task: JoinHandle<()>,
}

impl Origin {
    pub async fn start() -> Self {
        Self::with_options(Options::default()).await
    }

    pub async fn with_options(options: Options) -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let task = tokio::spawn({
            let hits = Arc::clone(&hits);
            let seen = Arc::clone(&seen);
            async move {
                loop {
                    let (stream, peer) = match listener.accept().await {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!(error = %e, "origin accept failed");
                            continue;
                        }
                    };
                    let hits = Arc::clone(&hits);
                    let seen = Arc::clone(&seen);
                    tokio::spawn(async move {
                        if let Err(e) = serve(stream, options, hits, seen).await {
                            warn!(%peer, error = %e, "origin connection failed");
                        }
                    });
                }
            }
        });

        Self {
            addr,
            hits,
            seen,
            task,
        }
    }

    /// Absolute URL for `path` on this origin.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Number of requests served so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }
}

impl Drop for Origin {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    mut stream: TcpStream,
    options: Options,
    hits: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<Seen>>>,
) -> std::io::Result<()> {
    let mut buf = BytesMut::with_capacity(4096);

    let request = loop {
        if stream.read_buf(&mut buf).await? == 0 {
            debug!("origin peer closed before sending a request");
            return Ok(());
        }
        let mut headers = [httparse::EMPTY_HEADER; 64];
        let mut parsed = httparse::Request::new(&mut headers);
        let httparse::Status::Complete(offset) = parsed.parse(&buf).map_err(std::io::Error::other)?
        else {
            continue;
        };

        let content_length = parsed
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case("content-length"))
            .and_then(|h| std::str::from_utf8(h.value).ok())
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buf.len() < offset + content_length {
            continue;
        }

        break Seen {
            method: parsed.method.unwrap_or_default().to_owned(),
            path: parsed.path.unwrap_or_default().to_owned(),
            body: buf[offset..offset + content_length].to_vec(),
        };
    };

    let n = hits.fetch_add(1, Ordering::SeqCst);
    debug!(n, method = %request.method, path = %request.path, "origin request");
    seen.lock().unwrap().push(request);

    if !options.delay.is_zero() {
        tokio::time::sleep(options.delay).await;
    }

    let body = format!("Hello, {n}");
    let response = if options.chunked {
        let (first, rest) = body.split_at(body.len() / 2);
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nTransfer-Encoding: chunked\r\n\
             Connection: close\r\n\r\n{:x}\r\n{first}\r\n{:x}\r\n{rest}\r\n0\r\n\r\n",
            first.len(),
            rest.len(),
        )
    } else {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\
             Connection: close\r\n\r\n{body}",
            body.len(),
        )
    };
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

/// Installs a test-friendly subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
