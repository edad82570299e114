//! # httpc
//!
//! An async HTTP/1.1 client pipeline with a coalescing response cache.
//!
//! Requests travel through an ordered stack of [`middleware`] and end at a
//! [`Transport`]. [`CacheMiddleware`] answers repeated requests from a
//! pluggable [`Backend`](cache::Backend) (memory, files, sled or Redis) and
//! makes sure concurrent identical misses reach the origin only once.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use httpc::{CacheMiddleware, MemoryStore, Pipeline, Request};
//! use httpc::middleware::LoggerMiddleware;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = Pipeline::new()
//!         .with(LoggerMiddleware)
//!         .with(CacheMiddleware::new(MemoryStore::new()).ttl(Duration::from_secs(300)));
//!
//!     for _ in 0..3 {
//!         let response = pipeline.send(Request::get("http://127.0.0.1:8080/")?).await?;
//!         println!("{} {}", response.status(), response.text()?);
//!     }
//!     Ok(())
//! }
//! ```

// ── Message types and wire format ─────────────────────────────────────────────
pub mod error;
pub mod http;

// ── Request pipeline ──────────────────────────────────────────────────────────
pub mod middleware;
pub mod pipeline;
pub mod transport;

// ── Response cache ────────────────────────────────────────────────────────────
pub mod cache;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use cache::{Backend, CacheMiddleware, CacheOptions, FileStore, MemoryStore};
#[cfg(feature = "redis")]
pub use cache::RedisStore;
#[cfg(feature = "sled")]
pub use cache::SledStore;
pub use error::{Error, Result};
pub use http::{Body, Headers, Method, Request, Response, StatusCode, Version};
pub use pipeline::Pipeline;
pub use transport::{HttpTransport, Transport};
