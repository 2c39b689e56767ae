//! A forward HTTP/1.x caching proxy.
//!
//! Inbound client connections and outbound origin connections are both driven from a
//! single-threaded `mio` event loop (`session::Engine`). Responses are cached by
//! host+URI with ETag-based conditional revalidation (`response_cache`). Name
//! resolution is blocking by nature, so it runs on a small worker-thread pool
//! (`resolver`) and reports back through the same event loop via a `mio::Waker`.

pub mod cache;
pub mod config;
pub mod error;
pub mod message;
pub mod net;
pub mod resolver;
pub mod response_cache;
pub mod session;

pub use config::Config;
pub use error::{ProxyError, Result};
pub use session::Engine;
