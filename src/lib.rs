//! Static file HTTP server
//!
//! Serves a directory tree over HTTP/1.1 with gzip/deflate compression,
//! conditional and range requests, and a per-path response header policy:
//! paths ending in `.data` get cache-busting headers, everything else gets
//! cross-origin isolation headers.

pub mod config;
pub mod error;
pub mod handler;
pub mod http;
pub mod logger;
pub mod server;
