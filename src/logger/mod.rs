//! Logger module
//!
//! Provides logging utilities for the HTTP server including:
//! - Subscriber setup driven by `[logging]` and `RUST_LOG`
//! - Server lifecycle logging
//! - Access logging with multiple formats on the `access` target

mod format;

pub use format::AccessLogEntry;

use std::net::SocketAddr;

use hyper::Version;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{AppState, LoggingConfig};
use crate::error::StartupError;

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over `logging.level` when set. Should be called once at
/// application startup.
pub fn init(config: &LoggingConfig) -> Result<(), StartupError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| StartupError::Logging(e.to_string()))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| StartupError::Logging(e.to_string()))
}

pub fn log_server_start(addr: &SocketAddr, state: &AppState) {
    let config = &state.config;
    tracing::info!("Static server listening on http://{addr}");
    tracing::info!("Serving files from {}", state.root.display());
    if let Some(workers) = config.server.workers {
        tracing::info!("Worker threads: {workers}");
    }
    if config.compression.enabled {
        tracing::info!(
            min_size = config.compression.min_size,
            level = config.compression.level,
            "Compression enabled (gzip, deflate)"
        );
    }
    if config.logging.access_log {
        tracing::info!("Access log format: {}", config.logging.access_log_format);
    }
}

pub fn log_connection_error(peer_addr: &SocketAddr, err: &impl std::fmt::Debug) {
    tracing::warn!(peer = %peer_addr, "Failed to serve connection: {err:?}");
}

/// Log formatted access log entry
pub fn log_access(entry: &AccessLogEntry, format: &str) {
    tracing::info!(target: "access", "{}", entry.format(format));
}

/// Version number as it appears after `HTTP/` in a request line
pub fn http_version_str(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_2 => "2",
        Version::HTTP_3 => "3",
        _ => "1.1",
    }
}
