//! Error types
//!
//! `ServeError` covers everything that can end a single request; each variant
//! maps to one HTTP status. `StartupError` covers the failures that stop the
//! process before it starts accepting connections.

use hyper::StatusCode;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Per-request failure, converted into an HTTP status by the responder
#[derive(Debug, Error)]
pub enum ServeError {
    /// Path could not be decoded or contains a NUL byte
    #[error("malformed request path: {0}")]
    BadRequest(String),

    /// Path escapes the root directory or names a denied dotfile
    #[error("forbidden path: {0}")]
    Forbidden(String),

    /// Nothing servable at this path
    #[error("not found: {0}")]
    NotFound(String),

    /// File exists but could not be read
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ServeError {
    /// HTTP status this error is reported as
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Fatal error raised while starting the server
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("invalid listen address '{addr}': {source}")]
    InvalidAddress {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("root directory {path:?} is not usable: {source}")]
    RootDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build tokio runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("failed to initialise logging: {0}")]
    Logging(String),
}
