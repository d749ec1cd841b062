// Configuration types module
// Defines all configuration-related data structures

use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure
///
/// Every section falls back to its defaults, so an empty source yields the
/// stock server: port 3000, root = working directory.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub files: FilesConfig,
    pub compression: CompressionConfig,
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
}

/// Server configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            workers: None,
        }
    }
}

/// What to do with path segments that start with a dot
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DotfilesPolicy {
    /// Pretend the file does not exist (404)
    #[default]
    Ignore,
    /// Refuse with 403
    Deny,
    /// Serve like any other file
    Allow,
}

/// Static file resolution settings
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FilesConfig {
    /// Directory all request paths resolve under
    pub root: PathBuf,
    /// Files tried, in order, when a directory is requested
    pub index_files: Vec<String>,
    pub dotfiles: DotfilesPolicy,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            index_files: vec!["index.html".to_string()],
            dotfiles: DotfilesPolicy::Ignore,
        }
    }
}

/// Response compression settings
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CompressionConfig {
    pub enabled: bool,
    /// Bodies shorter than this are sent as-is
    pub min_size: usize,
    /// flate2 level, 0-9
    pub level: u32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_size: 1024,
            level: 6,
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive, overridden by `RUST_LOG`
    pub level: String,
    pub access_log: bool,
    /// Access log format (combined, common, json, or custom pattern)
    pub access_log_format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            access_log: true,
            access_log_format: "combined".to_string(),
        }
    }
}

/// Performance configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PerformanceConfig {
    pub keep_alive: bool,
    /// Seconds a client may take to send a request head, 0 disables it.
    /// Response bodies are never cut off by it.
    pub header_read_timeout: u64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            keep_alive: true,
            header_read_timeout: 30,
        }
    }
}
