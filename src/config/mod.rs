// Configuration module entry point
// Loads the process-wide configuration and builds the shared application state

mod state;
mod types;

use std::net::SocketAddr;

use crate::error::StartupError;

// Re-export public types
pub use state::AppState;
pub use types::{
    CompressionConfig, Config, DotfilesPolicy, FilesConfig, LoggingConfig, PerformanceConfig,
    ServerConfig,
};

/// Environment variable naming an alternative config file
pub const CONFIG_PATH_ENV: &str = "STATIC_RESPONDER_CONFIG";

/// Config file looked up in the working directory (any format `config` knows)
const DEFAULT_CONFIG_FILE: &str = "static_responder";

/// Prefix for per-key environment overrides, e.g. `STATIC_RESPONDER_SERVER__PORT`
const ENV_PREFIX: &str = "STATIC_RESPONDER";

impl Config {
    /// Load configuration from the default location
    ///
    /// Uses `$STATIC_RESPONDER_CONFIG` when set, otherwise `static_responder.*`
    /// in the working directory. A missing file is not an error.
    pub fn load() -> Result<Self, ::config::ConfigError> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(&path)
    }

    /// Load configuration from specified file path (without extension)
    pub fn load_from(config_path: &str) -> Result<Self, ::config::ConfigError> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(config_path).required(false))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, StartupError> {
        let addr = format!("{}:{}", self.server.host, self.server.port);
        addr.parse()
            .map_err(|source| StartupError::InvalidAddress { addr, source })
    }
}
