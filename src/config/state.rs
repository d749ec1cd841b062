// Application state module
// Immutable per-process state shared by every connection

use std::io;
use std::path::PathBuf;

use super::types::Config;
use crate::error::StartupError;

/// Application state
///
/// Built once in `main` and handed to each connection behind an `Arc`.
/// Nothing in here changes after startup.
#[derive(Debug)]
pub struct AppState {
    pub config: Config,
    /// Canonical form of `config.files.root`
    pub root: PathBuf,
}

impl AppState {
    /// Resolve the root directory and freeze the configuration
    pub fn new(config: Config) -> Result<Self, StartupError> {
        let configured = config.files.root.clone();
        let root = configured
            .canonicalize()
            .map_err(|source| StartupError::RootDirectory {
                path: configured.clone(),
                source,
            })?;

        if !root.is_dir() {
            return Err(StartupError::RootDirectory {
                path: configured,
                source: io::Error::other("not a directory"),
            });
        }

        Ok(Self { config, root })
    }
}
