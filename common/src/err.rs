use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading, saving, or first-time setting up the
/// replica configuration file (component C10 in the design).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `setup()` was called but a config file already exists at this path.
    #[error("replication is already set up at {0}")]
    AlreadySetup(PathBuf),

    #[error("could not acquire advisory lock on {0}: {1}")]
    Lock(PathBuf, #[source] io::Error),

    #[error("I/O error on {0}: {1}")]
    Io(PathBuf, #[source] io::Error),

    #[error("malformed config file {0}: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Errors raised by an `ObjectStore` collaborator (upload, list, link,
/// unlink against the remote replica directory).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object store entry not found: {0}")]
    NotFound(String),

    #[error("object store I/O error: {0}")]
    Io(String),
}
