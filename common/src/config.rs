use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::err::ConfigError;

/// Default accumulated-size threshold (bytes) that triggers an event-stream
/// upload. Approximately 10% under 2^19.something; no documented
/// derivation exists upstream. Exposed as a config override per the open
/// question in the design notes.
pub const DEFAULT_BIG_ENOUGH_THRESHOLD: usize = 570_000;

/// Persisted configuration identifying where this database replicates to.
///
/// `replica_write_cap` is treated as an opaque capability string by every
/// component that touches it; only the object-store collaborator (outside
/// this core) interprets it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReplicaConfig {
    pub db_path: PathBuf,
    pub replica_write_cap: String,
    pub big_enough_threshold: Option<usize>,
}

impl ReplicaConfig {
    pub fn new(db_path: PathBuf, replica_write_cap: String) -> Self {
        ReplicaConfig {
            db_path,
            replica_write_cap,
            big_enough_threshold: None,
        }
    }

    pub fn threshold(&self) -> usize {
        self.big_enough_threshold.unwrap_or(DEFAULT_BIG_ENOUGH_THRESHOLD)
    }
}

/// Reads a previously-written config file.
pub fn read_config<P: AsRef<Path>>(path: P) -> Result<ReplicaConfig, ConfigError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
    toml::from_str(&text).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
}

fn write_config<P: AsRef<Path>>(path: P, config: &ReplicaConfig) -> Result<(), ConfigError> {
    let path = path.as_ref();
    let text = toml::to_string_pretty(config)?;
    fs::write(path, text).map_err(|e| ConfigError::Io(path.to_path_buf(), e))
}

/// One-time setup of the replica config file, guarded by an advisory
/// filesystem lock on a sibling `.lock` file so two concurrent setups
/// cannot race to create two divergent remote directories.
///
/// Fails with `ConfigError::AlreadySetup` if the config already exists
/// once the lock is held.
pub fn setup<P: AsRef<Path>>(config_path: P, config: ReplicaConfig) -> Result<(), ConfigError> {
    let config_path = config_path.as_ref();
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| ConfigError::Io(parent.to_path_buf(), e))?;
    }

    let lock_path = config_path.with_extension("lock");
    let lock_file =
        File::create(&lock_path).map_err(|e| ConfigError::Lock(lock_path.clone(), e))?;
    lock_file
        .lock_exclusive()
        .map_err(|e| ConfigError::Lock(lock_path.clone(), e))?;

    let result = if config_path.exists() {
        Err(ConfigError::AlreadySetup(config_path.to_path_buf()))
    } else {
        write_config(config_path, &config)
    };

    // Best-effort: the lock is released when `lock_file` drops regardless.
    let _ = fs2::FileExt::unlock(&lock_file);
    result
}
