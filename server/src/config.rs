use std::{fs::File, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scheduler::DEFAULT_CHUNK_SIZE;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("listen port is required")]
    MissingPort,
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,
}

/// Settings as written in the JSON config file. Every key is optional, the
/// command line fills in or overrides them.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct ConfigFile {
    pub port: Option<u16>,
    pub chunk_size: Option<u64>,
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    /// upper bound on the nonces in a single work unit
    pub chunk_size: u64,
    pub log_file: Option<PathBuf>,
}

impl ServerConfig {
    pub fn resolve(file: ConfigFile, overrides: ConfigFile) -> Result<Self, ConfigError> {
        let port = overrides.port.or(file.port).ok_or(ConfigError::MissingPort)?;
        let chunk_size = overrides.chunk_size.or(file.chunk_size).unwrap_or(DEFAULT_CHUNK_SIZE);
        if chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        Ok(Self { port, chunk_size, log_file: overrides.log_file.or(file.log_file) })
    }
}

pub fn load_config_file<P>(config_file: P) -> Result<ConfigFile, ConfigError>
where
    P: AsRef<Path>, {
    let file = File::open(config_file)?;
    Ok(serde_json::from_reader(file)?)
}
