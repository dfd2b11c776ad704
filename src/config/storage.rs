use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use super::validate_directory;
use crate::Error;
use crate::Result;

/// Sled settings for the watcher store
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    /// Root directory; sled files live under `<db_root_dir>/watcher_store`
    #[serde(default = "default_db_root_dir")]
    pub db_root_dir: PathBuf,

    /// Page cache size in bytes
    #[serde(default = "default_cache_capacity_bytes")]
    pub cache_capacity_bytes: u64,

    /// Background flush interval, 0 disables periodic flushing
    #[serde(default = "default_flush_every_ms")]
    pub flush_every_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_root_dir: default_db_root_dir(),
            cache_capacity_bytes: default_cache_capacity_bytes(),
            flush_every_ms: default_flush_every_ms(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity_bytes == 0 {
            return Err(Error::Config(ConfigError::Message(
                "cache_capacity_bytes must be greater than 0".into(),
            )));
        }
        validate_directory(&self.db_root_dir, "db_root_dir")
    }
}

fn default_db_root_dir() -> PathBuf {
    PathBuf::from("./db")
}
fn default_cache_capacity_bytes() -> u64 {
    64 * 1024 * 1024 //64MB
}
fn default_flush_every_ms() -> u64 {
    50
}
