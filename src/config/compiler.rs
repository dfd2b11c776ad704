use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Defaults stamped on watchers generated from composition edges
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CompilerConfig {
    /// Fire cap of every compiled watcher
    #[serde(default = "default_max_fires_per_minute")]
    pub default_max_fires_per_minute: u32,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            default_max_fires_per_minute: default_max_fires_per_minute(),
        }
    }
}

impl CompilerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.default_max_fires_per_minute == 0 {
            return Err(Error::Config(ConfigError::Message(
                "default_max_fires_per_minute must be greater than 0, compiled edges would never fire".into(),
            )));
        }
        Ok(())
    }
}

fn default_max_fires_per_minute() -> u32 {
    60
}
