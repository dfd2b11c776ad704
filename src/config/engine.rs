use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::RATE_WINDOW_SECS;
use crate::Error;
use crate::Result;

/// Match engine and dispatch parameters
///
/// ```toml
/// [engine]
/// dispatch_queue_size = 1024
/// max_in_flight_dispatches = 64
/// ```
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EngineConfig {
    /// Bounded queue between the matcher and the dispatch worker.
    /// Matches arriving while the queue is full are dropped, never awaited.
    #[serde(default = "default_dispatch_queue_size")]
    pub dispatch_queue_size: usize,

    /// Upper bound on concurrently running actions
    #[serde(default = "default_max_in_flight_dispatches")]
    pub max_in_flight_dispatches: usize,

    /// Length of the fixed rate limiting window
    #[serde(default = "default_rate_window_secs")]
    pub rate_window_secs: u64,

    /// Threshold used when a stored similarity threshold is not positive
    #[serde(default = "default_similarity_threshold")]
    pub default_similarity_threshold: f32,

    /// Capacity of the live match broadcast channel
    #[serde(default = "default_match_broadcast_capacity")]
    pub match_broadcast_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dispatch_queue_size: default_dispatch_queue_size(),
            max_in_flight_dispatches: default_max_in_flight_dispatches(),
            rate_window_secs: default_rate_window_secs(),
            default_similarity_threshold: default_similarity_threshold(),
            match_broadcast_capacity: default_match_broadcast_capacity(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.dispatch_queue_size == 0 {
            return Err(Error::Config(ConfigError::Message(
                "dispatch_queue_size must be greater than 0".into(),
            )));
        }
        if self.max_in_flight_dispatches == 0 {
            return Err(Error::Config(ConfigError::Message(
                "max_in_flight_dispatches must be greater than 0".into(),
            )));
        }
        if self.rate_window_secs == 0 {
            return Err(Error::Config(ConfigError::Message(
                "rate_window_secs must be greater than 0".into(),
            )));
        }
        if !(self.default_similarity_threshold > 0.0 && self.default_similarity_threshold <= 1.0) {
            return Err(Error::Config(ConfigError::Message(format!(
                "default_similarity_threshold must be in (0, 1], got {}",
                self.default_similarity_threshold
            ))));
        }
        if self.match_broadcast_capacity == 0 {
            return Err(Error::Config(ConfigError::Message(
                "match_broadcast_capacity must be greater than 0".into(),
            )));
        }
        Ok(())
    }
}

fn default_dispatch_queue_size() -> usize {
    1024
}
fn default_max_in_flight_dispatches() -> usize {
    64
}
fn default_rate_window_secs() -> u64 {
    RATE_WINDOW_SECS
}
fn default_similarity_threshold() -> f32 {
    0.3
}
fn default_match_broadcast_capacity() -> usize {
    256
}
