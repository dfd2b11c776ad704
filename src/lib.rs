//! Reactive watcher engine for attestations.
//!
//! - [`storage`]: durable watcher rules and per-edge cursors in sled
//! - [`engine`]: active-set matching with non-blocking dispatch
//! - [`compiler`]: glyph compositions compiled into watcher rules
pub mod compiler;
pub mod config;
pub mod constants;
pub mod engine;
mod errors;
pub mod metrics;
pub mod model;
pub mod storage;

pub use compiler::CompositionCompiler;
pub use config::MeldConfig;
pub use engine::Engine;
pub use engine::EngineBuilder;
pub use errors::*;
pub use storage::SledWatcherStore;
pub use storage::WatcherStore;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
