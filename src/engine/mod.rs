//! Reactive match engine.
//!
//! ```text
//! ingestion path (sync):
//!   on_attestation_created() -> actor/time/predicate checks -> rate limit
//!                                  -> try_send(dispatch queue) [never blocks]
//!                                             ↓
//! dispatcher task:
//!   recv() -> acquire in-flight permit -> tokio::spawn(invoke action)
//!                                             ↓
//!   success: record_fire + advance edge cursor | failure: record_error
//! ```
//!
//! The active watcher set is an immutable snapshot behind an `ArcSwap`,
//! replaced wholesale by `reload_watchers`.

mod builder;
mod dispatcher;
mod evaluator;
mod invoker;
mod rate_limiter;
mod watcher_engine;

pub use builder::*;
pub(crate) use dispatcher::*;
pub use evaluator::*;
pub use invoker::*;
pub(crate) use rate_limiter::*;
pub use watcher_engine::*;

#[cfg(test)]
mod rate_limiter_test;

use std::sync::Arc;

use crate::model::Attestation;
use crate::model::Watcher;

/// Published for every match, before the fire cap is applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchEvent {
    pub watcher_id: String,
    pub attestation_id: String,
}

/// Unit of work handed from the matcher to the dispatcher
#[derive(Debug, Clone)]
pub struct DispatchMessage {
    pub watcher: Arc<Watcher>,
    pub attestation: Arc<Attestation>,
}
