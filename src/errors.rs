//! Error hierarchy for the watcher engine and the composition compiler.
//!
//! Errors are grouped by the layer that raises them: persistence, rule
//! compilation, action dispatch and predicate evaluation. Only storage and
//! configuration failures are meant to reach callers; compile-time resolution
//! problems and dispatch failures are logged by policy and never surface on
//! the ingestion path.

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Durable watcher/cursor storage failures
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Configuration loading and validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Composition compilation failures
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// Action dispatch failures
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Query or similarity predicate evaluation failures
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Embedded database errors
    #[error(transparent)]
    Sled(#[from] sled::Error),

    /// Serialization failures for persisted rows
    #[error(transparent)]
    Bincode(#[from] bincode::Error),

    /// `create` was called for an id that already exists
    #[error("Watcher {0} already exists")]
    AlreadyExists(String),

    /// Row-level update on a missing watcher
    #[error("Watcher {0} not found")]
    NotFound(String),

    /// Row changed between read and conditional write
    #[error("Watcher {0} was modified concurrently")]
    Conflict(String),

    /// Watcher violates the predicate invariants
    #[error("Invalid watcher {id}: {reason}")]
    InvalidWatcher { id: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// Composition id cannot be used to derive sound watcher ids
    #[error("Invalid composition id {0:?}: {1}")]
    InvalidComposition(String, &'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// External side effect reported failure
    #[error("Action {action} failed for watcher {watcher_id}: {reason}")]
    ActionFailed {
        watcher_id: String,
        action: &'static str,
        reason: String,
    },

    /// Engine was built without an action invoker
    #[error("No action invoker configured")]
    NoInvoker,

    /// `start` was called outside of a tokio runtime
    #[error("Dispatch requires a running tokio runtime")]
    RuntimeUnavailable,
}

#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    /// Watcher needs an evaluator the engine was not given
    #[error("No {0} evaluator configured")]
    MissingEvaluator(&'static str),

    /// Evaluator rejected the predicate (e.g. unparsable query)
    #[error("Predicate {predicate:?} rejected: {reason}")]
    Rejected { predicate: String, reason: String },
}
