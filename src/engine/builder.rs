//! Engine construction.
//!
//! ```ignore
//! let engine = EngineBuilder::open(&MeldConfig::new()?)?
//!     .query_evaluator(Arc::new(MyQueryEvaluator))
//!     .similarity_evaluator(Arc::new(MyEmbeddings))
//!     .action_invoker(Arc::new(HttpInvoker::new()))
//!     .build();
//! engine.start()?;
//! ```

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::debug;

use super::ActionInvoker;
use super::ActiveSet;
use super::Engine;
use super::QueryEvaluator;
use super::RateLimiter;
use super::SimilarityEvaluator;
use crate::config::EngineConfig;
use crate::config::MeldConfig;
use crate::config::MonitoringConfig;
use crate::storage::init_sled_storage_db;
use crate::storage::SledWatcherStore;
use crate::storage::WatcherStore;
use crate::Result;

pub struct EngineBuilder<S: WatcherStore> {
    store: Arc<S>,
    config: EngineConfig,
    monitoring: MonitoringConfig,
    query_evaluator: Option<Arc<dyn QueryEvaluator>>,
    similarity_evaluator: Option<Arc<dyn SimilarityEvaluator>>,
    invoker: Option<Arc<dyn ActionInvoker>>,
}

impl EngineBuilder<SledWatcherStore> {
    /// Validates `config` and opens the sled watcher store it names
    pub fn open(config: &MeldConfig) -> Result<Self> {
        let config = config.clone().validate()?;
        let db = init_sled_storage_db(&config.storage.db_root_dir, &config.storage)?;
        let store = SledWatcherStore::new(db)?;
        Ok(Self::new(Arc::new(store))
            .config(config.engine)
            .monitoring(config.monitoring))
    }
}

impl<S: WatcherStore> EngineBuilder<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            config: EngineConfig::default(),
            monitoring: MonitoringConfig::default(),
            query_evaluator: None,
            similarity_evaluator: None,
            invoker: None,
        }
    }

    pub fn config(
        mut self,
        config: EngineConfig,
    ) -> Self {
        self.config = config;
        self
    }

    /// Metrics exporter settings applied on [`Engine::start`]
    pub fn monitoring(
        mut self,
        monitoring: MonitoringConfig,
    ) -> Self {
        self.monitoring = monitoring;
        self
    }

    pub fn query_evaluator(
        mut self,
        evaluator: Arc<dyn QueryEvaluator>,
    ) -> Self {
        self.query_evaluator = Some(evaluator);
        self
    }

    pub fn similarity_evaluator(
        mut self,
        evaluator: Arc<dyn SimilarityEvaluator>,
    ) -> Self {
        self.similarity_evaluator = Some(evaluator);
        self
    }

    pub fn action_invoker(
        mut self,
        invoker: Arc<dyn ActionInvoker>,
    ) -> Self {
        self.invoker = Some(invoker);
        self
    }

    /// Builds a stopped engine with an empty active set.
    ///
    /// Nothing is spawned until [`Engine::start`].
    pub fn build(self) -> Arc<Engine<S>> {
        debug!("Building engine with {:?}", self.config);

        let (dispatch_tx, dispatch_rx) = mpsc::channel(self.config.dispatch_queue_size);
        let (match_tx, _) = broadcast::channel(self.config.match_broadcast_capacity);
        let (shutdown_tx, _) = watch::channel(false);

        Arc::new(Engine {
            store: self.store,
            rate_limiter: RateLimiter::new(Duration::from_secs(self.config.rate_window_secs)),
            config: self.config,
            monitoring: self.monitoring,
            query_evaluator: self.query_evaluator,
            similarity_evaluator: self.similarity_evaluator,
            invoker: self.invoker,
            active: ArcSwap::from_pointee(ActiveSet::default()),
            reload_lock: Mutex::new(()),
            dispatch_tx,
            dispatch_rx: Mutex::new(Some(dispatch_rx)),
            match_tx,
            shutdown_tx,
            dispatching: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }
}
