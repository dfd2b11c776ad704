use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::watch;
use tracing::debug;
use tracing::info;
use tracing::instrument;
use tracing::trace;
use tracing::warn;

use super::ActionInvoker;
use super::DispatchMessage;
use super::Dispatcher;
use super::MatchEvent;
use super::QueryEvaluator;
use super::RateLimiter;
use super::SimilarityEvaluator;
use crate::config::EngineConfig;
use crate::config::MonitoringConfig;
use crate::metrics;
use crate::metrics::ACTIVE_WATCHERS;
use crate::metrics::ATTESTATIONS_EVALUATED;
use crate::metrics::DISPATCHES_DROPPED;
use crate::metrics::RATE_LIMITED_FIRES;
use crate::metrics::SUPPRESSED_WATCHERS;
use crate::metrics::WATCHER_MATCHES;
use crate::model::Attestation;
use crate::model::Watcher;
use crate::storage::SledWatcherStore;
use crate::storage::WatcherStore;
use crate::DispatchError;
use crate::EvaluationError;
use crate::Result;

/// Immutable snapshot of the watchers eligible to match
#[derive(Debug, Default)]
pub(crate) struct ActiveSet {
    pub(crate) watchers: HashMap<String, Arc<Watcher>>,
    pub(crate) suppressed: Vec<String>,
}

/// Matches attestations against the active watcher set and dispatches
/// the actions of matching watchers off the ingestion path.
pub struct Engine<S: WatcherStore> {
    pub(super) store: Arc<S>,
    pub(super) config: EngineConfig,
    pub(super) monitoring: MonitoringConfig,
    pub(super) query_evaluator: Option<Arc<dyn QueryEvaluator>>,
    pub(super) similarity_evaluator: Option<Arc<dyn SimilarityEvaluator>>,
    pub(super) invoker: Option<Arc<dyn ActionInvoker>>,

    pub(super) active: ArcSwap<ActiveSet>,
    /// Serializes reloads; readers never take it
    pub(super) reload_lock: Mutex<()>,
    pub(super) rate_limiter: RateLimiter,

    pub(super) dispatch_tx: mpsc::Sender<DispatchMessage>,
    /// Taken by the dispatcher on `start`
    pub(super) dispatch_rx: Mutex<Option<mpsc::Receiver<DispatchMessage>>>,
    pub(super) match_tx: broadcast::Sender<MatchEvent>,
    pub(super) shutdown_tx: watch::Sender<bool>,
    /// Set once the dispatcher has been spawned
    pub(super) dispatching: AtomicBool,
    pub(super) stopped: AtomicBool,
}

impl<S: WatcherStore> Engine<S> {
    /// Spawns the dispatcher and performs the initial reload.
    ///
    /// Attestations are only matched once this has returned. The metrics
    /// exporter is spawned alongside when `monitoring.prometheus_enabled`
    /// is set and shares the engine's shutdown signal.
    ///
    /// Must be called from within a tokio runtime. Calling it again while
    /// running is a no-op.
    pub fn start(&self) -> Result<()> {
        let handle = Handle::try_current().map_err(|_| DispatchError::RuntimeUnavailable)?;

        if self.is_stopped() {
            debug!("Engine stopped, not starting dispatch");
            return Ok(());
        }

        let Some(rx) = self.dispatch_rx.lock().take() else {
            debug!("Engine already started");
            return Ok(());
        };

        self.reload_watchers()?;

        let dispatcher = Dispatcher::new(
            self.store.clone(),
            self.invoker.clone(),
            self.config.max_in_flight_dispatches,
        );
        handle.spawn(dispatcher.run(rx, self.shutdown_tx.subscribe()));
        self.dispatching.store(true, Ordering::Release);

        if self.monitoring.prometheus_enabled {
            let port = self.monitoring.prometheus_port;
            handle.spawn(metrics::start_server(port, self.shutdown_tx.subscribe()));
        }
        info!("Engine started");
        Ok(())
    }

    /// Stops dispatching new matches. In-flight actions are not cancelled.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.shutdown_tx.send(true);
        info!("Engine stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Started and not yet stopped
    pub fn is_running(&self) -> bool {
        self.dispatching.load(Ordering::Acquire) && !self.is_stopped()
    }

    /// Rebuilds the active set from the store and swaps it in atomically.
    ///
    /// Compiled watchers get their time gate seeded from their edge cursor.
    /// Standalone semantic watchers whose glyph is the target of an enabled
    /// compound watcher are left out for this cycle.
    #[instrument(skip(self))]
    pub fn reload_watchers(&self) -> Result<()> {
        let _guard = self.reload_lock.lock();

        let watchers = self.store.list(false)?;

        let compound_targets: HashSet<String> = watchers
            .iter()
            .filter(|w| w.is_compound())
            .filter_map(|w| w.edge_action())
            .map(|action| action.target_glyph_id)
            .collect();

        let mut active = HashMap::with_capacity(watchers.len());
        let mut suppressed = Vec::new();

        for mut watcher in watchers {
            if let Some(glyph_id) = watcher.standalone_semantic_glyph() {
                if compound_targets.contains(glyph_id) {
                    debug!(watcher_id = %watcher.id, "Suppressed by compound watcher");
                    suppressed.push(watcher.id);
                    continue;
                }
            }

            if let Some(edge) = watcher.edge_action() {
                let cursor = self.store.get_cursor(
                    &edge.composition_id,
                    &edge.source_glyph_id,
                    &edge.target_glyph_id,
                )?;
                if let Some(cursor) = cursor {
                    let start = match watcher.filter.time_start {
                        Some(existing) if existing > cursor.last_processed_at => existing,
                        _ => cursor.last_processed_at,
                    };
                    watcher.filter.time_start = Some(start);
                }
            }

            active.insert(watcher.id.clone(), Arc::new(watcher));
        }

        self.rate_limiter.retain(|id| active.contains_key(id));

        ACTIVE_WATCHERS.set(active.len() as i64);
        SUPPRESSED_WATCHERS.set(suppressed.len() as i64);
        info!(
            active = active.len(),
            suppressed = suppressed.len(),
            "Reloaded watchers"
        );

        suppressed.sort();
        self.active.store(Arc::new(ActiveSet {
            watchers: active,
            suppressed,
        }));
        Ok(())
    }

    /// Evaluates a freshly created attestation against every active watcher.
    ///
    /// Never blocks and never fails: evaluator errors count as a non-match,
    /// a full dispatch queue drops the fire. Returns how many actions were
    /// queued. Before [`Engine::start`] and after [`Engine::stop`] nothing
    /// is evaluated.
    pub fn on_attestation_created(
        &self,
        attestation: &Attestation,
    ) -> usize {
        if !self.is_running() {
            trace!(attestation_id = %attestation.id, "Engine not running, attestation ignored");
            return 0;
        }
        ATTESTATIONS_EVALUATED.inc();

        let active = self.active.load();
        let mut shared: Option<Arc<Attestation>> = None;
        let mut queued = 0;

        for watcher in active.watchers.values() {
            if !self.matches(watcher, attestation) {
                continue;
            }

            WATCHER_MATCHES.with_label_values(&[watcher.action_kind.as_str()]).inc();
            let _ = self.match_tx.send(MatchEvent {
                watcher_id: watcher.id.clone(),
                attestation_id: attestation.id.clone(),
            });

            if watcher.max_fires_per_minute == 0 {
                trace!(watcher_id = %watcher.id, "Fire cap is zero, match not dispatched");
                continue;
            }
            if !self.rate_limiter.try_acquire(&watcher.id, watcher.max_fires_per_minute) {
                RATE_LIMITED_FIRES.inc();
                debug!(
                    watcher_id = %watcher.id,
                    attestation_id = %attestation.id,
                    "Fire cap reached, match dropped"
                );
                continue;
            }

            let attestation = shared.get_or_insert_with(|| Arc::new(attestation.clone())).clone();
            let message = DispatchMessage {
                watcher: watcher.clone(),
                attestation,
            };
            match self.dispatch_tx.try_send(message) {
                Ok(()) => queued += 1,
                Err(TrySendError::Full(message)) => {
                    self.rate_limiter.release(&message.watcher.id);
                    DISPATCHES_DROPPED.with_label_values(&["queue_full"]).inc();
                    warn!(
                        watcher_id = %message.watcher.id,
                        attestation_id = %message.attestation.id,
                        "Dispatch queue full, fire dropped"
                    );
                }
                Err(TrySendError::Closed(message)) => {
                    self.rate_limiter.release(&message.watcher.id);
                    DISPATCHES_DROPPED.with_label_values(&["closed"]).inc();
                    debug!(watcher_id = %message.watcher.id, "Dispatch queue closed");
                }
            }
        }

        queued
    }

    /// Structural filter, primary predicate and compound upstream predicate
    fn matches(
        &self,
        watcher: &Watcher,
        attestation: &Attestation,
    ) -> bool {
        if !watcher.filter.actors.is_empty() && !attestation.has_any_actor(&watcher.filter.actors)
        {
            return false;
        }

        if !watcher.filter.admits(&attestation.timestamp) {
            trace!(
                watcher_id = %watcher.id,
                attestation_id = %attestation.id,
                "Outside time gate, treated as processed history"
            );
            return false;
        }

        let primary = if let Some(query) = &watcher.query {
            self.evaluate_query(watcher, query, attestation)
        } else if let Some(similarity) = &watcher.similarity {
            self.evaluate_similarity(
                watcher,
                &similarity.query,
                similarity.threshold,
                similarity.cluster_id,
                attestation,
            )
        } else {
            true
        };
        if !primary {
            return false;
        }

        match &watcher.upstream_similarity {
            Some(upstream) => self.evaluate_similarity(
                watcher,
                &upstream.query,
                upstream.threshold,
                None,
                attestation,
            ),
            None => true,
        }
    }

    fn evaluate_query(
        &self,
        watcher: &Watcher,
        query: &str,
        attestation: &Attestation,
    ) -> bool {
        let Some(evaluator) = &self.query_evaluator else {
            warn!(watcher_id = %watcher.id, "{}", EvaluationError::MissingEvaluator("query"));
            return false;
        };
        match evaluator.evaluate(query, attestation) {
            Ok(matched) => matched,
            Err(e) => {
                warn!(watcher_id = %watcher.id, "Query evaluation failed: {:?}", e);
                false
            }
        }
    }

    fn evaluate_similarity(
        &self,
        watcher: &Watcher,
        query: &str,
        threshold: f32,
        cluster_id: Option<i64>,
        attestation: &Attestation,
    ) -> bool {
        let Some(evaluator) = &self.similarity_evaluator else {
            warn!(
                watcher_id = %watcher.id,
                "{}",
                EvaluationError::MissingEvaluator("similarity")
            );
            return false;
        };
        let threshold = self.effective_threshold(threshold);
        match evaluator.evaluate(query, threshold, cluster_id, attestation) {
            Ok(matched) => matched,
            Err(e) => {
                warn!(watcher_id = %watcher.id, "Similarity evaluation failed: {:?}", e);
                false
            }
        }
    }

    #[inline]
    pub(crate) fn effective_threshold(
        &self,
        threshold: f32,
    ) -> f32 {
        if threshold > 0.0 {
            threshold
        } else {
            self.config.default_similarity_threshold
        }
    }

    /// Reads the watcher row from the store
    pub fn get_watcher(
        &self,
        id: &str,
    ) -> Result<Option<Watcher>> {
        self.store.get(id)
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Live feed of matches, for UIs
    pub fn subscribe_matches(&self) -> broadcast::Receiver<MatchEvent> {
        self.match_tx.subscribe()
    }

    /// Sorted ids of the watchers in the current active set
    pub fn active_watcher_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.active.load().watchers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn is_active(
        &self,
        id: &str,
    ) -> bool {
        self.active.load().watchers.contains_key(id)
    }

    /// Active copy of a watcher, including its cursor-seeded time gate
    pub fn active_watcher(
        &self,
        id: &str,
    ) -> Option<Arc<Watcher>> {
        self.active.load().watchers.get(id).cloned()
    }

    /// Sorted ids suppressed by the last reload
    pub fn suppressed_watcher_ids(&self) -> Vec<String> {
        self.active.load().suppressed.clone()
    }
}

impl Engine<SledWatcherStore> {
    /// Database handle shared with the rest of the host process
    pub fn db(&self) -> &sled::Db {
        self.store.db()
    }
}

impl<S: WatcherStore> std::fmt::Debug for Engine<S> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("active", &self.active.load().watchers.len())
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

impl<S: WatcherStore> Drop for Engine<S> {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}
