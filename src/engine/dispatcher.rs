use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::sync::Semaphore;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::ActionInvoker;
use super::DispatchMessage;
use crate::metrics::DISPATCHES;
use crate::metrics::DISPATCH_FAILURES;
use crate::model::EdgeCursor;
use crate::storage::WatcherStore;
use crate::DispatchError;
use crate::Error;
use crate::StorageError;

/// Drains the dispatch queue and runs each action on its own task
pub(crate) struct Dispatcher<S: WatcherStore> {
    store: Arc<S>,
    invoker: Option<Arc<dyn ActionInvoker>>,
    in_flight: Arc<Semaphore>,
}

impl<S: WatcherStore> Dispatcher<S> {
    pub(crate) fn new(
        store: Arc<S>,
        invoker: Option<Arc<dyn ActionInvoker>>,
        max_in_flight: usize,
    ) -> Self {
        Self {
            store,
            invoker,
            in_flight: Arc::new(Semaphore::new(max_in_flight)),
        }
    }

    /// Runs until shutdown is signalled or every sender is gone.
    ///
    /// Queued messages that were not started before shutdown are dropped;
    /// spawned actions run to completion.
    pub(crate) async fn run(
        self,
        mut rx: mpsc::Receiver<DispatchMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("Dispatcher started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    info!("Dispatcher received shutdown signal");
                    break;
                }
                message = rx.recv() => {
                    match message {
                        Some(message) => self.spawn(message).await,
                        None => {
                            debug!("Dispatch queue closed");
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn spawn(
        &self,
        message: DispatchMessage,
    ) {
        let permit = match self.in_flight.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                error!("in-flight semaphore closed: {}", e);
                return;
            }
        };
        let store = self.store.clone();
        let invoker = self.invoker.clone();
        tokio::spawn(async move {
            let _permit = permit;
            execute_dispatch(store.as_ref(), invoker.as_deref(), message).await;
        });
    }
}

/// Invokes one action and records the outcome on the watcher row.
///
/// Success advances the fire counter and, for compiled edges, the edge
/// cursor. Failure increments the error counter and leaves the cursor alone.
pub(crate) async fn execute_dispatch<S: WatcherStore>(
    store: &S,
    invoker: Option<&dyn ActionInvoker>,
    message: DispatchMessage,
) {
    let DispatchMessage {
        watcher,
        attestation,
    } = message;
    let action = watcher.action_kind.as_str();

    let result = match invoker {
        Some(invoker) => invoker.invoke(&watcher, &attestation).await,
        None => Err(DispatchError::NoInvoker.into()),
    };

    match result {
        Ok(()) => {
            DISPATCHES.with_label_values(&[action]).inc();
            trace!(watcher_id = %watcher.id, attestation_id = %attestation.id, "Action succeeded");

            if let Err(e) = store.record_fire(&watcher.id, Utc::now()) {
                log_bookkeeping_error(&watcher.id, "record_fire", e);
            }

            if let Some(edge) = watcher.edge_action() {
                let cursor = EdgeCursor::new(
                    edge.composition_id,
                    edge.source_glyph_id,
                    edge.target_glyph_id,
                    attestation.id.clone(),
                    attestation.timestamp,
                );
                if let Err(e) = store.upsert_cursor(&cursor) {
                    log_bookkeeping_error(&watcher.id, "upsert_cursor", e);
                }
            }
        }
        Err(e) => {
            DISPATCH_FAILURES.with_label_values(&[action]).inc();
            error!(
                watcher_id = %watcher.id,
                attestation_id = %attestation.id,
                action,
                "Action failed: {}",
                e
            );
            if let Err(e) = store.record_error(&watcher.id, &e.to_string()) {
                log_bookkeeping_error(&watcher.id, "record_error", e);
            }
        }
    }
}

fn log_bookkeeping_error(
    watcher_id: &str,
    operation: &str,
    e: Error,
) {
    match e {
        // Watcher removed by a recompile while its action was running
        Error::Storage(StorageError::NotFound(_)) => {
            debug!(watcher_id, operation, "Watcher no longer stored");
        }
        e => warn!(watcher_id, operation, "Dispatch bookkeeping failed: {:?}", e),
    }
}
