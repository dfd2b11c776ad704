use lazy_static::lazy_static;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use tokio::sync::watch;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

#[cfg(test)]
mod metrics_test;

lazy_static! {
    pub static ref ATTESTATIONS_EVALUATED: IntCounter = IntCounter::new(
        "meld_attestations_evaluated_total",
        "Attestations run through the active watcher set"
    )
    .expect("metric can not be created");

    pub static ref WATCHER_MATCHES: IntCounterVec = IntCounterVec::new(
        Opts::new("meld_watcher_matches_total", "Watcher matches before rate limiting"),
        &["action"]
    )
    .expect("metric can not be created");

    pub static ref DISPATCHES: IntCounterVec = IntCounterVec::new(
        Opts::new("meld_dispatches_total", "Actions completed successfully"),
        &["action"]
    )
    .expect("metric can not be created");

    pub static ref DISPATCH_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("meld_dispatch_failures_total", "Actions that reported failure"),
        &["action"]
    )
    .expect("metric can not be created");

    pub static ref DISPATCHES_DROPPED: IntCounterVec = IntCounterVec::new(
        Opts::new("meld_dispatches_dropped_total", "Matches dropped before dispatch"),
        &["reason"]
    )
    .expect("metric can not be created");

    pub static ref RATE_LIMITED_FIRES: IntCounter = IntCounter::new(
        "meld_rate_limited_fires_total",
        "Matches skipped by the per-minute fire cap"
    )
    .expect("metric can not be created");

    pub static ref ACTIVE_WATCHERS: IntGauge =
        IntGauge::new("meld_active_watchers", "Watchers in the active set")
            .expect("metric can not be created");

    pub static ref SUPPRESSED_WATCHERS: IntGauge = IntGauge::new(
        "meld_suppressed_watchers",
        "Standalone watchers hidden by a compound watcher"
    )
    .expect("metric can not be created");

    pub static ref COMPILED_SUBSCRIPTIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("meld_compiled_subscriptions_total", "Compiler outcomes per edge"),
        &["outcome"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

pub(crate) fn register_custom_metrics(registry: &Registry) {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(ATTESTATIONS_EVALUATED.clone()),
        Box::new(WATCHER_MATCHES.clone()),
        Box::new(DISPATCHES.clone()),
        Box::new(DISPATCH_FAILURES.clone()),
        Box::new(DISPATCHES_DROPPED.clone()),
        Box::new(RATE_LIMITED_FIRES.clone()),
        Box::new(ACTIVE_WATCHERS.clone()),
        Box::new(SUPPRESSED_WATCHERS.clone()),
        Box::new(COMPILED_SUBSCRIPTIONS.clone()),
    ];
    for collector in collectors {
        if let Err(e) = registry.register(collector) {
            tracing::debug!("collector not registered: {}", e);
        }
    }
}

/// Serves `GET /metrics` until `shutdown_signal` changes or its sender is dropped
pub async fn start_server(
    port: u16,
    mut shutdown_signal: watch::Receiver<bool>,
) {
    register_custom_metrics(&REGISTRY);

    let metrics_route = warp::path!("metrics")
        .map(|| REGISTRY.clone())
        .and_then(metrics_handler);

    let bound = warp::serve(metrics_route).try_bind_with_graceful_shutdown(
        ([0, 0, 0, 0], port),
        async move {
            let _ = shutdown_signal.changed().await;
        },
    );
    let (addr, server) = match bound {
        Ok(bound) => bound,
        Err(e) => {
            tracing::error!("metrics server could not bind port {}: {}", port, e);
            return;
        }
    };
    tracing::info!("metrics server listening on {}", addr);
    server.await;
}

async fn metrics_handler(registry: Registry) -> Result<impl Reply, Rejection> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        tracing::error!("could not encode custom metrics: {}", e);
    };
    let res = match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!("custom metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    };
    Ok(res)
}
