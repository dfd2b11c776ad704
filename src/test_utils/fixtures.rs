use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use tempfile::TempDir;

use crate::compiler::query_glyph_watcher_id;
use crate::compiler::semantic_glyph_watcher_id;
use crate::config::StorageConfig;
use crate::model::ActionKind;
use crate::model::Attestation;
use crate::model::Watcher;
use crate::storage::init_sled_storage_db;
use crate::storage::SledWatcherStore;

/// Sled store in a fresh temp dir; keep the dir alive for the test
pub fn setup_sled_store() -> (Arc<SledWatcherStore>, TempDir) {
    let tempdir = tempfile::tempdir().unwrap();
    let db = init_sled_storage_db(tempdir.path(), &StorageConfig::default()).unwrap();
    (Arc::new(SledWatcherStore::new(db).unwrap()), tempdir)
}

/// Standalone watcher of a semantic-source glyph
pub fn semantic_glyph_watcher(
    glyph_id: &str,
    query: &str,
    threshold: f32,
) -> Watcher {
    Watcher::new(
        semantic_glyph_watcher_id(glyph_id),
        format!("semantic {glyph_id}"),
        ActionKind::SemanticMatch,
    )
    .with_similarity(query, threshold)
}

/// Standalone watcher of a query-source glyph
pub fn query_glyph_watcher(
    glyph_id: &str,
    query: &str,
) -> Watcher {
    Watcher::new(
        query_glyph_watcher_id(glyph_id),
        format!("query {glyph_id}"),
        ActionKind::ExecuteGlyph,
    )
    .with_query(query)
}

/// Attestation whose text is `text`
pub fn attestation(
    id: &str,
    text: &str,
    timestamp: DateTime<Utc>,
) -> Attestation {
    Attestation::new(id, timestamp).with_attribute("text", serde_json::Value::String(text.into()))
}

/// Polls `condition` until it holds or `timeout` elapses
pub async fn eventually(
    timeout: Duration,
    mut condition: impl FnMut() -> bool,
) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
