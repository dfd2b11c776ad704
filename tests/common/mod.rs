use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use meld_engine::compiler::GlyphResolver;
use meld_engine::config::MeldConfig;
use meld_engine::engine::ActionInvoker;
use meld_engine::engine::QueryEvaluator;
use meld_engine::engine::SimilarityEvaluator;
use meld_engine::model::ActionKind;
use meld_engine::model::Attestation;
use meld_engine::model::Glyph;
use meld_engine::model::GlyphKind;
use meld_engine::model::Watcher;
use meld_engine::CompositionCompiler;
use meld_engine::Engine;
use meld_engine::EngineBuilder;
use meld_engine::EvaluationError;
use meld_engine::Result;
use meld_engine::SledWatcherStore;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::mpsc;

/// Matches when the attestation text contains every word of the query
pub struct WordSimilarity;

impl SimilarityEvaluator for WordSimilarity {
    fn evaluate(
        &self,
        query: &str,
        _threshold: f32,
        _cluster_id: Option<i64>,
        attestation: &Attestation,
    ) -> Result<bool> {
        let text = attestation.text().to_lowercase();
        Ok(query.split_whitespace().all(|word| text.contains(&word.to_lowercase())))
    }
}

/// `predicate:<p>` only
pub struct PredicateQuery;

impl QueryEvaluator for PredicateQuery {
    fn evaluate(
        &self,
        predicate: &str,
        attestation: &Attestation,
    ) -> Result<bool> {
        match predicate.strip_prefix("predicate:") {
            Some(p) => Ok(attestation.predicates.contains(p)),
            None => Err(EvaluationError::Rejected {
                predicate: predicate.to_string(),
                reason: "unsupported".into(),
            }
            .into()),
        }
    }
}

pub struct ChannelInvoker {
    tx: mpsc::UnboundedSender<(String, String)>,
}

#[async_trait]
impl ActionInvoker for ChannelInvoker {
    async fn invoke(
        &self,
        watcher: &Watcher,
        attestation: &Attestation,
    ) -> Result<()> {
        let _ = self.tx.send((watcher.id.clone(), attestation.id.clone()));
        Ok(())
    }
}

#[derive(Default)]
pub struct Canvas {
    glyphs: Mutex<HashMap<String, Glyph>>,
}

impl Canvas {
    pub fn add(
        &self,
        id: &str,
        kind: GlyphKind,
    ) {
        self.glyphs.lock().insert(id.to_string(), Glyph::new(id, kind));
    }
}

impl GlyphResolver for Canvas {
    fn get_glyph(
        &self,
        id: &str,
    ) -> Result<Option<Glyph>> {
        Ok(self.glyphs.lock().get(id).cloned())
    }
}

pub struct Harness {
    pub engine: Arc<Engine<SledWatcherStore>>,
    pub compiler: CompositionCompiler<SledWatcherStore>,
    pub canvas: Arc<Canvas>,
    pub calls: mpsc::UnboundedReceiver<(String, String)>,
    pub dir: TempDir,
}

impl Harness {
    pub fn store(&self) -> &SledWatcherStore {
        self.engine.store().as_ref()
    }

    /// Waits for the next dispatched `(watcher_id, attestation_id)`
    pub async fn next_call(&mut self) -> Option<(String, String)> {
        tokio::time::timeout(Duration::from_secs(5), self.calls.recv()).await.ok().flatten()
    }

    /// Drains calls arriving within `window`
    pub async fn calls_within(
        &mut self,
        window: Duration,
    ) -> Vec<(String, String)> {
        let mut calls = Vec::new();
        let deadline = tokio::time::Instant::now() + window;
        while let Ok(Some(call)) = tokio::time::timeout_at(deadline, self.calls.recv()).await {
            calls.push(call);
        }
        calls
    }
}

pub fn harness_at(dir: TempDir) -> Harness {
    let mut config = MeldConfig::default();
    config.storage.db_root_dir = dir.path().to_path_buf();

    let (tx, calls) = mpsc::unbounded_channel();
    let canvas = Arc::new(Canvas::default());
    let engine = EngineBuilder::open(&config)
        .unwrap()
        .query_evaluator(Arc::new(PredicateQuery))
        .similarity_evaluator(Arc::new(WordSimilarity))
        .action_invoker(Arc::new(ChannelInvoker { tx }))
        .build();
    let compiler = CompositionCompiler::new(engine.clone(), canvas.clone(), config.compiler);

    Harness {
        engine,
        compiler,
        canvas,
        calls,
        dir,
    }
}

pub fn harness() -> Harness {
    harness_at(tempfile::tempdir().unwrap())
}

pub fn semantic_watcher(
    glyph_id: &str,
    query: &str,
) -> Watcher {
    Watcher::new(format!("se-glyph-{glyph_id}"), glyph_id, ActionKind::SemanticMatch)
        .with_similarity(query, 0.5)
}

pub fn text_attestation(
    id: &str,
    text: &str,
    at: DateTime<Utc>,
) -> Attestation {
    Attestation::new(id, at).with_attribute("text", serde_json::Value::String(text.into()))
}
