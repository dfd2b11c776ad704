use std::collections::HashMap;
use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::compiler::GlyphResolver;
use crate::engine::ActionInvoker;
use crate::engine::QueryEvaluator;
use crate::engine::SimilarityEvaluator;
use crate::model::Attestation;
use crate::model::Glyph;
use crate::model::GlyphKind;
use crate::model::Watcher;
use crate::DispatchError;
use crate::EvaluationError;
use crate::Result;

/// Similarity stand-in: matches when the attestation text contains the
/// query, ignoring case
#[derive(Debug, Default)]
pub struct KeywordSimilarity;

impl SimilarityEvaluator for KeywordSimilarity {
    fn evaluate(
        &self,
        query: &str,
        _threshold: f32,
        _cluster_id: Option<i64>,
        attestation: &Attestation,
    ) -> Result<bool> {
        Ok(attestation.text().to_lowercase().contains(&query.to_lowercase()))
    }
}

/// Understands `predicate:<p>` and `subject:<s>`
#[derive(Debug, Default)]
pub struct FieldQuery;

impl QueryEvaluator for FieldQuery {
    fn evaluate(
        &self,
        predicate: &str,
        attestation: &Attestation,
    ) -> Result<bool> {
        match predicate.split_once(':') {
            Some(("predicate", p)) => Ok(attestation.predicates.contains(p)),
            Some(("subject", s)) => Ok(attestation.subjects.contains(s)),
            _ => Err(EvaluationError::Rejected {
                predicate: predicate.to_string(),
                reason: "unknown field".into(),
            }
            .into()),
        }
    }
}

/// Records `(watcher_id, attestation_id)` of every invocation; fails for
/// the configured watcher ids
#[derive(Debug)]
pub struct RecordingInvoker {
    tx: mpsc::UnboundedSender<(String, String)>,
    failing: HashSet<String>,
}

impl RecordingInvoker {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(String, String)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                failing: HashSet::new(),
            },
            rx,
        )
    }

    pub fn failing_for(
        mut self,
        watcher_id: &str,
    ) -> Self {
        self.failing.insert(watcher_id.to_string());
        self
    }
}

#[async_trait]
impl ActionInvoker for RecordingInvoker {
    async fn invoke(
        &self,
        watcher: &Watcher,
        attestation: &Attestation,
    ) -> Result<()> {
        let _ = self.tx.send((watcher.id.clone(), attestation.id.clone()));
        if self.failing.contains(&watcher.id) {
            return Err(DispatchError::ActionFailed {
                watcher_id: watcher.id.clone(),
                action: watcher.action_kind.as_str(),
                reason: "HTTP 500".into(),
            }
            .into());
        }
        Ok(())
    }
}

/// Glyph table backed by a map
#[derive(Debug, Default)]
pub struct MapGlyphResolver {
    glyphs: HashMap<String, Glyph>,
}

impl MapGlyphResolver {
    pub fn with(
        mut self,
        id: &str,
        kind: GlyphKind,
    ) -> Self {
        self.glyphs.insert(id.to_string(), Glyph::new(id, kind));
        self
    }
}

impl GlyphResolver for MapGlyphResolver {
    fn get_glyph(
        &self,
        id: &str,
    ) -> Result<Option<Glyph>> {
        Ok(self.glyphs.get(id).cloned())
    }
}
