use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use super::is_id_segment;
use super::meld_edge_prefix;
use super::meld_edge_watcher_id;
use super::producer_actor;
use super::query_glyph_watcher_id;
use super::semantic_glyph_watcher_id;
use super::CleanupReport;
use super::CompileReport;
use super::GlyphResolver;
use super::SkipReason;
use super::SkippedEdge;
use crate::config::CompilerConfig;
use crate::engine::Engine;
use crate::metrics::COMPILED_SUBSCRIPTIONS;
use crate::model::ActionKind;
use crate::model::Composition;
use crate::model::Edge;
use crate::model::EdgeAction;
use crate::model::Glyph;
use crate::model::GlyphKind;
use crate::model::SimilarityPredicate;
use crate::model::UpstreamSimilarity;
use crate::model::Watcher;
use crate::storage::WatcherStore;
use crate::CompileError;
use crate::Result;

/// Result of resolving one data-flow edge
enum Resolution {
    Compiled(Watcher),
    Skipped(SkipReason),
    /// Target kind is not something a watcher can trigger
    NotActionable,
}

/// Compiles compositions into watchers through the engine's store.
///
/// The compiler only writes to the store; the engine's active set changes
/// through the reload it triggers afterwards.
pub struct CompositionCompiler<S: WatcherStore> {
    engine: Arc<Engine<S>>,
    glyphs: Arc<dyn GlyphResolver>,
    config: CompilerConfig,
}

impl<S: WatcherStore> CompositionCompiler<S> {
    pub fn new(
        engine: Arc<Engine<S>>,
        glyphs: Arc<dyn GlyphResolver>,
        config: CompilerConfig,
    ) -> Self {
        Self {
            engine,
            glyphs,
            config,
        }
    }

    fn store(&self) -> &S {
        self.engine.store().as_ref()
    }

    /// Brings the stored watchers of `composition` in line with its edges.
    ///
    /// Idempotent: a second run with the same input writes nothing. Edges
    /// that cannot be resolved are skipped and reported. Store write errors
    /// abort the run; a failed reload afterwards is only logged.
    #[instrument(skip(self, composition), fields(composition_id = %composition.id))]
    pub fn compile_subscriptions(
        &self,
        composition: &Composition,
    ) -> Result<CompileReport> {
        if !is_id_segment(&composition.id) {
            return Err(CompileError::InvalidComposition(
                composition.id.clone(),
                "must be non-empty and must not contain '/'",
            )
            .into());
        }

        let prefix = meld_edge_prefix(&composition.id);
        let existing: HashMap<String, Watcher> = self
            .store()
            .list_by_prefix(&prefix)?
            .into_iter()
            .map(|w| (w.id.clone(), w))
            .collect();

        let mut report = CompileReport::default();
        let desired = self.desired_watchers(composition, &mut report)?;

        report.restored_targets = restored_targets(existing.values(), desired.values());
        for target in &report.restored_targets {
            info!(
                "Standalone watcher {} will be restored after unmeld",
                semantic_glyph_watcher_id(target)
            );
        }

        for id in existing.keys().filter(|id| !desired.contains_key(*id)) {
            if self.store().delete(id)? {
                report.deleted += 1;
                debug!(watcher_id = %id, "Removed stale edge watcher");
            }
        }

        for (id, mut watcher) in desired {
            match existing.get(&id) {
                Some(current) if current.same_rule(&watcher) => report.unchanged += 1,
                Some(current) => {
                    carry_statistics(current, &mut watcher);
                    self.store().create_or_replace(&watcher)?;
                    report.replaced += 1;
                }
                None => {
                    self.store().create_or_replace(&watcher)?;
                    report.created += 1;
                }
            }
        }

        COMPILED_SUBSCRIPTIONS.with_label_values(&["created"]).inc_by(report.created as u64);
        COMPILED_SUBSCRIPTIONS.with_label_values(&["replaced"]).inc_by(report.replaced as u64);
        COMPILED_SUBSCRIPTIONS.with_label_values(&["deleted"]).inc_by(report.deleted as u64);
        COMPILED_SUBSCRIPTIONS
            .with_label_values(&["skipped"])
            .inc_by(report.skipped.len() as u64);

        if report.changed() {
            match self.engine.reload_watchers() {
                Ok(()) => report.reloaded = true,
                Err(e) => error!("Reload after compiling subscriptions failed: {:?}", e),
            }
        }

        info!(
            created = report.created,
            replaced = report.replaced,
            unchanged = report.unchanged,
            deleted = report.deleted,
            skipped = report.skipped.len(),
            "Compiled subscriptions"
        );
        Ok(report)
    }

    /// Deletes every watcher and cursor of a composition, then reloads.
    ///
    /// Never fails; partial cleanup is logged and reflected in the report.
    #[instrument(skip(self))]
    pub fn delete_composition_subscriptions(
        &self,
        composition_id: &str,
    ) -> CleanupReport {
        let mut report = CleanupReport::default();

        if is_id_segment(composition_id) {
            match self.store().delete_by_prefix(&meld_edge_prefix(composition_id)) {
                Ok(removed) => report.watchers_removed = removed,
                Err(e) => error!("Failed to delete composition watchers: {:?}", e),
            }
        } else {
            warn!("Composition id cannot own compiled watchers, skipping watcher cleanup");
        }

        match self.store().delete_cursors_for_composition(composition_id) {
            Ok(removed) => report.cursors_removed = removed,
            Err(e) => error!("Failed to delete composition cursors: {:?}", e),
        }

        match self.engine.reload_watchers() {
            Ok(()) => report.reloaded = true,
            Err(e) => error!("Reload after deleting subscriptions failed: {:?}", e),
        }

        info!(
            watchers_removed = report.watchers_removed,
            cursors_removed = report.cursors_removed,
            "Deleted composition subscriptions"
        );
        report
    }

    /// Resolves every data-flow edge into the watcher it should compile to.
    ///
    /// Semantic-to-semantic edges are resolved first so that chains through a
    /// compound target see that compound regardless of edge order.
    fn desired_watchers(
        &self,
        composition: &Composition,
        report: &mut CompileReport,
    ) -> Result<BTreeMap<String, Watcher>> {
        let mut glyphs: HashMap<String, Option<Glyph>> = HashMap::new();
        let mut resolved: Vec<(&Edge, Glyph, Glyph)> = Vec::new();

        for edge in composition.edges.iter().filter(|e| e.is_data_flow()) {
            if let Some(bad) = [&edge.from, &edge.to].into_iter().find(|id| !is_id_segment(id)) {
                skip(report, edge, SkipReason::InvalidGlyphId(bad.clone()));
                continue;
            }
            let source = self.lookup_glyph(&mut glyphs, &edge.from);
            let target = self.lookup_glyph(&mut glyphs, &edge.to);
            match (source, target) {
                (Some(source), Some(target)) => resolved.push((edge, source, target)),
                (None, _) => skip(report, edge, SkipReason::MissingGlyph(edge.from.clone())),
                (_, None) => skip(report, edge, SkipReason::MissingGlyph(edge.to.clone())),
            }
        }

        let (compound_edges, other_edges): (Vec<_>, Vec<_>) =
            resolved.into_iter().partition(|(_, source, target)| {
                source.kind == GlyphKind::Semantic && target.kind == GlyphKind::Semantic
            });

        let mut desired = BTreeMap::new();
        let mut compounds: HashMap<String, UpstreamSimilarity> = HashMap::new();

        for (edge, _, _) in &compound_edges {
            match self.compile_compound(&composition.id, edge)? {
                Resolution::Compiled(watcher) => {
                    if let Some(upstream) = &watcher.upstream_similarity {
                        compounds.entry(edge.to.clone()).or_insert_with(|| upstream.clone());
                    }
                    desired.insert(watcher.id.clone(), watcher);
                }
                Resolution::Skipped(reason) => skip(report, edge, reason),
                Resolution::NotActionable => {}
            }
        }

        for (edge, source, target) in &other_edges {
            match self.compile_edge(&composition.id, edge, source, target, &compounds)? {
                Resolution::Compiled(watcher) => {
                    desired.insert(watcher.id.clone(), watcher);
                }
                Resolution::Skipped(reason) => skip(report, edge, reason),
                Resolution::NotActionable => {
                    debug!(
                        from = %edge.from,
                        to = %edge.to,
                        target_type = target.kind.tag(),
                        "Target is not actionable, no watcher"
                    );
                }
            }
        }

        Ok(desired)
    }

    fn lookup_glyph(
        &self,
        cache: &mut HashMap<String, Option<Glyph>>,
        id: &str,
    ) -> Option<Glyph> {
        if let Some(cached) = cache.get(id) {
            return cached.clone();
        }
        let glyph = match self.glyphs.get_glyph(id) {
            Ok(glyph) => glyph,
            Err(e) => {
                warn!(glyph_id = id, "Failed to resolve glyph: {:?}", e);
                None
            }
        };
        cache.insert(id.to_string(), glyph.clone());
        glyph
    }

    /// Semantic source and semantic target: downstream predicate from the
    /// target's own watcher, upstream predicate from the source's.
    fn compile_compound(
        &self,
        composition_id: &str,
        edge: &Edge,
    ) -> Result<Resolution> {
        let Some(upstream) = self.standalone_similarity(&edge.from)? else {
            return Ok(Resolution::Skipped(SkipReason::MissingUpstreamWatcher(
                semantic_glyph_watcher_id(&edge.from),
            )));
        };
        let Some(downstream) = self.standalone_similarity(&edge.to)? else {
            return Ok(Resolution::Skipped(SkipReason::MissingUpstreamWatcher(
                semantic_glyph_watcher_id(&edge.to),
            )));
        };

        let action = EdgeAction {
            target_glyph_id: edge.to.clone(),
            target_glyph_type: None,
            composition_id: composition_id.to_string(),
            source_glyph_id: edge.from.clone(),
        };
        let mut watcher = self.edge_watcher(composition_id, edge, ActionKind::SemanticMatch, &action);
        watcher.similarity = Some(downstream);
        watcher.upstream_similarity = Some(UpstreamSimilarity {
            query: upstream.query,
            threshold: upstream.threshold,
        });
        Ok(Resolution::Compiled(watcher))
    }

    /// Any edge other than semantic to semantic
    fn compile_edge(
        &self,
        composition_id: &str,
        edge: &Edge,
        source: &Glyph,
        target: &Glyph,
        compounds: &HashMap<String, UpstreamSimilarity>,
    ) -> Result<Resolution> {
        if target.kind == GlyphKind::Semantic {
            return Ok(Resolution::Skipped(SkipReason::UnsupportedTarget(
                target.kind.tag().to_string(),
            )));
        }
        if !target.kind.is_executable() {
            return Ok(Resolution::NotActionable);
        }

        let action = EdgeAction {
            target_glyph_id: edge.to.clone(),
            target_glyph_type: Some(target.kind.tag().to_string()),
            composition_id: composition_id.to_string(),
            source_glyph_id: edge.from.clone(),
        };
        let mut watcher = self.edge_watcher(composition_id, edge, ActionKind::ExecuteGlyph, &action);

        match &source.kind {
            GlyphKind::Query => {
                let upstream_id = query_glyph_watcher_id(&edge.from);
                let query = self.store().get(&upstream_id)?.and_then(|w| w.query);
                let Some(query) = query else {
                    return Ok(Resolution::Skipped(SkipReason::MissingUpstreamWatcher(upstream_id)));
                };
                watcher.query = Some(query);
            }
            GlyphKind::Semantic => {
                let Some(similarity) = self.standalone_similarity(&edge.from)? else {
                    return Ok(Resolution::Skipped(SkipReason::MissingUpstreamWatcher(
                        semantic_glyph_watcher_id(&edge.from),
                    )));
                };
                watcher.similarity = Some(SimilarityPredicate {
                    cluster_id: None,
                    ..similarity
                });
                watcher.upstream_similarity = self.compound_upstream_for(
                    composition_id,
                    &edge.from,
                    compounds,
                )?;
            }
            kind if kind.is_producer() => {
                watcher.filter.actors.insert(producer_actor(&edge.from));
            }
            other => {
                return Ok(Resolution::Skipped(SkipReason::UnsupportedSource(
                    other.tag().to_string(),
                )));
            }
        }

        Ok(Resolution::Compiled(watcher))
    }

    /// Similarity predicate of the standalone watcher owned by a semantic glyph
    fn standalone_similarity(
        &self,
        glyph_id: &str,
    ) -> Result<Option<SimilarityPredicate>> {
        Ok(self
            .store()
            .get(&semantic_glyph_watcher_id(glyph_id))?
            .and_then(|w| w.similarity))
    }

    /// Upstream predicate of a compound watcher targeting `glyph_id`.
    ///
    /// Compounds compiled in this run win; stored compounds of this
    /// composition are about to be rewritten and are ignored.
    fn compound_upstream_for(
        &self,
        composition_id: &str,
        glyph_id: &str,
        compounds: &HashMap<String, UpstreamSimilarity>,
    ) -> Result<Option<UpstreamSimilarity>> {
        if let Some(upstream) = compounds.get(glyph_id) {
            return Ok(Some(upstream.clone()));
        }
        let own_prefix = meld_edge_prefix(composition_id);
        Ok(self
            .store()
            .find_compound_watchers_for_target(glyph_id)?
            .into_iter()
            .filter(|w| !w.id.starts_with(&own_prefix))
            .find_map(|w| w.upstream_similarity))
    }

    fn edge_watcher(
        &self,
        composition_id: &str,
        edge: &Edge,
        action_kind: ActionKind,
        action: &EdgeAction,
    ) -> Watcher {
        Watcher::new(
            meld_edge_watcher_id(composition_id, &edge.from, &edge.to),
            format!("Meld: {} → {}", truncate(&edge.from, 8), truncate(&edge.to, 8)),
            action_kind,
        )
        .with_action_data(action.to_payload())
        .with_max_fires_per_minute(self.config.default_max_fires_per_minute)
    }
}

fn skip(
    report: &mut CompileReport,
    edge: &Edge,
    reason: SkipReason,
) {
    warn!(from = %edge.from, to = %edge.to, "Skipping edge: {}", reason);
    report.skipped.push(SkippedEdge {
        from: edge.from.clone(),
        to: edge.to.clone(),
        reason,
    });
}

/// Targets of compound watchers that exist now but are not desired anymore
fn restored_targets<'a>(
    existing: impl Iterator<Item = &'a Watcher>,
    desired: impl Iterator<Item = &'a Watcher> + Clone,
) -> Vec<String> {
    let compound_target = |w: &Watcher| {
        if w.is_compound() {
            w.edge_action().map(|action| action.target_glyph_id)
        } else {
            None
        }
    };
    let still_covered: BTreeSet<String> = desired.clone().filter_map(compound_target).collect();
    existing
        .filter_map(compound_target)
        .filter(|target| !still_covered.contains(target))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Keeps runtime statistics when a rule is rewritten in place
fn carry_statistics(
    current: &Watcher,
    next: &mut Watcher,
) {
    next.fire_count = current.fire_count;
    next.last_fired_at = current.last_fired_at;
    next.error_count = current.error_count;
    next.last_error = current.last_error.clone();
    next.created_at = current.created_at;
    next.updated_at = Utc::now();
}

fn truncate(
    id: &str,
    max_chars: usize,
) -> &str {
    match id.char_indices().nth(max_chars) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}
