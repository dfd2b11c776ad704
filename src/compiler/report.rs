use std::fmt;

/// Why a data-flow edge produced no watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Glyph id is empty or contains the id separator
    InvalidGlyphId(String),
    /// Glyph could not be resolved
    MissingGlyph(String),
    /// Standalone watcher to copy a predicate from is absent or has none
    MissingUpstreamWatcher(String),
    /// Semantic target fed by a non-semantic source
    UnsupportedTarget(String),
    /// Source type has no compilation rule
    UnsupportedSource(String),
}

impl fmt::Display for SkipReason {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            SkipReason::InvalidGlyphId(id) => write!(f, "invalid glyph id {id:?}"),
            SkipReason::MissingGlyph(id) => write!(f, "glyph {id} not found"),
            SkipReason::MissingUpstreamWatcher(id) => write!(f, "no usable watcher {id}"),
            SkipReason::UnsupportedTarget(tag) => write!(f, "unsupported target type {tag}"),
            SkipReason::UnsupportedSource(tag) => write!(f, "unsupported source type {tag}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEdge {
    pub from: String,
    pub to: String,
    pub reason: SkipReason,
}

/// Outcome of one `compile_subscriptions` run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileReport {
    pub created: usize,
    pub replaced: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub skipped: Vec<SkippedEdge>,
    /// Glyphs whose standalone semantic watcher becomes active again
    pub restored_targets: Vec<String>,
    /// False when nothing changed or the reload failed
    pub reloaded: bool,
}

impl CompileReport {
    pub fn changed(&self) -> bool {
        self.created + self.replaced + self.deleted > 0
    }
}

/// Outcome of `delete_composition_subscriptions`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub watchers_removed: usize,
    pub cursors_removed: usize,
    pub reloaded: bool,
}
