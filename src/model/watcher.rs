use std::collections::BTreeSet;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::SEMANTIC_GLYPH_PREFIX;
use crate::StorageError;

/// Side effect a watcher performs when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Execute the target glyph of a compiled edge
    ExecuteGlyph,
    /// Run a python snippet carried in the action payload
    RunPython,
    /// Standalone semantic glyph match (also used by compound watchers)
    SemanticMatch,
    /// POST the attestation to an external endpoint
    Webhook,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::ExecuteGlyph => "execute_glyph",
            ActionKind::RunPython => "run_python",
            ActionKind::SemanticMatch => "semantic_match",
            ActionKind::Webhook => "webhook",
        }
    }
}

/// Structural constraints checked before any predicate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatcherFilter {
    /// Attestation must carry at least one of these actors. Empty means any.
    pub actors: BTreeSet<String>,
    /// Attestations strictly before this instant are ignored
    pub time_start: Option<DateTime<Utc>>,
    /// Attestations strictly after this instant are ignored
    pub time_end: Option<DateTime<Utc>>,
}

impl WatcherFilter {
    /// True when `timestamp` falls inside the configured bounds
    pub fn admits(
        &self,
        timestamp: &DateTime<Utc>,
    ) -> bool {
        if self.time_start.is_some_and(|start| *timestamp < start) {
            return false;
        }
        !self.time_end.is_some_and(|end| *timestamp > end)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityPredicate {
    pub query: String,
    /// Values outside `(0, 1]` fall back to the engine default
    pub threshold: f32,
    pub cluster_id: Option<i64>,
}

/// Second similarity check of a compound watcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamSimilarity {
    pub query: String,
    pub threshold: f32,
}

/// Parsed action payload of a watcher compiled from an edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeAction {
    pub target_glyph_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_glyph_type: Option<String>,
    pub composition_id: String,
    pub source_glyph_id: String,
}

impl EdgeAction {
    pub fn to_payload(&self) -> String {
        // Plain strings and an optional string cannot fail to serialize
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Persisted reactive rule
///
/// `fire_count`, `error_count`, `last_error` and `last_fired_at` are runtime
/// statistics and are ignored by [`Watcher::same_rule`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Watcher {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub action_kind: ActionKind,
    /// JSON document interpreted according to `action_kind`
    pub action_data: String,
    pub filter: WatcherFilter,
    /// Attestation query predicate, mutually exclusive with `similarity`
    pub query: Option<String>,
    pub similarity: Option<SimilarityPredicate>,
    pub upstream_similarity: Option<UpstreamSimilarity>,
    /// Zero means the watcher matches but never dispatches
    pub max_fires_per_minute: u32,
    pub fire_count: u64,
    pub last_fired_at: Option<DateTime<Utc>>,
    pub error_count: u64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Watcher {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        action_kind: ActionKind,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            enabled: true,
            action_kind,
            action_data: String::new(),
            filter: WatcherFilter::default(),
            query: None,
            similarity: None,
            upstream_similarity: None,
            max_fires_per_minute: 60,
            fire_count: 0,
            last_fired_at: None,
            error_count: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_query(
        mut self,
        query: impl Into<String>,
    ) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_similarity(
        mut self,
        query: impl Into<String>,
        threshold: f32,
    ) -> Self {
        self.similarity = Some(SimilarityPredicate {
            query: query.into(),
            threshold,
            cluster_id: None,
        });
        self
    }

    pub fn with_actor(
        mut self,
        actor: impl Into<String>,
    ) -> Self {
        self.filter.actors.insert(actor.into());
        self
    }

    pub fn with_action_data(
        mut self,
        data: impl Into<String>,
    ) -> Self {
        self.action_data = data.into();
        self
    }

    pub fn with_max_fires_per_minute(
        mut self,
        max: u32,
    ) -> Self {
        self.max_fires_per_minute = max;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Checks the predicate invariants enforced on every store write.
    pub fn validate(&self) -> std::result::Result<(), StorageError> {
        let invalid = |reason: &str| StorageError::InvalidWatcher {
            id: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.id.is_empty() {
            return Err(invalid("id must not be empty"));
        }
        if self.name.is_empty() {
            return Err(invalid("name must not be empty"));
        }
        let primaries = [
            !self.filter.actors.is_empty(),
            self.query.is_some(),
            self.similarity.is_some(),
        ];
        if primaries.into_iter().filter(|set| *set).count() > 1 {
            return Err(invalid(
                "actor filter, query and similarity predicates are mutually exclusive",
            ));
        }
        if self.upstream_similarity.is_some() && self.similarity.is_none() {
            return Err(invalid("upstream similarity requires a similarity predicate"));
        }
        Ok(())
    }

    /// Compound watchers intersect a semantic predicate with an upstream one
    pub fn is_compound(&self) -> bool {
        self.action_kind == ActionKind::SemanticMatch && self.upstream_similarity.is_some()
    }

    /// Glyph id owning this standalone semantic watcher, if it is one
    pub fn standalone_semantic_glyph(&self) -> Option<&str> {
        if self.is_compound() {
            return None;
        }
        self.id.strip_prefix(SEMANTIC_GLYPH_PREFIX)
    }

    /// Parses the action payload as edge coordinates.
    ///
    /// Returns `None` for payloads that are not JSON objects carrying the
    /// composition and both glyph ids.
    pub fn edge_action(&self) -> Option<EdgeAction> {
        let action: EdgeAction = serde_json::from_str(&self.action_data).ok()?;
        if action.composition_id.is_empty()
            || action.source_glyph_id.is_empty()
            || action.target_glyph_id.is_empty()
        {
            return None;
        }
        Some(action)
    }

    /// Same id and rule fields; statistics and timestamps are ignored
    pub fn same_rule(
        &self,
        other: &Watcher,
    ) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.enabled == other.enabled
            && self.action_kind == other.action_kind
            && self.action_data == other.action_data
            && self.filter == other.filter
            && self.query == other.query
            && self.similarity == other.similarity
            && self.upstream_similarity == other.upstream_similarity
            && self.max_fires_per_minute == other.max_fires_per_minute
    }
}
