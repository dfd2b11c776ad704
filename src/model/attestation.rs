use std::collections::BTreeSet;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

/// Immutable event record matched against the active watchers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attestation {
    pub id: String,
    #[serde(default)]
    pub subjects: BTreeSet<String>,
    #[serde(default)]
    pub predicates: BTreeSet<String>,
    #[serde(default)]
    pub contexts: BTreeSet<String>,
    #[serde(default)]
    pub actors: BTreeSet<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Attestation {
    pub fn new(
        id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            subjects: BTreeSet::new(),
            predicates: BTreeSet::new(),
            contexts: BTreeSet::new(),
            actors: BTreeSet::new(),
            timestamp,
            source: String::new(),
            attributes: Map::new(),
        }
    }

    pub fn with_actor(
        mut self,
        actor: impl Into<String>,
    ) -> Self {
        self.actors.insert(actor.into());
        self
    }

    pub fn with_subject(
        mut self,
        subject: impl Into<String>,
    ) -> Self {
        self.subjects.insert(subject.into());
        self
    }

    pub fn with_predicate(
        mut self,
        predicate: impl Into<String>,
    ) -> Self {
        self.predicates.insert(predicate.into());
        self
    }

    pub fn with_attribute(
        mut self,
        key: impl Into<String>,
        value: Value,
    ) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// True when any of `actors` equals one of this attestation's actors,
    /// ignoring ASCII case.
    pub fn has_any_actor<'a>(
        &self,
        actors: impl IntoIterator<Item = &'a String>,
    ) -> bool {
        actors
            .into_iter()
            .any(|wanted| self.actors.iter().any(|a| a.eq_ignore_ascii_case(wanted)))
    }

    /// Text used by similarity evaluators.
    ///
    /// String attribute values (and strings nested in array attributes) are
    /// preferred. When there are none, predicates, subjects and contexts are
    /// used instead.
    pub fn text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        for value in self.attributes.values() {
            match value {
                Value::String(s) if !s.is_empty() => parts.push(s),
                Value::Array(items) => parts.extend(
                    items.iter().filter_map(|item| item.as_str()).filter(|s| !s.is_empty()),
                ),
                _ => {}
            }
        }

        if parts.is_empty() {
            parts.extend(self.predicates.iter().map(String::as_str));
            parts.extend(self.subjects.iter().map(String::as_str));
            parts.extend(self.contexts.iter().map(String::as_str));
        }

        parts.join(" ")
    }
}
