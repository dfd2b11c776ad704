use serde::Deserialize;
use serde::Serialize;

use crate::constants::DATA_FLOW_DIRECTION;

/// Closed set of glyph types the compiler distinguishes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlyphKind {
    /// Attestation query source (⋈)
    Query,
    /// Embedding similarity source (⊨)
    Semantic,
    /// Python cell
    Python,
    /// LLM prompt template (⟶)
    Prompt,
    Ingest,
    Note,
    Document,
    SubCanvas,
    AttestationDisplay,
    /// Any tag this crate has no rule for
    Other(String),
}

impl GlyphKind {
    /// Maps a stored glyph symbol or literal type tag to its kind.
    pub fn from_symbol(symbol: &str) -> Self {
        match symbol {
            "⋈" | "ax" | "query" => GlyphKind::Query,
            "⊨" | "se" | "semantic" => GlyphKind::Semantic,
            "py" | "python" => GlyphKind::Python,
            "⟶" | "prompt" => GlyphKind::Prompt,
            "ingest" => GlyphKind::Ingest,
            "note" => GlyphKind::Note,
            "doc" | "document" => GlyphKind::Document,
            "canvas" | "subcanvas" | "sub_canvas" => GlyphKind::SubCanvas,
            "as" | "attestation" | "attestation_display" => GlyphKind::AttestationDisplay,
            other => GlyphKind::Other(other.to_string()),
        }
    }

    /// Short type tag written into compiled action payloads
    pub fn tag(&self) -> &str {
        match self {
            GlyphKind::Query => "ax",
            GlyphKind::Semantic => "semantic",
            GlyphKind::Python => "py",
            GlyphKind::Prompt => "prompt",
            GlyphKind::Ingest => "ingest",
            GlyphKind::Note => "note",
            GlyphKind::Document => "doc",
            GlyphKind::SubCanvas => "canvas",
            GlyphKind::AttestationDisplay => "as",
            GlyphKind::Other(tag) => tag,
        }
    }

    /// Glyphs whose execution can be triggered by a compiled edge
    pub fn is_executable(&self) -> bool {
        matches!(self, GlyphKind::Python | GlyphKind::Prompt)
    }

    /// Glyphs that create attestations themselves when executed
    pub fn is_producer(&self) -> bool {
        self.is_executable()
    }
}

/// Typed node of a composition. Layout belongs to the canvas subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Glyph {
    pub id: String,
    pub kind: GlyphKind,
    #[serde(default)]
    pub content: String,
}

impl Glyph {
    pub fn new(
        id: impl Into<String>,
        kind: GlyphKind,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            content: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub direction: String,
    #[serde(default)]
    pub position: u32,
}

impl Edge {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        direction: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            direction: direction.into(),
            position: 0,
        }
    }

    /// Data-flow edges are compiled into watchers; the rest are structural
    pub fn is_data_flow(&self) -> bool {
        self.direction == DATA_FLOW_DIRECTION
    }
}

/// Directed graph of glyphs authored on the canvas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Composition {
    pub id: String,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Composition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            edges: Vec::new(),
        }
    }

    pub fn with_edge(
        mut self,
        mut edge: Edge,
    ) -> Self {
        edge.position = self.edges.len() as u32;
        self.edges.push(edge);
        self
    }
}
