use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// Last attestation a compiled edge processed successfully
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeCursor {
    pub composition_id: String,
    pub from_glyph_id: String,
    pub to_glyph_id: String,
    pub last_processed_id: String,
    pub last_processed_at: DateTime<Utc>,
}

impl EdgeCursor {
    pub fn new(
        composition_id: impl Into<String>,
        from_glyph_id: impl Into<String>,
        to_glyph_id: impl Into<String>,
        last_processed_id: impl Into<String>,
        last_processed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            composition_id: composition_id.into(),
            from_glyph_id: from_glyph_id.into(),
            to_glyph_id: to_glyph_id.into(),
            last_processed_id: last_processed_id.into(),
            last_processed_at,
        }
    }
}
