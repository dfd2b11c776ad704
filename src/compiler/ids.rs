use crate::constants::MELD_EDGE_PREFIX;
use crate::constants::MELD_EDGE_SEPARATOR;
use crate::constants::PRODUCER_ACTOR_PREFIX;
use crate::constants::QUERY_GLYPH_PREFIX;
use crate::constants::SEMANTIC_GLYPH_PREFIX;

/// `meld-edge/<composition>/`, shared by every watcher compiled from it
pub fn meld_edge_prefix(composition_id: &str) -> String {
    format!("{MELD_EDGE_PREFIX}{MELD_EDGE_SEPARATOR}{composition_id}{MELD_EDGE_SEPARATOR}")
}

/// `meld-edge/<composition>/<from>/<to>`
pub fn meld_edge_watcher_id(
    composition_id: &str,
    from_glyph_id: &str,
    to_glyph_id: &str,
) -> String {
    format!(
        "{}{from_glyph_id}{MELD_EDGE_SEPARATOR}{to_glyph_id}",
        meld_edge_prefix(composition_id)
    )
}

/// Id of the standalone watcher owned by a semantic-source glyph
pub fn semantic_glyph_watcher_id(glyph_id: &str) -> String {
    format!("{SEMANTIC_GLYPH_PREFIX}{glyph_id}")
}

/// Id of the standalone watcher owned by a query-source glyph
pub fn query_glyph_watcher_id(glyph_id: &str) -> String {
    format!("{QUERY_GLYPH_PREFIX}{glyph_id}")
}

/// Actor stamped on attestations a producing glyph creates
pub fn producer_actor(glyph_id: &str) -> String {
    format!("{PRODUCER_ACTOR_PREFIX}{glyph_id}")
}

/// Ids embedded in a compiled watcher id must not contain the separator,
/// otherwise prefix deletion could reach another composition's rules.
#[inline]
pub(crate) fn is_id_segment(id: &str) -> bool {
    !id.is_empty() && !id.contains(MELD_EDGE_SEPARATOR)
}
