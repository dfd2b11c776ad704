use super::*;

#[test]
fn test_ids_are_deterministic() {
    assert_eq!(meld_edge_watcher_id("c1", "a", "b"), "meld-edge/c1/a/b");
    assert_eq!(meld_edge_watcher_id("c1", "a", "b"), meld_edge_watcher_id("c1", "a", "b"));
    assert_eq!(meld_edge_prefix("c1"), "meld-edge/c1/");
    assert_eq!(semantic_glyph_watcher_id("g"), "se-glyph-g");
    assert_eq!(query_glyph_watcher_id("g"), "ax-glyph-g");
    assert_eq!(producer_actor("py1"), "producer:py1");
}

#[test]
fn test_prefix_does_not_cover_longer_composition_ids() {
    let id = meld_edge_watcher_id("c10", "a", "b");
    assert!(!id.starts_with(&meld_edge_prefix("c1")));
}

#[test]
fn test_id_segment_validation() {
    assert!(is_id_segment("glyph-1"));
    assert!(!is_id_segment(""));
    assert!(!is_id_segment("a/b"));
}
