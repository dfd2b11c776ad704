use chrono::TimeZone;
use chrono::Utc;

use super::*;
use crate::StorageError;

fn semantic(id: &str) -> Watcher {
    Watcher::new(id, "semantic", ActionKind::SemanticMatch).with_similarity("climate", 0.5)
}

#[test]
fn test_validate_rejects_query_and_similarity_together() {
    let w = semantic("w1").with_query("subjects:foo");
    assert!(w.validate().is_err());
}

#[test]
fn test_validate_rejects_actor_filter_with_query() {
    let w = Watcher::new("w", "n", ActionKind::ExecuteGlyph)
        .with_actor("producer:x")
        .with_query("predicate:p");
    assert!(matches!(w.validate(), Err(StorageError::InvalidWatcher { .. })));
}

#[test]
fn test_validate_rejects_actor_filter_with_similarity() {
    let w = Watcher::new("w", "n", ActionKind::ExecuteGlyph)
        .with_actor("producer:x")
        .with_similarity("q", 0.5);
    assert!(matches!(w.validate(), Err(StorageError::InvalidWatcher { .. })));
}

#[test]
fn test_validate_accepts_actor_filter_alone() {
    let w = Watcher::new("w", "n", ActionKind::ExecuteGlyph).with_actor("producer:x");
    assert!(w.validate().is_ok());
}

#[test]
fn test_validate_rejects_upstream_without_similarity() {
    let mut w = Watcher::new("w1", "q", ActionKind::ExecuteGlyph).with_query("x");
    w.upstream_similarity = Some(UpstreamSimilarity {
        query: "y".into(),
        threshold: 0.4,
    });
    assert!(w.validate().is_err());
}

#[test]
fn test_validate_rejects_empty_id() {
    assert!(Watcher::new("", "n", ActionKind::Webhook).validate().is_err());
}

#[test]
fn test_validate_accepts_unconditional_watcher() {
    assert!(Watcher::new("w", "n", ActionKind::Webhook).validate().is_ok());
}

#[test]
fn test_compound_detection() {
    let mut w = semantic("meld-edge/c/a/b");
    assert!(!w.is_compound());
    w.upstream_similarity = Some(UpstreamSimilarity {
        query: "upstream".into(),
        threshold: 0.3,
    });
    assert!(w.is_compound());
    assert_eq!(w.standalone_semantic_glyph(), None);
}

#[test]
fn test_standalone_semantic_glyph() {
    assert_eq!(semantic("se-glyph-g1").standalone_semantic_glyph(), Some("g1"));
    assert_eq!(semantic("ax-glyph-g1").standalone_semantic_glyph(), None);
}

#[test]
fn test_edge_action_parsing() {
    let action = EdgeAction {
        target_glyph_id: "py1".into(),
        target_glyph_type: Some("py".into()),
        composition_id: "c1".into(),
        source_glyph_id: "ax1".into(),
    };
    let w = Watcher::new("w", "n", ActionKind::ExecuteGlyph).with_action_data(action.to_payload());
    assert_eq!(w.edge_action(), Some(action));

    let w = w.with_action_data("{\"code\":\"print(1)\"}");
    assert_eq!(w.edge_action(), None);

    let w = w.with_action_data("not json");
    assert_eq!(w.edge_action(), None);
}

#[test]
fn test_same_rule_ignores_statistics() {
    let a = semantic("w1");
    let mut b = a.clone();
    b.fire_count = 12;
    b.error_count = 3;
    b.last_error = Some("boom".into());
    b.last_fired_at = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    b.updated_at = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
    assert!(a.same_rule(&b));

    b.filter.time_start = Some(Utc::now());
    assert!(!a.same_rule(&b));
}

#[test]
fn test_glyph_kind_from_symbol() {
    assert_eq!(GlyphKind::from_symbol("⋈"), GlyphKind::Query);
    assert_eq!(GlyphKind::from_symbol("ax"), GlyphKind::Query);
    assert_eq!(GlyphKind::from_symbol("⊨"), GlyphKind::Semantic);
    assert_eq!(GlyphKind::from_symbol("py"), GlyphKind::Python);
    assert_eq!(GlyphKind::from_symbol("⟶"), GlyphKind::Prompt);
    assert_eq!(GlyphKind::from_symbol("chart"), GlyphKind::Other("chart".into()));
    assert!(GlyphKind::Prompt.is_executable());
    assert!(!GlyphKind::Note.is_executable());
}

#[test]
fn test_attestation_actor_overlap_is_case_insensitive() {
    let a = Attestation::new("a1", Utc::now()).with_actor("Producer:PY1");
    let wanted = ["producer:py1".to_string()];
    assert!(a.has_any_actor(wanted.iter()));
    let other = ["producer:py2".to_string()];
    assert!(!a.has_any_actor(other.iter()));
}

#[test]
fn test_attestation_text_prefers_string_attributes() {
    let a = Attestation::new("a1", Utc::now())
        .with_predicate("observed")
        .with_attribute("summary", serde_json::json!("heat wave"))
        .with_attribute("tags", serde_json::json!(["drought", 3]));
    let text = a.text();
    assert!(text.contains("heat wave"));
    assert!(text.contains("drought"));
    assert!(!text.contains("observed"));

    let bare = Attestation::new("a2", Utc::now()).with_predicate("observed");
    assert_eq!(bare.text(), "observed");
}

#[test]
fn test_filter_time_bounds_are_inclusive() {
    let t = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let filter = WatcherFilter {
        time_start: Some(t),
        time_end: Some(t + chrono::Duration::hours(1)),
        ..Default::default()
    };
    assert!(filter.admits(&t));
    assert!(filter.admits(&(t + chrono::Duration::hours(1))));
    assert!(!filter.admits(&(t - chrono::Duration::seconds(1))));
    assert!(!filter.admits(&(t + chrono::Duration::minutes(61))));
    assert!(WatcherFilter::default().admits(&t));
}
