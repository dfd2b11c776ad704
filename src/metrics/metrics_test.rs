use super::*;

fn create_test_registry() -> Registry {
    let registry = Registry::new_custom(Some("test".to_string()), None).unwrap();
    register_custom_metrics(&registry);
    registry
}

#[test]
fn test_custom_registry() {
    let registry = create_test_registry();

    DISPATCHES.with_label_values(&["execute_glyph"]).inc();
    let metrics = &registry.gather();
    assert!(!metrics.is_empty());

    let metric_names: Vec<_> = metrics.iter().map(|m| m.get_name()).collect();
    assert!(
        metric_names.contains(&"test_meld_dispatches_total"),
        "Missing test_meld_dispatches_total"
    );
}

#[test]
fn test_registering_twice_is_harmless() {
    let registry = create_test_registry();
    register_custom_metrics(&registry);
    RATE_LIMITED_FIRES.inc();
    assert!(!registry.gather().is_empty());
}

#[test]
fn test_counter_labels_are_independent() {
    let before_ok = DISPATCH_FAILURES.with_label_values(&["label_test_a"]).get();
    let before_other = DISPATCH_FAILURES.with_label_values(&["label_test_b"]).get();

    DISPATCH_FAILURES.with_label_values(&["label_test_a"]).inc();
    DISPATCH_FAILURES.with_label_values(&["label_test_a"]).inc();

    assert_eq!(DISPATCH_FAILURES.with_label_values(&["label_test_a"]).get(), before_ok + 2);
    assert_eq!(DISPATCH_FAILURES.with_label_values(&["label_test_b"]).get(), before_other);
}

#[tokio::test]
async fn test_metrics_endpoint_format() {
    let registry = create_test_registry();
    COMPILED_SUBSCRIPTIONS.with_label_values(&["created"]).inc();
    let metrics_route = warp::path!("metrics")
        .map(move || registry.clone())
        .and_then(metrics_handler);

    let response = warp::test::request()
        .method("GET")
        .path("/metrics")
        .reply(&metrics_route)
        .await;

    assert_eq!(response.status(), 200);
    let body = String::from_utf8(response.body().to_vec()).unwrap();
    assert!(body.contains("test_meld_compiled_subscriptions_total"));
    assert!(body.contains("# HELP"));
}
