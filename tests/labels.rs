use gambas_gear::labels::{resolve_label, LabelKind, LabelScope};

#[test]
fn test_resolution_is_deterministic() {
    for raw in ["Visit 1", "Visit-1", "KH_001", "Khula - pilot"] {
        for kind in [LabelKind::Project, LabelKind::Subject, LabelKind::Session] {
            assert_eq!(resolve_label(raw, kind), resolve_label(raw, kind));
        }
    }
}

#[test]
fn test_session_first_token_rule() {
    assert_eq!(resolve_label("Visit 1", LabelKind::Session), "Visit");
    assert_eq!(resolve_label("Visit-1", LabelKind::Session), "Visit1");
    assert_eq!(resolve_label("Visit_1 repeat", LabelKind::Session), "Visit1");
}

#[test]
fn test_scope_distinct_raw_labels_that_sanitize_alike() {
    let mut scope = LabelScope::new();
    let first = scope.resolve("Visit-1", LabelKind::Session).expect("first");
    let second = scope.resolve("Visit_1 repeat", LabelKind::Session).expect("second");
    assert_eq!((first.as_str(), second.as_str()), ("Visit1", "Visit1a"));
    assert!(scope.contains("Visit1a"));
    assert_eq!(scope.len(), 2);
}

#[test]
fn test_scopes_are_independent() {
    let mut a = LabelScope::new();
    let mut b = LabelScope::new();
    assert_eq!(a.resolve("1", LabelKind::Session).expect("a"), "1");
    assert_eq!(b.resolve("1", LabelKind::Session).expect("b"), "1");
}

#[test]
fn test_twenty_eighth_claim_fails() {
    let mut scope = LabelScope::new();
    for _ in 0..27 {
        scope.claim("Visit1").expect("within limit");
    }
    assert!(scope.contains("Visit1z"));
    let err = scope.claim("Visit1").expect_err("exhausted");
    assert!(err.is_config());
}
