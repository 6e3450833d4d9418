use super::*;
use serde_json::json;

fn holmes() -> NamedEntityData {
    NamedEntityData::new("e1", "Sherlock Holmes", ["Person"])
        .with_description("Consulting detective in London")
        .with_property("aliases", json!(["Holmes"]))
}

#[test]
fn test_quoted_query_scores_exact_name() {
    assert_eq!(text_score("\"sherlock holmes\"", &holmes()), 1.0);
    assert_eq!(text_score("\"Holmes\"", &holmes()), 1.0);
    assert_eq!(text_score("\"Sherlock\"", &holmes()), 0.9);
    assert_eq!(text_score("\"Mycroft\"", &holmes()), 0.0);
    assert_eq!(text_score("\"\"", &holmes()), 0.0);
}

#[test]
fn test_unquoted_query_scores_token_overlap() {
    assert_eq!(text_score("Sherlock Holmes", &holmes()), 1.0);
    assert_eq!(text_score("Holmes detective", &holmes()), 0.75);
    assert_eq!(text_score("Watson", &holmes()), 0.0);
    assert_eq!(text_score("   ", &holmes()), 0.0);
}

#[test]
fn test_exact_phrase_query() {
    assert_eq!(exact_phrase_query(" Dr. Watson "), "\"Dr. Watson\"");
    assert_eq!(quoted_phrase(&exact_phrase_query("Irene \"The Woman\" Adler")), Some("Irene The Woman Adler"));
    assert_eq!(quoted_phrase("Watson"), None);
}

#[test]
fn test_label_filter_strips_namespaces() {
    let entity = holmes();
    assert!(matches_label_filter(&[], &entity));
    assert!(matches_label_filter(&["schema:person".to_string()], &entity));
    assert!(!matches_label_filter(&["Place".to_string()], &entity));
}

#[test]
fn test_cosine_similarity() {
    assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
    assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
    assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
}

#[test]
fn test_rank_orders_by_score_then_key() {
    let hits = vec![
        ("b".to_string(), 0.8),
        ("a".to_string(), 0.8),
        ("c".to_string(), 0.9),
        ("d".to_string(), 0.1),
        ("e".to_string(), 0.0),
    ];
    let ranked = rank(hits, 3, 0.0, |s| s.as_str());
    let keys: Vec<&str> = ranked.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, vec!["c", "a", "b"]);
}

#[test]
fn test_rank_applies_threshold() {
    let hits = vec![("a".to_string(), 0.6), ("b".to_string(), 0.4)];
    let ranked = rank(hits, 10, 0.5, |s| s.as_str());
    assert_eq!(ranked.len(), 1);
}
