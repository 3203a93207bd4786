//! Tests for [`FingerprintCache`] — exact match, near-duplicate
//! detection, and FIFO eviction.

use heimdallr::{ContentType, FingerprintCache, FingerprintConfig};
use serde_json::json;

fn cache() -> FingerprintCache {
    FingerprintCache::new(FingerprintConfig::default())
}

/// Build a passage repeating each vocabulary word three times, so every
/// word clears any frequency floor and the top-K signature is exactly
/// the vocabulary.
fn passage(words: &[&str]) -> String {
    let mut out = String::new();
    for _ in 0..3 {
        for word in words {
            out.push_str(word);
            out.push(' ');
        }
    }
    out
}

fn vocabulary(prefix: &str, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{prefix}term{i}")).collect()
}

// =========================================================================
// Exact matching
// =========================================================================

#[test]
fn exact_match_round_trip() {
    let cache = cache();
    let content = "the quick brown fox jumps over the lazy dog";
    cache.add_to_cache(content, ContentType::Prose, json!("answer"), None);

    let found = cache.find_similar(content, ContentType::Prose).unwrap();
    assert!(found.exact);
    assert_eq!(found.similarity, 1.0);
    assert_eq!(found.entry.value, json!("answer"));
}

#[test]
fn exact_match_survives_whitespace_and_case_in_prose() {
    let cache = cache();
    cache.add_to_cache("Hello   World", ContentType::Prose, json!(1), None);

    let found = cache.find_similar("hello world", ContentType::Prose).unwrap();
    assert!(found.exact);
}

#[test]
fn code_content_is_case_sensitive() {
    let cache = cache();
    cache.add_to_cache("fn mainLoop() {}", ContentType::Code, json!(1), None);

    let found = cache.find_similar("fn mainloop() {}", ContentType::Code);
    assert!(found.is_none_or(|m| !m.exact));
}

#[test]
fn empty_index_finds_nothing() {
    assert!(cache().find_similar("anything", ContentType::Prose).is_none());
}

#[test]
fn truncated_content_matches_past_the_cut() {
    let cache = FingerprintCache::new(FingerprintConfig::new().max_content_length(20));
    let a = format!("{} tail one", "shared prefix text block");
    let b = format!("{} completely different tail", "shared prefix text block");
    cache.add_to_cache(&a, ContentType::Prose, json!(1), None);

    // Both inputs normalize to the same truncated prefix.
    let found = cache.find_similar(&b, ContentType::Prose).unwrap();
    assert!(found.exact);
}

// =========================================================================
// Near-duplicate detection
// =========================================================================

#[test]
fn near_duplicate_passages_match() {
    let cache = cache();
    let base = vocabulary("topic", 50);
    let base_refs: Vec<&str> = base.iter().map(String::as_str).collect();

    // Variant shares 48 of 50 frequent terms.
    let mut variant = base.clone();
    variant[10] = "replacement".to_string();
    variant[20] = "substitute".to_string();
    let variant_refs: Vec<&str> = variant.iter().map(String::as_str).collect();

    cache.add_to_cache(&passage(&base_refs), ContentType::Prose, json!("cached"), None);

    let found = cache
        .find_similar(&passage(&variant_refs), ContentType::Prose)
        .unwrap();
    assert!(!found.exact);
    assert!(found.similarity >= 0.85, "similarity {}", found.similarity);
    assert_eq!(found.entry.value, json!("cached"));
}

#[test]
fn unrelated_passage_does_not_match() {
    let cache = cache();
    let base = vocabulary("astronomy", 50);
    let base_refs: Vec<&str> = base.iter().map(String::as_str).collect();
    let other = vocabulary("cooking", 50);
    let other_refs: Vec<&str> = other.iter().map(String::as_str).collect();

    cache.add_to_cache(&passage(&base_refs), ContentType::Prose, json!(1), None);
    assert!(
        cache
            .find_similar(&passage(&other_refs), ContentType::Prose)
            .is_none()
    );

    // And the raw score is well below any plausible threshold.
    let a = cache.create_fingerprint(&passage(&base_refs), ContentType::Prose);
    let b = cache.create_fingerprint(&passage(&other_refs), ContentType::Prose);
    assert!(cache.similarity(&a, &b).unwrap() < 0.3);
}

#[test]
fn similarity_is_symmetric() {
    let cache = cache();
    let a = cache.create_fingerprint(
        "rust ownership borrowing lifetimes traits generics",
        ContentType::Prose,
    );
    let b = cache.create_fingerprint(
        "rust ownership borrowing closures iterators generics",
        ContentType::Prose,
    );
    assert_eq!(cache.similarity(&a, &b), cache.similarity(&b, &a));
}

#[test]
fn threshold_is_inclusive() {
    // Signatures {alpha, beta, gamma} and {alpha, beta, delta}:
    // intersection 2, union 4, similarity exactly 0.5.
    let cache = FingerprintCache::new(FingerprintConfig::new().similarity_threshold(0.5));
    cache.add_to_cache("alpha beta gamma", ContentType::Prose, json!(1), None);

    let found = cache.find_similar("alpha beta delta", ContentType::Prose).unwrap();
    assert_eq!(found.similarity, 0.5);
    assert!(!found.exact);
}

#[test]
fn below_threshold_is_no_match() {
    let cache = FingerprintCache::new(FingerprintConfig::new().similarity_threshold(0.6));
    cache.add_to_cache("alpha beta gamma", ContentType::Prose, json!(1), None);
    assert!(cache.find_similar("alpha beta delta", ContentType::Prose).is_none());
}

#[test]
fn similarity_is_scoped_to_content_type() {
    let cache = cache();
    cache.add_to_cache("shared vocabulary terms", ContentType::Prose, json!(1), None);

    // Identical text under a different content-type tag never matches.
    assert!(cache.find_similar("shared vocabulary terms", ContentType::Code).is_none());
}

// =========================================================================
// Eviction and bookkeeping
// =========================================================================

#[test]
fn oldest_entry_is_evicted_first() {
    let cache = FingerprintCache::new(FingerprintConfig::new().max_entries(3));
    let contents = ["first unique entry", "second unique entry", "third unique entry"];
    for (i, content) in contents.iter().enumerate() {
        cache.add_to_cache(content, ContentType::Prose, json!(i), None);
    }
    cache.add_to_cache("fourth unique entry", ContentType::Prose, json!(3), None);

    assert_eq!(cache.len(), 3);
    assert!(cache.find_similar(contents[0], ContentType::Prose).is_none());
    for content in &contents[1..] {
        assert!(
            cache
                .find_similar(content, ContentType::Prose)
                .is_some_and(|m| m.exact)
        );
    }
}

#[test]
fn clear_empties_the_index() {
    let cache = cache();
    cache.add_to_cache("something", ContentType::Prose, json!(1), None);
    assert_eq!(cache.len(), 1);
    assert!(!cache.is_empty());

    cache.clear();
    assert!(cache.is_empty());
    assert!(cache.find_similar("something", ContentType::Prose).is_none());
}

#[test]
fn metadata_rides_along() {
    let cache = cache();
    cache.add_to_cache(
        "tagged content example",
        ContentType::Prose,
        json!("value"),
        Some(json!({ "source": "unit" })),
    );
    let found = cache
        .find_similar("tagged content example", ContentType::Prose)
        .unwrap();
    assert_eq!(found.entry.metadata, Some(json!({ "source": "unit" })));
}

#[test]
fn signature_respects_configured_bounds() {
    let cache = FingerprintCache::new(
        FingerprintConfig::new()
            .max_terms(5)
            .min_term_frequency(2),
    );
    // "repeated" occurs twice; every other term once.
    let fp = cache.create_fingerprint(
        "repeated singular words everywhere repeated once",
        ContentType::Prose,
    );
    assert_eq!(fp.signature.len(), 1);
    assert!(fp.signature.contains("repeated"));
}
