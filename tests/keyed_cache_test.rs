//! Tests for [`KeyedCache`] — keyed result storage with TTL expiry.

use std::time::Duration;

use heimdallr::{KeyedCache, KeyedCacheConfig};
use serde_json::json;

#[test]
fn miss_then_hit() {
    let cache = KeyedCache::new(&KeyedCacheConfig::default());
    assert!(cache.get("summarize", &["hello"]).is_none());

    cache.insert("summarize", &["hello"], json!("short version"));
    assert_eq!(cache.get("summarize", &["hello"]), Some(json!("short version")));
}

#[test]
fn key_varies_by_operation_and_input() {
    let cache = KeyedCache::new(&KeyedCacheConfig::default());
    cache.insert("summarize", &["hello"], json!(1));

    assert!(cache.get("extract", &["hello"]).is_none());
    assert!(cache.get("summarize", &["world"]).is_none());
    assert!(cache.get("summarize", &["hello", "world"]).is_none());
}

#[test]
fn insert_overwrites() {
    let cache = KeyedCache::new(&KeyedCacheConfig::default());
    cache.insert("summarize", &["hello"], json!("old"));
    cache.insert("summarize", &["hello"], json!("new"));
    assert_eq!(cache.get("summarize", &["hello"]), Some(json!("new")));
}

#[test]
fn entries_expire_after_ttl() {
    let cache = KeyedCache::new(&KeyedCacheConfig::new().ttl(Duration::from_millis(50)));
    cache.insert("summarize", &["hello"], json!(1));
    assert!(cache.get("summarize", &["hello"]).is_some());

    std::thread::sleep(Duration::from_millis(100));
    assert!(cache.get("summarize", &["hello"]).is_none());
}

#[test]
fn clear_evicts_everything() {
    let cache = KeyedCache::new(&KeyedCacheConfig::default());
    cache.insert("summarize", &["a"], json!(1));
    cache.insert("summarize", &["b"], json!(2));

    cache.clear();
    assert!(cache.get("summarize", &["a"]).is_none());
    assert!(cache.get("summarize", &["b"]).is_none());
}
