//! Exact and near-duplicate detection over content fingerprints.
//!
//! A [`Fingerprint`] is a strong hash of the normalized content (the
//! exact-match key) plus a bounded frequent-term signature (the
//! approximate-match key). [`FingerprintCache`] holds an
//! insertion-ordered index of fingerprints with their cached values;
//! lookups scan for an identical hash first and fall back to the best
//! Jaccard score among same-content-type entries.
//!
//! The index is bounded FIFO-style: past the configured max size the
//! oldest entry is evicted unconditionally, with no usage-frequency
//! weighting. TTL-based expiry is deliberately not part of this index —
//! that lives in [`KeyedCache`](super::KeyedCache).
//!
//! All operations are synchronous over in-memory data; nothing here
//! suspends.

use std::collections::BTreeSet;
use std::collections::VecDeque;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::time::SystemTime;

use serde_json::Value;

use crate::telemetry;

use super::signature::{self, ContentType};

/// Configuration for fingerprinting and the similarity index.
#[derive(Debug, Clone)]
pub struct FingerprintConfig {
    /// Maximum signature size (top-K terms). Default: 50.
    pub max_terms: usize,
    /// Minimum token length for signature terms. Default: 3.
    pub min_term_length: usize,
    /// Minimum frequency for a term to enter the signature. Default: 1.
    pub min_term_frequency: u32,
    /// Jaccard score at or above which a near-duplicate is reported.
    /// Default: 0.85.
    pub similarity_threshold: f64,
    /// Index bound; the oldest entry is evicted past this. Default: 1,000.
    pub max_entries: usize,
    /// Content length (in chars) beyond which input is truncated before
    /// fingerprinting. Default: 10,000.
    pub max_content_length: usize,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            max_terms: 50,
            min_term_length: 3,
            min_term_frequency: 1,
            similarity_threshold: 0.85,
            max_entries: 1_000,
            max_content_length: 10_000,
        }
    }
}

impl FingerprintConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum signature size.
    pub fn max_terms(mut self, k: usize) -> Self {
        self.max_terms = k;
        self
    }

    /// Set the minimum token length for signature terms.
    pub fn min_term_length(mut self, len: usize) -> Self {
        self.min_term_length = len;
        self
    }

    /// Set the minimum term frequency for signature terms.
    pub fn min_term_frequency(mut self, freq: u32) -> Self {
        self.min_term_frequency = freq;
        self
    }

    /// Set the near-duplicate reporting threshold.
    pub fn similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Set the index bound.
    pub fn max_entries(mut self, n: usize) -> Self {
        self.max_entries = n.max(1);
        self
    }

    /// Set the truncation length for large content.
    pub fn max_content_length(mut self, chars: usize) -> Self {
        self.max_content_length = chars;
        self
    }
}

/// Compact content representation for duplicate detection.
#[derive(Debug, Clone)]
pub struct Fingerprint {
    /// Strong hash of the normalized content — the exact-match key.
    pub hash: u64,
    /// Top-K frequent-term signature, bounded by the configured K.
    pub signature: BTreeSet<String>,
    /// Content-type tag; similarity is only defined between equal tags.
    pub content_type: ContentType,
    /// Wall-clock creation time.
    pub created_at: SystemTime,
}

/// One indexed fingerprint with its cached value.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    /// The cached result for this content, opaque to the cache.
    pub value: Value,
    /// Optional caller-supplied metadata/tags.
    pub metadata: Option<Value>,
}

/// A successful lookup.
#[derive(Debug, Clone)]
pub struct SimilarityMatch {
    pub entry: CacheEntry,
    /// Jaccard score, or 1.0 for an exact hash match.
    pub similarity: f64,
    /// Whether the strong hashes were identical.
    pub exact: bool,
}

/// Insertion-ordered fingerprint index with FIFO eviction.
///
/// Lookups never error for "not found" — absence is `None`. Values are
/// cloned out on retrieval; the cache and the caller share them
/// read-only.
pub struct FingerprintCache {
    config: FingerprintConfig,
    index: Mutex<VecDeque<CacheEntry>>,
}

impl FingerprintCache {
    /// Create an empty cache.
    pub fn new(config: FingerprintConfig) -> Self {
        Self {
            config,
            index: Mutex::new(VecDeque::new()),
        }
    }

    /// Compute a fingerprint without touching the index.
    pub fn create_fingerprint(&self, content: &str, content_type: ContentType) -> Fingerprint {
        let normalized =
            signature::normalize(content, content_type, self.config.max_content_length);
        let freqs = signature::term_frequencies(&normalized, self.config.min_term_length);
        let sig = signature::signature(&freqs, self.config.max_terms, self.config.min_term_frequency);
        Fingerprint {
            hash: content_hash(&normalized, content_type),
            signature: sig,
            content_type,
            created_at: SystemTime::now(),
        }
    }

    /// Jaccard similarity between two fingerprints, or `None` when their
    /// content types differ (similarity is undefined across types).
    pub fn similarity(&self, a: &Fingerprint, b: &Fingerprint) -> Option<f64> {
        if a.content_type != b.content_type {
            return None;
        }
        Some(signature::jaccard(&a.signature, &b.signature))
    }

    /// Look up `content` in the index.
    ///
    /// An identical strong hash wins immediately (`exact`, similarity
    /// 1.0). Otherwise the best Jaccard score among same-content-type
    /// entries is returned when it reaches the configured threshold.
    pub fn find_similar(&self, content: &str, content_type: ContentType) -> Option<SimilarityMatch> {
        let needle = self.create_fingerprint(content, content_type);
        let index = self.index.lock().expect("fingerprint lock poisoned");

        if let Some(entry) = index.iter().find(|e| e.fingerprint.hash == needle.hash) {
            metrics::counter!(telemetry::CACHE_HITS_TOTAL, "kind" => "exact").increment(1);
            return Some(SimilarityMatch {
                entry: entry.clone(),
                similarity: 1.0,
                exact: true,
            });
        }

        let best = index
            .iter()
            .filter(|e| e.fingerprint.content_type == content_type)
            .map(|e| {
                let score = signature::jaccard(&e.fingerprint.signature, &needle.signature);
                (e, score)
            })
            .max_by(|a, b| a.1.total_cmp(&b.1));

        match best {
            Some((entry, score)) if score >= self.config.similarity_threshold => {
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "kind" => "similar").increment(1);
                Some(SimilarityMatch {
                    entry: entry.clone(),
                    similarity: score,
                    exact: false,
                })
            }
            _ => {
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "kind" => "fingerprint")
                    .increment(1);
                None
            }
        }
    }

    /// Fingerprint `content` and index it with its cached value.
    ///
    /// Evicts the oldest entry when the index outgrows its bound.
    pub fn add_to_cache(
        &self,
        content: &str,
        content_type: ContentType,
        value: Value,
        metadata: Option<Value>,
    ) -> Fingerprint {
        let fingerprint = self.create_fingerprint(content, content_type);
        let mut index = self.index.lock().expect("fingerprint lock poisoned");
        index.push_back(CacheEntry {
            fingerprint: fingerprint.clone(),
            value,
            metadata,
        });
        while index.len() > self.config.max_entries {
            index.pop_front();
            metrics::counter!(telemetry::EVICTIONS_TOTAL).increment(1);
        }
        fingerprint
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        self.index.lock().expect("fingerprint lock poisoned").len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every indexed entry.
    pub fn clear(&self) {
        self.index
            .lock()
            .expect("fingerprint lock poisoned")
            .clear();
    }
}

/// Strong hash of normalized content plus the content-type tag.
///
/// `DefaultHasher` (SipHash) is deterministic within a process lifetime,
/// which is sufficient for an in-memory index. A persistent or shared
/// index would want a stable cross-process hash instead.
fn content_hash(normalized: &str, content_type: ContentType) -> u64 {
    let mut hasher = DefaultHasher::new();
    content_type.tag().hash(&mut hasher);
    normalized.hash(&mut hasher);
    hasher.finish()
}
