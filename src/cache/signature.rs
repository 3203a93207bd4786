//! Content normalization, term extraction, and signature similarity.
//!
//! A signature is the top-K most frequent terms of the normalized
//! content, stop-word-filtered and bounded, held as an unordered set.
//! Similarity is Jaccard over signature sets — intersection size over
//! union size — and is only defined between fingerprints of the same
//! content type.

use std::collections::{BTreeSet, HashMap};

/// How content is normalized before fingerprinting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// Natural-language text: case-folded, whitespace collapsed.
    Prose,
    /// Code-like content: case preserved (identifiers are case-sensitive),
    /// whitespace still collapsed.
    Code,
}

impl ContentType {
    pub(crate) fn tag(&self) -> &'static str {
        match self {
            Self::Prose => "prose",
            Self::Code => "code",
        }
    }
}

/// Common English words excluded from signatures. Sorted for binary search.
static STOP_WORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "because",
    "been", "but", "by", "can", "could", "did", "do", "does", "for", "from", "had", "has", "have",
    "how", "if", "in", "into", "is", "it", "its", "just", "more", "most", "not", "of", "on", "or",
    "our", "out", "over", "so", "some", "such", "than", "that", "the", "their", "then", "there",
    "these", "they", "this", "through", "to", "under", "was", "were", "what", "when", "where",
    "which", "who", "will", "with", "would", "you", "your",
];

fn is_stop_word(term: &str) -> bool {
    let lowered = term.to_lowercase();
    STOP_WORDS.binary_search(&lowered.as_str()).is_ok()
}

/// Normalize content for fingerprinting.
///
/// Content beyond `max_chars` is truncated first, trading precision for
/// bounded cost on large inputs. Whitespace runs collapse to single
/// spaces; prose is additionally case-folded.
pub(crate) fn normalize(content: &str, content_type: ContentType, max_chars: usize) -> String {
    let truncated: String = content.chars().take(max_chars).collect();
    let collapsed = truncated.split_whitespace().collect::<Vec<_>>().join(" ");
    match content_type {
        ContentType::Prose => collapsed.to_lowercase(),
        ContentType::Code => collapsed,
    }
}

/// Split normalized content into candidate terms and count frequencies.
///
/// Tokens split on non-alphanumeric boundaries; tokens shorter than
/// `min_len` or in the stop-word set are discarded.
pub(crate) fn term_frequencies(normalized: &str, min_len: usize) -> HashMap<String, u32> {
    let mut freqs = HashMap::new();
    for token in normalized.split(|c: char| !c.is_alphanumeric()) {
        if token.len() < min_len || is_stop_word(token) {
            continue;
        }
        *freqs.entry(token.to_string()).or_insert(0) += 1;
    }
    freqs
}

/// Reduce term frequencies to a bounded signature set.
///
/// Takes the top `max_terms` terms by frequency that meet `min_freq`.
/// Ties break alphabetically so signatures are deterministic.
pub(crate) fn signature(
    freqs: &HashMap<String, u32>,
    max_terms: usize,
    min_freq: u32,
) -> BTreeSet<String> {
    let mut terms: Vec<(&String, &u32)> = freqs.iter().filter(|(_, f)| **f >= min_freq).collect();
    terms.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    terms
        .into_iter()
        .take(max_terms)
        .map(|(term, _)| term.clone())
        .collect()
}

/// Jaccard similarity between two signature sets.
///
/// Empty-against-empty is defined as 0.0 — content with no signature
/// terms can only match via the exact-hash path.
pub(crate) fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}
