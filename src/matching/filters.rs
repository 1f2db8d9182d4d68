//! Candidate pre-filters and the shared similarity cache for the fuzzy
//! matching phase.
//!
//! Both filters are cheap set operations that discard hopeless candidate
//! pairs before the quadratic LCS kernel runs. The cache memoises LCS
//! scores, which are independent of the pass threshold; n-gram scores are
//! recomputed from the pre-built bigram sets since they cost a set
//! intersection.

use ahash::AHashSet;
use dashmap::DashMap;

use crate::detectors::similarity::{bigram_set, token_set_jaccard};

/// Pre-computed per-block features consulted by the filters and the quick
/// n-gram ranking.
#[derive(Debug)]
pub struct BlockFeatures {
    /// Token sequence length
    pub len: usize,
    /// Distinct tokens
    pub token_set: AHashSet<i64>,
    /// Contiguous bigram set
    pub bigrams: AHashSet<(i64, i64)>,
}

impl BlockFeatures {
    /// Compute features for a token sequence.
    pub fn from_tokens(tokens: &[i64]) -> Self {
        Self {
            len: tokens.len(),
            token_set: tokens.iter().copied().collect(),
            bigrams: bigram_set(tokens),
        }
    }

    /// Token-set Jaccard against another block's features.
    pub fn jaccard(&self, other: &Self) -> f64 {
        token_set_jaccard(&self.token_set, &other.token_set)
    }
}

/// Whether a candidate pair should be skipped because the token-length
/// difference ratio `|len_a − len_b| / max(len_a, len_b)` exceeds
/// `max_ratio`. Pairs with an empty side are always skipped.
pub fn length_skip(len_a: usize, len_b: usize, max_ratio: f64) -> bool {
    if len_a == 0 || len_b == 0 {
        return true;
    }
    let max = len_a.max(len_b);
    let min = len_a.min(len_b);
    (max - min) as f64 / max as f64 > max_ratio
}

/// Concurrent memo of LCS similarity scores keyed by the unordered block-id
/// pair. Scoped to a single revision pair.
#[derive(Debug, Default)]
pub struct SimilarityCache {
    scores: DashMap<(String, String), u32>,
}

impl SimilarityCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the cached LCS score for a pair.
    pub fn get(&self, a: &str, b: &str) -> Option<u32> {
        self.scores.get(&Self::key(a, b)).map(|entry| *entry)
    }

    /// Record the LCS score for a pair.
    pub fn insert(&self, a: &str, b: &str, score: u32) {
        self.scores.insert(Self::key(a, b), score);
    }

    /// Number of cached scores.
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    fn key(a: &str, b: &str) -> (String, String) {
        if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        }
    }
}
