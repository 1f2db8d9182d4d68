//! Similarity kernels over integer token sequences.
//!
//! All functions are pure. Scores are integers in 0–100. The canonical
//! cross-revision similarity is [`combined_similarity`]: the bigram Dice
//! score when it already meets the threshold, otherwise the LCS score
//! (optionally via the banded, early-terminating variant).

use ahash::AHashSet;

use crate::core::errors::{CloneTraceError, Result};

/// Parse the textual token-sequence form `[t1;t2;…]` into integers.
///
/// An empty bracket pair `[]` yields an empty sequence.
pub fn parse_token_sequence(text: &str) -> Result<Vec<i64>> {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| {
            CloneTraceError::token_sequence(format!("expected '[t1;t2;…]', got '{trimmed}'"))
        })?;

    let inner = inner.trim();
    if inner.is_empty() {
        return Ok(Vec::new());
    }

    inner
        .split(';')
        .map(|token| {
            token.trim().parse::<i64>().map_err(|_| {
                CloneTraceError::token_sequence(format!("invalid token '{}'", token.trim()))
            })
        })
        .collect()
}

/// The set of contiguous bigrams of a token sequence.
///
/// A one-token sequence contributes the single bigram `(t, t)`, so two
/// identical single-token sequences score 100 and differing ones score 0.
pub fn bigram_set(tokens: &[i64]) -> AHashSet<(i64, i64)> {
    match tokens.len() {
        0 => AHashSet::new(),
        1 => {
            let mut set = AHashSet::with_capacity(1);
            set.insert((tokens[0], tokens[0]));
            set
        }
        n => {
            let mut set = AHashSet::with_capacity(n - 1);
            for window in tokens.windows(2) {
                set.insert((window[0], window[1]));
            }
            set
        }
    }
}

/// Bigram Dice similarity: `round(100 · 2·|A∩B| / (|A|+|B|))` over the
/// *sets* of contiguous bigrams. Defined to be 0 when both sets are empty.
pub fn ngram_similarity(a: &[i64], b: &[i64]) -> u32 {
    ngram_similarity_from_sets(&bigram_set(a), &bigram_set(b))
}

/// Dice similarity over pre-computed bigram sets.
pub fn ngram_similarity_from_sets(a: &AHashSet<(i64, i64)>, b: &AHashSet<(i64, i64)>) -> u32 {
    let total = a.len() + b.len();
    if total == 0 {
        return 0;
    }

    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let intersection = small.iter().filter(|gram| large.contains(gram)).count();

    (200.0 * intersection as f64 / total as f64).round() as u32
}

/// LCS similarity: `round(100 · 2·LCS / (|a|+|b|))` by dynamic programming
/// in O(|a|·|b|). Defined to be 100 on two empty sequences.
pub fn lcs_similarity(a: &[i64], b: &[i64]) -> u32 {
    if a.is_empty() && b.is_empty() {
        return 100;
    }
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let lcs = lcs_length(a, b);
    score_from_lcs(lcs, a.len() + b.len())
}

fn score_from_lcs(lcs: usize, total_len: usize) -> u32 {
    (200.0 * lcs as f64 / total_len as f64).round() as u32
}

fn lcs_length(a: &[i64], b: &[i64]) -> usize {
    // Roll two rows; iterate the shorter sequence over columns
    let (rows, cols) = if a.len() <= b.len() { (b, a) } else { (a, b) };

    let mut prev = vec![0usize; cols.len() + 1];
    let mut cur = vec![0usize; cols.len() + 1];

    for &row_token in rows {
        for (j, &col_token) in cols.iter().enumerate() {
            cur[j + 1] = if row_token == col_token {
                prev[j] + 1
            } else {
                prev[j + 1].max(cur[j])
            };
        }
        std::mem::swap(&mut prev, &mut cur);
    }

    prev[cols.len()]
}

/// Outcome of a banded LCS computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandedLcs {
    /// Similarity score meeting the requested threshold
    Score(u32),
    /// The similarity cannot reach the threshold
    BelowThreshold,
}

/// LCS similarity restricted to a diagonal band, with early termination.
///
/// `band_width` defaults to `max(10, ⌊|shorter|·0.3⌋)`; the band is widened
/// by the length difference so near-diagonal alignments stay inside it.
/// After each row the reachable upper bound is checked and the computation
/// stops with [`BandedLcs::BelowThreshold`] once `threshold` is out of
/// reach. A returned score matches the exact LCS similarity to within one
/// unit whenever the optimal alignment shift stays inside the band; a
/// `BelowThreshold` outcome means the exact similarity is under the
/// threshold within the same tolerance.
pub fn banded_lcs_similarity(
    a: &[i64],
    b: &[i64],
    threshold: u32,
    band_width: Option<usize>,
) -> BandedLcs {
    if a.is_empty() && b.is_empty() {
        return gate(100, threshold);
    }
    if a.is_empty() || b.is_empty() {
        return gate(0, threshold);
    }

    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let total = a.len() + b.len();
    let diff = long.len() - short.len();
    let width = band_width.unwrap_or_else(|| (short.len() * 3 / 10).max(10));

    // Cheap bound first: LCS can never exceed the shorter length
    if score_from_lcs(short.len(), total) < threshold {
        return BandedLcs::BelowThreshold;
    }

    let mut prev = vec![0usize; long.len() + 1];
    let mut cur = vec![0usize; long.len() + 1];

    for (i, &row_token) in short.iter().enumerate() {
        let row = i + 1;
        // Out-of-band columns inherit the row above (skip-row transition)
        cur.copy_from_slice(&prev);

        let lo = row.saturating_sub(width).max(1);
        let hi = (row + diff + width).min(long.len());

        for j in lo..=hi {
            cur[j] = if row_token == long[j - 1] {
                prev[j - 1] + 1
            } else {
                prev[j].max(cur[j - 1])
            };
        }

        // Each remaining row can add at most one to the LCS
        let row_best = cur.iter().copied().max().unwrap_or(0);
        let reachable = row_best + (short.len() - row);
        if score_from_lcs(reachable, total) < threshold {
            return BandedLcs::BelowThreshold;
        }

        std::mem::swap(&mut prev, &mut cur);
    }

    gate(score_from_lcs(prev[long.len()], total), threshold)
}

fn gate(score: u32, threshold: u32) -> BandedLcs {
    if score >= threshold {
        BandedLcs::Score(score)
    } else {
        BandedLcs::BelowThreshold
    }
}

/// Canonical cross-revision similarity: the n-gram score when it meets
/// `threshold`, otherwise the exact LCS score.
pub fn combined_similarity(a: &[i64], b: &[i64], threshold: u32) -> u32 {
    let ngram = ngram_similarity(a, b);
    if ngram >= threshold {
        ngram
    } else {
        lcs_similarity(a, b)
    }
}

/// Jaccard similarity of the token *sets* of two sequences. Used as a cheap
/// pre-filter before the quadratic kernels.
pub fn token_set_jaccard(a: &AHashSet<i64>, b: &AHashSet<i64>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let intersection = small.iter().filter(|token| large.contains(token)).count();
    let union = a.len() + b.len() - intersection;

    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_token_sequence() {
        assert_eq!(parse_token_sequence("[1;2;3]").unwrap(), vec![1, 2, 3]);
        assert_eq!(
            parse_token_sequence("[ 10 ; -4 ; 7 ]").unwrap(),
            vec![10, -4, 7]
        );
        assert_eq!(parse_token_sequence("[]").unwrap(), Vec::<i64>::new());
    }

    #[test]
    fn test_parse_token_sequence_rejects_malformed() {
        assert!(parse_token_sequence("1;2;3").is_err());
        assert!(parse_token_sequence("[1;x;3]").is_err());
        assert!(parse_token_sequence("[1;2").is_err());
        assert!(parse_token_sequence("").is_err());
    }

    #[test]
    fn test_ngram_identical_sequences() {
        let tokens = vec![1, 2, 3, 4, 5];
        assert_eq!(ngram_similarity(&tokens, &tokens), 100);
    }

    #[test]
    fn test_ngram_disjoint_sequences() {
        assert_eq!(ngram_similarity(&[1, 2, 3], &[7, 8, 9]), 0);
    }

    #[test]
    fn test_ngram_single_tokens() {
        assert_eq!(ngram_similarity(&[5], &[5]), 100);
        assert_eq!(ngram_similarity(&[5], &[6]), 0);
    }

    #[test]
    fn test_ngram_empty_is_zero() {
        assert_eq!(ngram_similarity(&[], &[]), 0);
        assert_eq!(ngram_similarity(&[], &[1, 2]), 0);
    }

    #[test]
    fn test_ngram_one_token_changed() {
        // [1,2,3,4,5] vs [1,2,3,4,9]: bigrams {12,23,34,45} vs {12,23,34,49}
        // Dice = 2*3/8 = 75
        assert_eq!(ngram_similarity(&[1, 2, 3, 4, 5], &[1, 2, 3, 4, 9]), 75);
    }

    #[test]
    fn test_lcs_empty_pairs() {
        assert_eq!(lcs_similarity(&[], &[]), 100);
        assert_eq!(lcs_similarity(&[1], &[]), 0);
    }

    #[test]
    fn test_lcs_identical() {
        assert_eq!(lcs_similarity(&[1, 2, 3, 4], &[1, 2, 3, 4]), 100);
    }

    #[test]
    fn test_lcs_partial_overlap() {
        // LCS([1,2,3], [2,3,4]) = 2 → 2·2/6 = 67
        assert_eq!(lcs_similarity(&[1, 2, 3], &[2, 3, 4]), 67);
    }

    #[test]
    fn test_banded_agrees_with_plain_on_similar_sequences() {
        let a: Vec<i64> = (0..200).collect();
        let mut b = a.clone();
        b[50] = 999;
        b[120] = 998;

        let exact = lcs_similarity(&a, &b);
        match banded_lcs_similarity(&a, &b, 70, None) {
            BandedLcs::Score(score) => assert!((i64::from(score) - i64::from(exact)).abs() <= 1),
            BandedLcs::BelowThreshold => panic!("similar sequences fell below threshold"),
        }
    }

    #[test]
    fn test_banded_terminates_below_threshold() {
        let a: Vec<i64> = (0..300).collect();
        let b: Vec<i64> = (1000..1300).collect();

        assert_eq!(
            banded_lcs_similarity(&a, &b, 70, None),
            BandedLcs::BelowThreshold
        );
        assert_eq!(lcs_similarity(&a, &b), 0);
    }

    #[test]
    fn test_banded_empty_sequences() {
        assert_eq!(banded_lcs_similarity(&[], &[], 70, None), BandedLcs::Score(100));
        assert_eq!(
            banded_lcs_similarity(&[1, 2], &[], 70, None),
            BandedLcs::BelowThreshold
        );
    }

    #[test]
    fn test_combined_prefers_ngram_at_threshold() {
        let a = vec![1, 2, 3, 4, 5];
        let b = vec![1, 2, 3, 4, 9];
        // n-gram = 75 ≥ 70, LCS never computed
        assert_eq!(combined_similarity(&a, &b, 70), 75);
        // with a higher threshold the n-gram misses and LCS (8/10 → 80) wins
        assert_eq!(combined_similarity(&a, &b, 80), 80);
    }

    #[test]
    fn test_token_set_jaccard() {
        let a: AHashSet<i64> = [1, 2, 3, 4].into_iter().collect();
        let b: AHashSet<i64> = [3, 4, 5, 6].into_iter().collect();
        let j = token_set_jaccard(&a, &b);
        assert!((j - 2.0 / 6.0).abs() < 1e-9);

        assert_eq!(token_set_jaccard(&AHashSet::new(), &a), 0.0);
    }
}
