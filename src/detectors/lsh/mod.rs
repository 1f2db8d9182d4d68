//! MinHash and locality-sensitive hashing over integer token sets.
//!
//! This module provides approximate nearest-neighbour candidate generation
//! for the fuzzy matching phase: MinHash signatures over token sets and a
//! banded LSH index whose band layout is derived from the configured
//! Jaccard threshold.

pub mod index;
pub mod signature;

pub use index::LshIndex;
pub use signature::MinHashSignature;

use ahash::AHashSet;
use xxhash_rust::xxh3::xxh3_64_with_seed;

/// Fixed seed base; signatures are deterministic for a given permutation
/// count.
const MINHASH_SEED_BASE: u64 = 0x636c_6f6e_6574_7261;

fn hash_token(token: i64, permutation: usize) -> u64 {
    let seed = MINHASH_SEED_BASE.wrapping_add(permutation as u64);
    xxh3_64_with_seed(&token.to_le_bytes(), seed)
}

/// Generate the MinHash signature of a token sequence's *set* of tokens.
///
/// An empty sequence yields the all-`u64::MAX` signature, which estimates
/// zero similarity against every non-degenerate signature.
pub fn minhash_signature(tokens: &[i64], num_permutations: usize) -> MinHashSignature {
    let distinct: AHashSet<i64> = tokens.iter().copied().collect();
    let mut values = vec![u64::MAX; num_permutations];

    for &token in &distinct {
        for (permutation, slot) in values.iter_mut().enumerate() {
            let hash = hash_token(token, permutation);
            if hash < *slot {
                *slot = hash;
            }
        }
    }

    MinHashSignature::new(values, num_permutations)
}
