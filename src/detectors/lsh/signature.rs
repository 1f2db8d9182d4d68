//! MinHash signature type for LSH similarity estimation.

use serde::{Deserialize, Serialize};

/// MinHash signature for efficient Jaccard estimation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinHashSignature {
    /// The per-permutation minimum hash values
    pub values: Vec<u64>,

    /// Number of permutations used to generate this signature
    pub num_permutations: usize,
}

impl MinHashSignature {
    /// Create a new MinHash signature
    pub fn new(values: Vec<u64>, num_permutations: usize) -> Self {
        Self {
            values,
            num_permutations,
        }
    }

    /// Estimate Jaccard similarity against another signature.
    ///
    /// Returns `None` when the signatures were generated with different
    /// permutation counts.
    pub fn jaccard_estimate(&self, other: &Self) -> Option<f64> {
        if self.values.len() != other.values.len() || self.values.is_empty() {
            return None;
        }

        let matching = self
            .values
            .iter()
            .zip(other.values.iter())
            .filter(|(a, b)| a == b)
            .count();

        Some(matching as f64 / self.values.len() as f64)
    }
}
