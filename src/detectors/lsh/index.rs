//! Banded LSH index for approximate candidate search.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use ahash::{AHasher, AHashSet};
use tracing::debug;

use crate::core::config::LshConfig;
use crate::detectors::lsh::{minhash_signature, MinHashSignature};

/// MinHash-LSH index over integer token sets.
///
/// Signatures are split into bands; two entries collide when any band
/// hashes identically, which concentrates collision probability around the
/// configured Jaccard threshold. Candidates may include false positives;
/// callers filter them with exact similarity downstream.
#[derive(Debug)]
pub struct LshIndex {
    num_permutations: usize,
    num_bands: usize,
    rows_per_band: usize,
    bands: Vec<HashMap<u64, Vec<String>>>,
    signatures: HashMap<String, MinHashSignature>,
}

impl LshIndex {
    /// Create an empty index with the band layout derived from `config`.
    pub fn new(config: &LshConfig) -> Self {
        let (num_bands, rows_per_band) = config.band_layout();
        debug!(
            num_permutations = config.num_permutations,
            num_bands, rows_per_band, "created LSH index"
        );
        Self {
            num_permutations: config.num_permutations,
            num_bands,
            rows_per_band,
            bands: vec![HashMap::new(); num_bands],
            signatures: HashMap::new(),
        }
    }

    /// Insert a block's token sequence. Empty token sets are not indexed.
    pub fn insert(&mut self, block_id: impl Into<String>, tokens: &[i64]) {
        if tokens.is_empty() {
            return;
        }

        let block_id = block_id.into();
        let signature = minhash_signature(tokens, self.num_permutations);

        // Compute band hashes first; the loop below mutates the buckets
        let band_hashes: Vec<(usize, u64)> = self.band_hashes(&signature).collect();
        for (band_idx, band_hash) in band_hashes {
            self.bands[band_idx]
                .entry(band_hash)
                .or_default()
                .push(block_id.clone());
        }

        self.signatures.insert(block_id, signature);
    }

    /// Candidate block ids for the query tokens, ordered by estimated
    /// Jaccard similarity descending, ties by block id ascending.
    ///
    /// An empty token set yields no candidates.
    pub fn query(&self, tokens: &[i64]) -> Vec<String> {
        if tokens.is_empty() || self.signatures.is_empty() {
            return Vec::new();
        }

        let signature = minhash_signature(tokens, self.num_permutations);
        let mut seen: AHashSet<&str> = AHashSet::new();

        for (band_idx, band_hash) in self.band_hashes(&signature) {
            if let Some(entries) = self.bands[band_idx].get(&band_hash) {
                for candidate in entries {
                    seen.insert(candidate.as_str());
                }
            }
        }

        let mut ranked: Vec<(f64, &str)> = seen
            .into_iter()
            .filter_map(|candidate| {
                let estimate = self.signatures[candidate].jaccard_estimate(&signature)?;
                Some((estimate, candidate))
            })
            .collect();

        ranked.sort_by(|(est_a, id_a), (est_b, id_b)| {
            est_b
                .partial_cmp(est_a)
                .unwrap_or(Ordering::Equal)
                .then_with(|| id_a.cmp(id_b))
        });

        ranked
            .into_iter()
            .map(|(_, candidate)| candidate.to_string())
            .collect()
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    /// Whether the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Remove all entries, keeping the band layout.
    pub fn clear(&mut self) {
        for band in &mut self.bands {
            band.clear();
        }
        self.signatures.clear();
    }

    fn band_hashes<'a>(
        &'a self,
        signature: &'a MinHashSignature,
    ) -> impl Iterator<Item = (usize, u64)> + 'a {
        (0..self.num_bands).filter_map(move |band_idx| {
            let start = band_idx * self.rows_per_band;
            let end = (start + self.rows_per_band).min(signature.values.len());
            if start >= signature.values.len() {
                return None;
            }
            Some((band_idx, hash_band(&signature.values[start..end])))
        })
    }
}

fn hash_band(rows: &[u64]) -> u64 {
    let mut hasher = AHasher::default();
    rows.hash(&mut hasher);
    hasher.finish()
}
