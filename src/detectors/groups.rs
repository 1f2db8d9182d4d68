//! Clone-group construction within one revision.
//!
//! A clone group is a connected component of the revision's similarity
//! graph: blocks are vertices, clone pairs whose effective similarity meets
//! the group threshold are edges. Singleton blocks form singleton groups so
//! that every block belongs to exactly one group.

use std::collections::BTreeMap;

use ahash::{AHashMap, AHashSet};
use serde::Serialize;
use tracing::warn;

use crate::core::errors::{CloneTraceError, Result};
use crate::core::model::{ClonePair, CodeBlock};
use crate::core::union_find::DisjointSet;

/// A connected component of one revision's similarity graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CloneGroup {
    /// Canonical identifier: the lexicographically smallest member block id
    pub group_id: String,
    /// Sorted member block ids
    pub members: Vec<String>,
    /// Effective similarity per recorded member pair, keyed by the ordered
    /// id pair
    pub pair_similarities: BTreeMap<(String, String), u32>,
}

impl CloneGroup {
    /// Number of members.
    pub fn size(&self) -> usize {
        self.members.len()
    }

    /// Whether the group is a clone group proper (two or more members).
    pub fn is_clone(&self) -> bool {
        self.size() >= 2
    }

    /// Whether `block_id` is a member.
    pub fn contains(&self, block_id: &str) -> bool {
        self.members.binary_search_by(|m| m.as_str().cmp(block_id)).is_ok()
    }

    /// Mean similarity over recorded pairs; `None` without pairs.
    pub fn avg_similarity(&self) -> Option<f64> {
        if self.pair_similarities.is_empty() {
            return None;
        }
        let sum: u64 = self.pair_similarities.values().map(|&s| u64::from(s)).sum();
        Some(sum as f64 / self.pair_similarities.len() as f64)
    }

    /// Minimum similarity over recorded pairs; `None` without pairs.
    pub fn min_similarity(&self) -> Option<u32> {
        self.pair_similarities.values().min().copied()
    }

    /// Maximum similarity over recorded pairs; `None` without pairs.
    pub fn max_similarity(&self) -> Option<u32> {
        self.pair_similarities.values().max().copied()
    }

    /// Recorded edges over possible edges; 0.0 for singletons.
    pub fn density(&self) -> f64 {
        if self.size() <= 1 {
            return 0.0;
        }
        let possible = self.size() * (self.size() - 1) / 2;
        self.pair_similarities.len() as f64 / possible as f64
    }
}

/// Builds clone groups from one revision's blocks and clone pairs.
#[derive(Debug, Clone)]
pub struct GroupDetector {
    group_threshold: u32,
}

impl Default for GroupDetector {
    fn default() -> Self {
        Self::new(70)
    }
}

impl GroupDetector {
    /// Create a detector with the given group-formation threshold (0–100).
    pub fn new(group_threshold: u32) -> Self {
        Self { group_threshold }
    }

    /// Detect all groups of a revision, keyed and ordered by group id.
    ///
    /// Every block id is inserted up front so singletons are preserved. A
    /// pair referencing a block absent from `blocks` is a
    /// [`MissingData`](CloneTraceError::MissingData) error.
    pub fn detect(
        &self,
        revision_id: &str,
        blocks: &[CodeBlock],
        pairs: &[ClonePair],
    ) -> Result<BTreeMap<String, CloneGroup>> {
        let known: AHashSet<&str> = blocks.iter().map(|b| b.block_id.as_str()).collect();

        let mut ds = DisjointSet::new();
        for block in blocks {
            ds.find(&block.block_id);
        }

        let mut pair_similarities: AHashMap<(String, String), u32> = AHashMap::new();

        for pair in pairs {
            for endpoint in [&pair.block_id_1, &pair.block_id_2] {
                if !known.contains(endpoint.as_str()) {
                    return Err(CloneTraceError::missing_data(revision_id, endpoint));
                }
            }

            let similarity = pair.effective_similarity(self.group_threshold);
            if similarity < self.group_threshold {
                continue;
            }

            ds.union(&pair.block_id_1, &pair.block_id_2);

            let key = ordered_pair(&pair.block_id_1, &pair.block_id_2);
            let entry = pair_similarities.entry(key).or_insert(similarity);
            *entry = (*entry).max(similarity);
        }

        let mut groups = BTreeMap::new();
        for (_, members) in ds.groups() {
            let group_id = members[0].clone(); // members are sorted

            let mut group_pairs = BTreeMap::new();
            if members.len() > 1 {
                let member_set: AHashSet<&str> = members.iter().map(String::as_str).collect();
                for (key, &similarity) in &pair_similarities {
                    if member_set.contains(key.0.as_str()) && member_set.contains(key.1.as_str()) {
                        group_pairs.insert(key.clone(), similarity);
                    }
                }
            }

            if members.len() > 1 && group_pairs.is_empty() {
                warn!(
                    revision_id,
                    group_id = %group_id,
                    size = members.len(),
                    "clone group has no recorded pair similarities"
                );
            }

            groups.insert(
                group_id.clone(),
                CloneGroup {
                    group_id,
                    members,
                    pair_similarities: group_pairs,
                },
            );
        }

        Ok(groups)
    }
}

fn ordered_pair(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Index mapping every member block id to its group id.
pub fn group_index(groups: &BTreeMap<String, CloneGroup>) -> AHashMap<String, String> {
    let mut index = AHashMap::new();
    for group in groups.values() {
        for member in &group.members {
            index.insert(member.clone(), group.group_id.clone());
        }
    }
    index
}
