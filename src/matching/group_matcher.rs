//! Cross-revision clone-group matching by member overlap.
//!
//! An old group matches the new group that absorbs the largest share of its
//! matched members, provided the share meets the overlap threshold. After
//! the matching pass, split and merge flags are derived: a split is one
//! source group with two or more targets each meeting the threshold on its
//! own; a merge is one target group accepted by two or more source groups.

use std::collections::BTreeMap;

use ahash::AHashMap;
use serde::Serialize;
use tracing::debug;

use crate::core::config::validate_unit_range;
use crate::core::errors::Result;
use crate::detectors::groups::{group_index, CloneGroup};
use crate::matching::method_matcher::MatchOutcome;

/// Outcome of matching one source group against the new revision's groups.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupMatch {
    /// The source group in the old revision
    pub source_group_id: String,
    /// Accepted target group, `None` when no candidate met the threshold
    pub target_group_id: Option<String>,
    /// Source members whose matched counterpart lies in the best candidate
    pub overlap_count: usize,
    /// `overlap_count / source_size`
    pub overlap_ratio: f64,
    /// Member count of the source group
    pub source_size: usize,
    /// Member count of the accepted target group
    pub target_size: Option<usize>,
    /// The source group scattered into several qualifying targets
    pub split: bool,
    /// The accepted target also absorbed another source group
    pub merge: bool,
}

/// Matches clone groups between consecutive revisions.
#[derive(Debug, Clone)]
pub struct GroupMatcher {
    overlap_threshold: f64,
}

impl Default for GroupMatcher {
    fn default() -> Self {
        Self {
            overlap_threshold: 0.5,
        }
    }
}

impl GroupMatcher {
    /// Create a matcher with the given overlap threshold (0.0–1.0).
    pub fn new(overlap_threshold: f64) -> Result<Self> {
        validate_unit_range(overlap_threshold, "overlap_threshold")?;
        Ok(Self { overlap_threshold })
    }

    /// Match every old group onto the new revision, keyed by source group
    /// id. Split and merge flags are attached to the returned rows.
    pub fn match_groups(
        &self,
        groups_old: &BTreeMap<String, CloneGroup>,
        groups_new: &BTreeMap<String, CloneGroup>,
        methods: &MatchOutcome,
    ) -> BTreeMap<String, GroupMatch> {
        let new_group_of = group_index(groups_new);
        let mut matches: BTreeMap<String, GroupMatch> = BTreeMap::new();

        for (old_group_id, old_group) in groups_old {
            // Count, per new group, the members whose match landed there
            let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
            for member in &old_group.members {
                let Some(target_block) = methods.target_of(member) else {
                    continue;
                };
                if let Some(new_group_id) = new_group_of.get(target_block) {
                    *counts.entry(new_group_id.as_str()).or_insert(0) += 1;
                }
            }

            // Argmax with ties to the smallest group id (map iteration order)
            let mut best: Option<(&str, usize)> = None;
            for (&group_id, &count) in &counts {
                if best.map_or(true, |(_, best_count)| count > best_count) {
                    best = Some((group_id, count));
                }
            }

            let qualifying_targets = counts
                .values()
                .filter(|&&count| count as f64 / old_group.size() as f64 >= self.overlap_threshold)
                .count();

            let entry = match best {
                Some((candidate, count)) => {
                    let ratio = count as f64 / old_group.size() as f64;
                    let accepted = ratio >= self.overlap_threshold;
                    GroupMatch {
                        source_group_id: old_group_id.clone(),
                        target_group_id: accepted.then(|| candidate.to_string()),
                        overlap_count: count,
                        overlap_ratio: ratio,
                        source_size: old_group.size(),
                        target_size: accepted.then(|| groups_new[candidate].size()),
                        split: qualifying_targets >= 2,
                        merge: false,
                    }
                }
                None => GroupMatch {
                    source_group_id: old_group_id.clone(),
                    target_group_id: None,
                    overlap_count: 0,
                    overlap_ratio: 0.0,
                    source_size: old_group.size(),
                    target_size: None,
                    split: false,
                    merge: false,
                },
            };

            matches.insert(old_group_id.clone(), entry);
        }

        // Merge detection: a target accepted by two or more sources
        let mut accepted_per_target: AHashMap<String, usize> = AHashMap::new();
        for group_match in matches.values() {
            if let Some(target) = &group_match.target_group_id {
                *accepted_per_target.entry(target.clone()).or_insert(0) += 1;
            }
        }
        for group_match in matches.values_mut() {
            if let Some(target) = &group_match.target_group_id {
                group_match.merge = accepted_per_target[target] >= 2;
            }
        }

        debug!(
            old_groups = groups_old.len(),
            new_groups = groups_new.len(),
            matched = matches
                .values()
                .filter(|m| m.target_group_id.is_some())
                .count(),
            splits = matches.values().filter(|m| m.split).count(),
            merges = matches.values().filter(|m| m.merge).count(),
            "group matching complete"
        );

        matches
    }
}
