//! Clone-group evolution tracking across the revision sequence.
//!
//! Mirrors the method tracker's orchestration but accumulates group
//! lineages: a group inherits the lineage of its accepted source group,
//! and a group whose members merged in from several sources inherits from
//! the dominant one. Old groups without an accepted target emit a terminal
//! dissolved row at the revision in which they disappear.

use std::collections::BTreeMap;

use ahash::AHashMap;
use tracing::{info, warn};

use crate::core::cancel::CancelToken;
use crate::core::config::TrackingConfig;
use crate::core::errors::{CloneTraceError, Result};
use crate::core::model::{RevisionData, RevisionInfo};
use crate::detectors::groups::{CloneGroup, GroupDetector};
use crate::io::source::RevisionSource;
use crate::io::trace::{GroupTrace, GroupTraceRow, MembershipRow};
use crate::matching::group_matcher::{GroupMatch, GroupMatcher};
use crate::matching::method_matcher::{MatchOutcome, MethodMatcher};
use crate::matching::states::{GroupState, StateClassifier};
use crate::tracking::lifetime::LifetimeLedger;

/// Tracks clone-group evolution across revisions.
#[derive(Debug)]
pub struct GroupTracker {
    config: TrackingConfig,
    matcher: MethodMatcher,
    detector: GroupDetector,
    group_matcher: GroupMatcher,
    classifier: StateClassifier,
}

impl GroupTracker {
    /// Create a tracker, rejecting invalid configuration up front.
    pub fn new(config: TrackingConfig) -> Result<Self> {
        config.validate()?;
        let matcher = MethodMatcher::new(config.matcher.clone())?;
        let detector = GroupDetector::new(config.matcher.similarity_threshold);
        let group_matcher = GroupMatcher::new(config.overlap_threshold)?;
        let classifier = StateClassifier::new(config.group_size_tolerance);
        Ok(Self {
            config,
            matcher,
            detector,
            group_matcher,
            classifier,
        })
    }

    /// The active configuration.
    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    /// Track all revisions supplied by `source`.
    pub fn track(&self, source: &dyn RevisionSource) -> Result<GroupTrace> {
        self.track_with(source, &CancelToken::new())
    }

    /// Track with cooperative cancellation, checked at revision-pair
    /// boundaries.
    pub fn track_with(
        &self,
        source: &dyn RevisionSource,
        cancel: &CancelToken,
    ) -> Result<GroupTrace> {
        let (start, end) = match &self.config.date_range {
            Some(range) => (Some(range.start), Some(range.end)),
            None => (None, None),
        };
        let revisions = source.enumerate(start, end)?;
        for window in revisions.windows(2) {
            if window[1].timestamp < window[0].timestamp {
                return Err(CloneTraceError::internal_with(
                    "revision stream is not ordered by timestamp",
                    format!(
                        "'{}' precedes '{}'",
                        window[1].revision_id, window[0].revision_id
                    ),
                ));
            }
        }

        let mut trace = GroupTrace::default();
        let Some(first) = revisions.first() else {
            return Ok(trace);
        };

        let mut ledger = LifetimeLedger::new();
        // group id in the previous revision → stable lineage id
        let mut lineage_prev: AHashMap<String, String> = AHashMap::new();

        let mut prev_data = self.load(source, first)?;
        let mut prev_groups = self
            .detector
            .detect(&first.revision_id, &prev_data.blocks, &prev_data.pairs)?;

        self.first_revision(
            first,
            &prev_data,
            &prev_groups,
            &mut ledger,
            &mut lineage_prev,
            &mut trace,
        );

        for info in &revisions[1..] {
            cancel.checkpoint("revision pair")?;

            let data = self.load(source, info)?;
            let groups = self
                .detector
                .detect(&info.revision_id, &data.blocks, &data.pairs)?;

            let methods = self
                .matcher
                .match_blocks(&prev_data.blocks, &data.blocks, cancel)?;
            let lineage_cur = self.process_pair(
                &prev_groups,
                info,
                &data,
                &groups,
                &methods,
                &mut ledger,
                &lineage_prev,
                &mut trace,
            )?;

            lineage_prev = lineage_cur;
            prev_data = data;
            prev_groups = groups;
        }

        info!(
            revisions = revisions.len(),
            rows = trace.rows.len(),
            membership = trace.membership.len(),
            "group tracking complete"
        );
        Ok(trace)
    }

    fn load(&self, source: &dyn RevisionSource, info: &RevisionInfo) -> Result<RevisionData> {
        let data = source.load(info)?;
        data.validate(&info.revision_id)?;
        Ok(data)
    }

    /// Every group of the first revision is born.
    fn first_revision(
        &self,
        info: &RevisionInfo,
        data: &RevisionData,
        groups: &BTreeMap<String, CloneGroup>,
        ledger: &mut LifetimeLedger,
        lineage: &mut AHashMap<String, String>,
        trace: &mut GroupTrace,
    ) {
        let function_names = function_name_index(data);

        for (group_id, group) in groups {
            let (revisions, days) = ledger.begin(group_id, info.timestamp);
            trace.rows.push(group_row(
                info,
                group,
                GroupState::Born,
                None,
                None,
                0,
                0,
                revisions,
                days,
            ));
            lineage.insert(group_id.clone(), group_id.clone());
            push_membership(&mut trace.membership, info, group, &function_names);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn process_pair(
        &self,
        prev_groups: &BTreeMap<String, CloneGroup>,
        info: &RevisionInfo,
        data: &RevisionData,
        groups: &BTreeMap<String, CloneGroup>,
        methods: &MatchOutcome,
        ledger: &mut LifetimeLedger,
        lineage_prev: &AHashMap<String, String>,
        trace: &mut GroupTrace,
    ) -> Result<AHashMap<String, String>> {
        let matches = self.group_matcher.match_groups(prev_groups, groups, methods);
        let backward_methods = methods.backward();
        let function_names = function_name_index(data);

        // Accepted source groups per target, in source-id order
        let mut accepted: AHashMap<&str, Vec<&GroupMatch>> = AHashMap::new();
        for group_match in matches.values() {
            if let Some(target) = &group_match.target_group_id {
                accepted.entry(target.as_str()).or_default().push(group_match);
            }
        }

        let mut lineage_cur: AHashMap<String, String> = AHashMap::new();
        let mut rows: Vec<GroupTraceRow> = Vec::new();

        for (group_id, group) in groups {
            let dominant = accepted.get(group_id.as_str()).map(|sources| {
                dominant_source(sources)
            });

            let row = match dominant {
                Some(group_match) => {
                    let old_group =
                        prev_groups
                            .get(&group_match.source_group_id)
                            .ok_or_else(|| {
                                CloneTraceError::internal_with(
                                    "group match references an unknown source group",
                                    group_match.source_group_id.clone(),
                                )
                            })?;

                    let state = self.classifier.classify_group(group_match);
                    let (member_added, member_removed) =
                        member_changes(old_group, group, methods, &backward_methods);

                    let lineage_id = lineage_prev
                        .get(&group_match.source_group_id)
                        .cloned()
                        .unwrap_or_else(|| group_match.source_group_id.clone());
                    let (revisions, days) = ledger.observe(&lineage_id, info.timestamp);
                    if revisions > 1 && days == 0 {
                        warn!(
                            revision = %info.revision_id,
                            group_id = %group_id,
                            "zero-day lifetime on a non-first observation"
                        );
                    }

                    lineage_cur.insert(group_id.clone(), lineage_id);
                    group_row(
                        info,
                        group,
                        state,
                        Some(group_match.source_group_id.clone()),
                        Some(group_match.overlap_ratio),
                        member_added,
                        member_removed,
                        revisions,
                        days,
                    )
                }
                None => {
                    let (revisions, days) = ledger.begin(group_id, info.timestamp);
                    lineage_cur.insert(group_id.clone(), group_id.clone());
                    group_row(info, group, GroupState::Born, None, None, 0, 0, revisions, days)
                }
            };
            rows.push(row);
            push_membership(&mut trace.membership, info, group, &function_names);
        }

        // Terminal rows for old groups without an accepted target
        for (old_group_id, group_match) in &matches {
            if group_match.target_group_id.is_some() {
                continue;
            }
            let old_group = prev_groups.get(old_group_id).ok_or_else(|| {
                CloneTraceError::internal_with(
                    "group match references an unknown source group",
                    old_group_id.clone(),
                )
            })?;

            let lineage_id = lineage_prev
                .get(old_group_id)
                .cloned()
                .unwrap_or_else(|| old_group_id.clone());
            let (revisions, days) = ledger.observe(&lineage_id, info.timestamp);

            rows.push(group_row(
                info,
                old_group,
                GroupState::Dissolved,
                None,
                Some(group_match.overlap_ratio),
                0,
                old_group.size(),
                revisions,
                days,
            ));
        }

        rows.sort_by(|a, b| a.group_id.cmp(&b.group_id));
        trace.rows.extend(rows);

        Ok(lineage_cur)
    }
}

/// The accepted source with the largest overlap; ties go to the smallest
/// source group id.
fn dominant_source<'m>(sources: &[&'m GroupMatch]) -> &'m GroupMatch {
    let mut best = sources[0];
    for candidate in &sources[1..] {
        let larger = candidate.overlap_count > best.overlap_count;
        let tie_smaller_id = candidate.overlap_count == best.overlap_count
            && candidate.source_group_id < best.source_group_id;
        if larger || tie_smaller_id {
            best = candidate;
        }
    }
    best
}

/// Member churn between a matched group pair, counted through the method
/// matches: added = new members whose predecessor is not in the old group;
/// removed = old members whose successor is not in the new group.
fn member_changes(
    old_group: &CloneGroup,
    new_group: &CloneGroup,
    methods: &MatchOutcome,
    backward: &BTreeMap<String, String>,
) -> (usize, usize) {
    let member_added = new_group
        .members
        .iter()
        .filter(|member| {
            backward
                .get(*member)
                .map_or(true, |predecessor| !old_group.contains(predecessor))
        })
        .count();

    let member_removed = old_group
        .members
        .iter()
        .filter(|member| {
            methods
                .target_of(member)
                .map_or(true, |successor| !new_group.contains(successor))
        })
        .count();

    (member_added, member_removed)
}

fn function_name_index(data: &RevisionData) -> AHashMap<&str, &str> {
    data.blocks
        .iter()
        .map(|block| (block.block_id.as_str(), block.function_name.as_str()))
        .collect()
}

fn push_membership(
    membership: &mut Vec<MembershipRow>,
    info: &RevisionInfo,
    group: &CloneGroup,
    function_names: &AHashMap<&str, &str>,
) {
    for member in &group.members {
        membership.push(MembershipRow {
            revision_id: info.revision_id.clone(),
            group_id: group.group_id.clone(),
            block_id: member.clone(),
            function_name: function_names
                .get(member.as_str())
                .map(|name| (*name).to_string())
                .unwrap_or_default(),
            is_clone: group.is_clone(),
        });
    }
}

#[allow(clippy::too_many_arguments)]
fn group_row(
    info: &RevisionInfo,
    group: &CloneGroup,
    state: GroupState,
    matched_group_id: Option<String>,
    overlap_ratio: Option<f64>,
    member_added: usize,
    member_removed: usize,
    lifetime_revisions: u32,
    lifetime_days: i64,
) -> GroupTraceRow {
    GroupTraceRow {
        revision_id: info.revision_id.clone(),
        group_id: group.group_id.clone(),
        member_count: group.size(),
        avg_similarity: group.avg_similarity(),
        min_similarity: group.min_similarity(),
        max_similarity: group.max_similarity(),
        density: group.density(),
        state,
        matched_group_id,
        overlap_ratio,
        member_added,
        member_removed,
        lifetime_revisions,
        lifetime_days,
    }
}
