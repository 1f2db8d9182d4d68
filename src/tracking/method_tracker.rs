//! Method-evolution tracking across the revision sequence.
//!
//! The tracker drives consecutive revision pairs through group detection,
//! matching, and classification, while owning the lineage and lifetime
//! bookkeeping that spans the whole run. Revision pairs are processed
//! sequentially; parallelism lives inside the matcher.

use std::collections::BTreeMap;

use ahash::AHashMap;
use tracing::{debug, info, warn};

use crate::core::cancel::CancelToken;
use crate::core::config::TrackingConfig;
use crate::core::errors::{CloneTraceError, Result};
use crate::core::model::{CodeBlock, RevisionData, RevisionInfo};
use crate::detectors::groups::{group_index, CloneGroup, GroupDetector};
use crate::io::source::RevisionSource;
use crate::io::trace::{MethodTrace, MethodTraceRow};
use crate::matching::method_matcher::{MatchType, MethodMatcher};
use crate::matching::states::{MethodState, StateClassifier};
use crate::tracking::lifetime::LifetimeLedger;

/// Tracks method evolution across revisions.
#[derive(Debug)]
pub struct MethodTracker {
    config: TrackingConfig,
    matcher: MethodMatcher,
    detector: GroupDetector,
    classifier: StateClassifier,
}

impl MethodTracker {
    /// Create a tracker, rejecting invalid configuration up front.
    pub fn new(config: TrackingConfig) -> Result<Self> {
        config.validate()?;
        let matcher = MethodMatcher::new(config.matcher.clone())?;
        let detector = GroupDetector::new(config.matcher.similarity_threshold);
        let classifier = StateClassifier::new(config.group_size_tolerance);
        Ok(Self {
            config,
            matcher,
            detector,
            classifier,
        })
    }

    /// The active configuration.
    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    /// Track all revisions supplied by `source`.
    pub fn track(&self, source: &dyn RevisionSource) -> Result<MethodTrace> {
        self.track_with(source, &CancelToken::new())
    }

    /// Track with cooperative cancellation, checked at revision-pair
    /// boundaries.
    pub fn track_with(
        &self,
        source: &dyn RevisionSource,
        cancel: &CancelToken,
    ) -> Result<MethodTrace> {
        let revisions = self.enumerate(source)?;
        let mut trace = MethodTrace::default();

        let Some(first) = revisions.first() else {
            return Ok(trace);
        };

        let mut ledger = LifetimeLedger::new();
        // block id in the previous revision → stable lineage id
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
        )?;

        let mut prev_info = first.clone();
        for info in &revisions[1..] {
            cancel.checkpoint("revision pair")?;

            let data = self.load(source, info)?;
            let groups = self
                .detector
                .detect(&info.revision_id, &data.blocks, &data.pairs)?;

            let lineage_cur = self.process_pair(
                &prev_info,
                &prev_data,
                &prev_groups,
                info,
                &data,
                &groups,
                &mut ledger,
                &lineage_prev,
                cancel,
                &mut trace,
            )?;

            lineage_prev = lineage_cur;
            prev_info = info.clone();
            prev_data = data;
            prev_groups = groups;
        }

        info!(
            revisions = revisions.len(),
            rows = trace.rows.len(),
            lineages = ledger.len(),
            "method tracking complete"
        );
        Ok(trace)
    }

    fn enumerate(&self, source: &dyn RevisionSource) -> Result<Vec<RevisionInfo>> {
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

        Ok(revisions)
    }

    fn load(&self, source: &dyn RevisionSource, info: &RevisionInfo) -> Result<RevisionData> {
        let data = source.load(info)?;
        data.validate(&info.revision_id)?;
        Ok(data)
    }

    /// Every block of the first revision is added; group members with
    /// peers land in a freshly formed group.
    fn first_revision(
        &self,
        info: &RevisionInfo,
        data: &RevisionData,
        groups: &BTreeMap<String, CloneGroup>,
        ledger: &mut LifetimeLedger,
        lineage: &mut AHashMap<String, String>,
        trace: &mut MethodTrace,
    ) -> Result<()> {
        let group_of = group_index(groups);

        let mut blocks: Vec<&CodeBlock> = data.blocks.iter().collect();
        blocks.sort_by(|a, b| a.block_id.cmp(&b.block_id));

        for block in blocks {
            let group = lookup_group(groups, &group_of, &block.block_id, &info.revision_id)?;
            let detail = self.classifier.classify_added(group.size(), false);
            let (revisions, days) = ledger.begin(&block.block_id, info.timestamp);

            trace.rows.push(method_row(
                info,
                block,
                MethodState::Added,
                detail,
                None,
                MatchType::None,
                None,
                group,
                revisions,
                days,
                block.block_id.clone(),
            ));
            lineage.insert(block.block_id.clone(), block.block_id.clone());
        }

        debug!(
            revision = %info.revision_id,
            blocks = data.blocks.len(),
            groups = groups.len(),
            "first revision processed"
        );
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn process_pair(
        &self,
        prev_info: &RevisionInfo,
        prev_data: &RevisionData,
        prev_groups: &BTreeMap<String, CloneGroup>,
        info: &RevisionInfo,
        data: &RevisionData,
        groups: &BTreeMap<String, CloneGroup>,
        ledger: &mut LifetimeLedger,
        lineage_prev: &AHashMap<String, String>,
        cancel: &CancelToken,
        trace: &mut MethodTrace,
    ) -> Result<AHashMap<String, String>> {
        let outcome = self
            .matcher
            .match_blocks(&prev_data.blocks, &data.blocks, cancel)?;

        if !prev_data.blocks.is_empty() {
            let rate = outcome.matched_count() as f64 / prev_data.blocks.len() as f64;
            if rate < self.config.match_rate_floor {
                warn!(
                    revision = %info.revision_id,
                    rate,
                    floor = self.config.match_rate_floor,
                    "matching rate below floor"
                );
            }
        }

        let backward = outcome.backward();
        let old_group_of = group_index(prev_groups);
        let new_group_of = group_index(groups);

        let mut lineage_cur: AHashMap<String, String> = AHashMap::new();
        let mut rows: Vec<MethodTraceRow> = Vec::new();

        let mut new_blocks: Vec<&CodeBlock> = data.blocks.iter().collect();
        new_blocks.sort_by(|a, b| a.block_id.cmp(&b.block_id));

        for block in new_blocks {
            let new_group = lookup_group(groups, &new_group_of, &block.block_id, &info.revision_id)?;

            let row = match backward.get(&block.block_id) {
                Some(old_id) => {
                    let matched = outcome.get(old_id).ok_or_else(|| {
                        CloneTraceError::internal_with(
                            "backward map references an unknown source",
                            old_id.clone(),
                        )
                    })?;
                    let old_group =
                        lookup_group(prev_groups, &old_group_of, old_id, &prev_info.revision_id)?;

                    let detail = self.classifier.classify_survived(
                        matched.match_type() == MatchType::Exact,
                        old_group.is_clone(),
                        new_group.is_clone(),
                    );

                    let lineage_id = lineage_prev
                        .get(old_id)
                        .cloned()
                        .unwrap_or_else(|| old_id.clone());
                    let (revisions, days) = ledger.observe(&lineage_id, info.timestamp);
                    self.warn_on_date_anomaly(info, &block.block_id, revisions, days);

                    lineage_cur.insert(block.block_id.clone(), lineage_id.clone());
                    method_row(
                        info,
                        block,
                        MethodState::Survived,
                        detail,
                        Some(old_id.clone()),
                        matched.match_type(),
                        matched.similarity(),
                        new_group,
                        revisions,
                        days,
                        lineage_id,
                    )
                }
                None => {
                    let has_surviving_peer = new_group
                        .members
                        .iter()
                        .any(|member| member != &block.block_id && backward.contains_key(member));
                    let detail = self
                        .classifier
                        .classify_added(new_group.size(), has_surviving_peer);
                    let (revisions, days) = ledger.begin(&block.block_id, info.timestamp);

                    lineage_cur.insert(block.block_id.clone(), block.block_id.clone());
                    method_row(
                        info,
                        block,
                        MethodState::Added,
                        detail,
                        None,
                        MatchType::None,
                        None,
                        new_group,
                        revisions,
                        days,
                        block.block_id.clone(),
                    )
                }
            };
            rows.push(row);
        }

        // Terminal rows for blocks of the old revision left unclaimed
        let mut old_blocks: Vec<&CodeBlock> = prev_data.blocks.iter().collect();
        old_blocks.sort_by(|a, b| a.block_id.cmp(&b.block_id));

        for block in old_blocks {
            if outcome.target_of(&block.block_id).is_some() {
                continue;
            }

            let old_group =
                lookup_group(prev_groups, &old_group_of, &block.block_id, &prev_info.revision_id)?;
            let survivors = old_group
                .members
                .iter()
                .filter(|member| outcome.target_of(member).is_some())
                .count();
            let detail = self.classifier.classify_deleted(old_group.size(), survivors);

            let lineage_id = lineage_prev
                .get(&block.block_id)
                .cloned()
                .unwrap_or_else(|| block.block_id.clone());
            let (revisions, days) = ledger.observe(&lineage_id, info.timestamp);

            rows.push(method_row(
                info,
                block,
                MethodState::Deleted,
                detail,
                None,
                MatchType::None,
                None,
                old_group,
                revisions,
                days,
                lineage_id,
            ));
        }

        rows.sort_by(|a, b| a.block_id.cmp(&b.block_id));
        trace.rows.extend(rows);

        Ok(lineage_cur)
    }

    fn warn_on_date_anomaly(&self, info: &RevisionInfo, block_id: &str, revisions: u32, days: i64) {
        if revisions > 1 && days == 0 {
            warn!(
                revision = %info.revision_id,
                block_id,
                revisions,
                "zero-day lifetime on a non-first observation"
            );
        }
    }
}

fn lookup_group<'g>(
    groups: &'g BTreeMap<String, CloneGroup>,
    index: &AHashMap<String, String>,
    block_id: &str,
    revision_id: &str,
) -> Result<&'g CloneGroup> {
    index
        .get(block_id)
        .and_then(|group_id| groups.get(group_id))
        .ok_or_else(|| {
            CloneTraceError::internal_with(
                "block missing from group index",
                format!("{revision_id}/{block_id}"),
            )
        })
}

#[allow(clippy::too_many_arguments)]
fn method_row(
    info: &RevisionInfo,
    block: &CodeBlock,
    state: MethodState,
    detail: crate::matching::states::MethodStateDetail,
    matched_block_id: Option<String>,
    match_type: MatchType,
    match_similarity: Option<u32>,
    group: &CloneGroup,
    lifetime_revisions: u32,
    lifetime_days: i64,
    lineage_id: String,
) -> MethodTraceRow {
    let (clone_count, clone_group_id) = if group.is_clone() {
        (group.size() - 1, Some(group.group_id.clone()))
    } else {
        (0, None)
    };

    MethodTraceRow {
        revision_id: info.revision_id.clone(),
        block_id: block.block_id.clone(),
        function_name: block.function_name.clone(),
        file_path: block.file_path.clone(),
        start_line: block.start_line,
        end_line: block.end_line,
        loc: block.loc(),
        state,
        state_detail: detail,
        matched_block_id,
        match_type,
        match_similarity,
        clone_count,
        clone_group_id,
        clone_group_size: group.size(),
        lifetime_revisions,
        lifetime_days,
        lineage_id,
    }
}
