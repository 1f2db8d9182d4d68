//! Cross-revision method matching.
//!
//! Matching is one-way (source revision → target revision) and injective on
//! its successful entries: no target block is claimed twice. Phase one
//! matches identical token hashes; phase two scores the remaining blocks
//! with the combined n-gram/LCS similarity, optionally restricted to
//! MinHash-LSH candidates, filtered by cheap length and Jaccard bounds, and
//! claimed in deterministic order.

use std::collections::BTreeMap;

use ahash::{AHashMap, AHashSet};
use serde::Serialize;
use tracing::{debug, info};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::core::cancel::CancelToken;
use crate::core::config::{MatcherConfig, ParallelMode};
use crate::core::errors::Result;
use crate::core::model::CodeBlock;
use crate::detectors::lsh::LshIndex;
use crate::detectors::similarity::{
    banded_lcs_similarity, lcs_similarity, ngram_similarity_from_sets, BandedLcs,
};
use crate::matching::filters::{length_skip, BlockFeatures, SimilarityCache};

/// Outcome of matching one source block against the target revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum MethodMatch {
    /// Token hashes are identical
    Exact {
        /// Claimed target block id
        target: String,
    },
    /// Similarity meets the matching threshold
    Fuzzy {
        /// Claimed target block id
        target: String,
        /// Combined similarity score (threshold–100)
        similarity: u32,
    },
    /// No target claimed
    None,
}

impl MethodMatch {
    /// The claimed target block id, when any.
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Exact { target } | Self::Fuzzy { target, .. } => Some(target),
            Self::None => None,
        }
    }

    /// The match similarity: 100 for exact matches, the score for fuzzy
    /// ones.
    pub fn similarity(&self) -> Option<u32> {
        match self {
            Self::Exact { .. } => Some(100),
            Self::Fuzzy { similarity, .. } => Some(*similarity),
            Self::None => None,
        }
    }

    /// The coarse match type of this outcome.
    pub fn match_type(&self) -> MatchType {
        match self {
            Self::Exact { .. } => MatchType::Exact,
            Self::Fuzzy { .. } => MatchType::Fuzzy,
            Self::None => MatchType::None,
        }
    }
}

/// Coarse match classification carried into the trace rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Matched by identical token hash
    Exact,
    /// Matched by similarity
    Fuzzy,
    /// Not matched
    None,
}

impl MatchType {
    /// Stable textual form used in trace output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Fuzzy => "fuzzy",
            Self::None => "none",
        }
    }
}

impl std::fmt::Display for MatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The complete source → target match mapping for one revision pair.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MatchOutcome {
    matches: BTreeMap<String, MethodMatch>,
}

impl MatchOutcome {
    /// The match recorded for a source block.
    pub fn get(&self, source: &str) -> Option<&MethodMatch> {
        self.matches.get(source)
    }

    /// The claimed target of a source block, when any.
    pub fn target_of(&self, source: &str) -> Option<&str> {
        self.matches.get(source).and_then(MethodMatch::target)
    }

    /// Iterate all (source block id, match) entries in block-id order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &MethodMatch)> {
        self.matches.iter()
    }

    /// The inverse view: claimed target block id → source block id.
    /// Well-defined because successful matches are injective.
    pub fn backward(&self) -> BTreeMap<String, String> {
        self.matches
            .iter()
            .filter_map(|(source, m)| m.target().map(|t| (t.to_string(), source.clone())))
            .collect()
    }

    /// Number of sources recorded (matched or not).
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    /// Whether no sources were recorded.
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Number of sources with a successful match.
    pub fn matched_count(&self) -> usize {
        self.matches
            .values()
            .filter(|m| m.target().is_some())
            .count()
    }
}

/// One scored candidate pair awaiting the claim step.
#[derive(Debug, Clone, Copy)]
struct Scored<'a> {
    source: &'a str,
    target: &'a str,
    similarity: u32,
}

/// Matches code blocks across a revision pair.
#[derive(Debug, Clone)]
pub struct MethodMatcher {
    config: MatcherConfig,
}

impl MethodMatcher {
    /// Create a matcher, rejecting invalid configuration up front.
    pub fn new(config: MatcherConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The active configuration.
    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Match `source` blocks onto `target` blocks.
    pub fn match_blocks(
        &self,
        source: &[CodeBlock],
        target: &[CodeBlock],
        cancel: &CancelToken,
    ) -> Result<MatchOutcome> {
        let mut source_order: Vec<&CodeBlock> = source.iter().collect();
        source_order.sort_by(|a, b| a.block_id.cmp(&b.block_id));
        let mut target_order: Vec<&CodeBlock> = target.iter().collect();
        target_order.sort_by(|a, b| a.block_id.cmp(&b.block_id));

        let mut matches: BTreeMap<String, MethodMatch> = BTreeMap::new();
        let mut claimed: AHashSet<&str> = AHashSet::new();

        self.exact_phase(&source_order, &target_order, &mut matches, &mut claimed);
        let exact_count = matches.len();

        self.fuzzy_phase(
            &source_order,
            &target_order,
            &mut matches,
            &mut claimed,
            cancel,
        )?;

        for block in &source_order {
            matches
                .entry(block.block_id.clone())
                .or_insert(MethodMatch::None);
        }

        let outcome = MatchOutcome { matches };
        info!(
            sources = source.len(),
            targets = target.len(),
            exact = exact_count,
            fuzzy = outcome.matched_count() - exact_count,
            "method matching complete"
        );
        Ok(outcome)
    }

    /// Match in both directions: the forward outcome plus its inverse view
    /// (target block id → source block id).
    pub fn bidirectional_match(
        &self,
        old: &[CodeBlock],
        new: &[CodeBlock],
        cancel: &CancelToken,
    ) -> Result<(MatchOutcome, BTreeMap<String, String>)> {
        let forward = self.match_blocks(old, new, cancel)?;
        let backward = forward.backward();
        Ok((forward, backward))
    }

    /// Phase one: claim targets with identical token hashes. Hash conflicts
    /// on the target side keep the first (smallest block id) target; a
    /// target already claimed is never reused.
    fn exact_phase<'a>(
        &self,
        source_order: &[&'a CodeBlock],
        target_order: &[&'a CodeBlock],
        matches: &mut BTreeMap<String, MethodMatch>,
        claimed: &mut AHashSet<&'a str>,
    ) {
        let mut by_hash: AHashMap<&str, &'a CodeBlock> =
            AHashMap::with_capacity(target_order.len());
        for &block in target_order {
            by_hash.entry(block.token_hash.as_str()).or_insert(block);
        }

        for block in source_order {
            if let Some(&candidate) = by_hash.get(block.token_hash.as_str()) {
                if claimed.insert(candidate.block_id.as_str()) {
                    matches.insert(
                        block.block_id.clone(),
                        MethodMatch::Exact {
                            target: candidate.block_id.clone(),
                        },
                    );
                }
            }
        }
    }

    /// Phase two: score unclaimed pairs and claim deterministically, one
    /// pass per threshold.
    fn fuzzy_phase<'a>(
        &self,
        source_order: &[&'a CodeBlock],
        target_order: &[&'a CodeBlock],
        matches: &mut BTreeMap<String, MethodMatch>,
        claimed: &mut AHashSet<&'a str>,
        cancel: &CancelToken,
    ) -> Result<()> {
        let cache = SimilarityCache::new();

        // Feature maps are per side: block ids are only unique within one
        // revision
        let source_features: AHashMap<&'a str, BlockFeatures> = source_order
            .iter()
            .filter(|b| !matches.contains_key(&b.block_id))
            .map(|&b| (b.block_id.as_str(), BlockFeatures::from_tokens(&b.tokens)))
            .collect();
        let target_features: AHashMap<&'a str, BlockFeatures> = target_order
            .iter()
            .filter(|b| !claimed.contains(b.block_id.as_str()))
            .map(|&b| (b.block_id.as_str(), BlockFeatures::from_tokens(&b.tokens)))
            .collect();

        for threshold in self.config.pass_thresholds() {
            cancel.checkpoint("fuzzy matching pass")?;

            let sources: Vec<&'a CodeBlock> = source_order
                .iter()
                .copied()
                .filter(|b| !matches.contains_key(&b.block_id))
                .collect();
            let targets: Vec<&'a CodeBlock> = target_order
                .iter()
                .copied()
                .filter(|b| !claimed.contains(b.block_id.as_str()))
                .collect();

            if sources.is_empty() || targets.is_empty() {
                break;
            }

            let mut scored = self.score_pass(
                &sources,
                &targets,
                &source_features,
                &target_features,
                &cache,
                threshold,
            );
            debug!(
                threshold,
                sources = sources.len(),
                targets = targets.len(),
                scored = scored.len(),
                cached = cache.len(),
                "fuzzy pass scored"
            );

            // Serialised claim step: highest similarity first, then smallest
            // target id, then smallest source id
            scored.sort_by(|a, b| {
                b.similarity
                    .cmp(&a.similarity)
                    .then_with(|| a.target.cmp(b.target))
                    .then_with(|| a.source.cmp(b.source))
            });

            for pair in scored {
                if matches.contains_key(pair.source) || claimed.contains(pair.target) {
                    continue;
                }
                claimed.insert(pair.target);
                matches.insert(
                    pair.source.to_string(),
                    MethodMatch::Fuzzy {
                        target: pair.target.to_string(),
                        similarity: pair.similarity,
                    },
                );
            }
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn score_pass<'a>(
        &self,
        sources: &[&'a CodeBlock],
        targets: &[&'a CodeBlock],
        source_features: &AHashMap<&'a str, BlockFeatures>,
        target_features: &AHashMap<&'a str, BlockFeatures>,
        cache: &SimilarityCache,
        threshold: u32,
    ) -> Vec<Scored<'a>> {
        let lsh = self.config.use_lsh.then(|| {
            let mut index = LshIndex::new(&self.config.lsh);
            for block in targets {
                index.insert(block.block_id.clone(), &block.tokens);
            }
            index
        });

        let context = PassContext {
            config: &self.config,
            lsh,
            source_features,
            target_features,
            cache,
            targets,
            target_by_id: targets
                .iter()
                .map(|b| (b.block_id.as_str(), *b))
                .collect(),
            threshold,
        };

        let pair_count = sources.len() * targets.len();
        if self.use_parallel(pair_count) {
            #[cfg(feature = "parallel")]
            return self.score_parallel(sources, &context);
        }

        sources
            .iter()
            .flat_map(|&block| context.score_source(block))
            .collect()
    }

    #[cfg(feature = "parallel")]
    fn score_parallel<'a>(
        &self,
        sources: &[&'a CodeBlock],
        context: &PassContext<'a, '_>,
    ) -> Vec<Scored<'a>> {
        let run = || {
            sources
                .par_iter()
                .flat_map_iter(|&block| context.score_source(block))
                .collect()
        };

        if let Some(workers) = self.config.max_workers {
            if let Ok(pool) = rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
                return pool.install(|| run());
            }
        }
        run()
    }

    fn use_parallel(&self, pair_count: usize) -> bool {
        if !cfg!(feature = "parallel") {
            return false;
        }
        match self.config.parallel {
            ParallelMode::On => true,
            ParallelMode::Off => false,
            ParallelMode::Auto => pair_count >= self.config.parallel_min_pairs,
        }
    }
}

/// Shared read-only state for one scoring pass.
struct PassContext<'a, 'b> {
    config: &'b MatcherConfig,
    lsh: Option<LshIndex>,
    source_features: &'b AHashMap<&'a str, BlockFeatures>,
    target_features: &'b AHashMap<&'a str, BlockFeatures>,
    cache: &'b SimilarityCache,
    targets: &'b [&'a CodeBlock],
    target_by_id: AHashMap<&'a str, &'a CodeBlock>,
    threshold: u32,
}

impl<'a> PassContext<'a, '_> {
    fn score_source(&self, source: &'a CodeBlock) -> Vec<Scored<'a>> {
        let source_features = &self.source_features[source.block_id.as_str()];

        let candidates: Vec<&'a CodeBlock> = match &self.lsh {
            Some(index) => index
                .query(&source.tokens)
                .into_iter()
                .filter_map(|id| self.target_by_id.get(id.as_str()).copied())
                .collect(),
            None => self.targets.to_vec(),
        };

        // Cheap filters before the quadratic kernel
        let mut kept: Vec<(&'a CodeBlock, u32)> = Vec::new();
        for target in candidates {
            let target_features = &self.target_features[target.block_id.as_str()];
            if length_skip(
                source_features.len,
                target_features.len,
                self.config.length_skip_ratio,
            ) {
                continue;
            }
            if source_features.jaccard(target_features) < self.config.jaccard_prefilter {
                continue;
            }
            let quick_ngram =
                ngram_similarity_from_sets(&source_features.bigrams, &target_features.bigrams);
            kept.push((target, quick_ngram));
        }

        if self.lsh.is_some() && kept.len() > self.config.top_k {
            kept.sort_by(|a, b| {
                b.1.cmp(&a.1)
                    .then_with(|| a.0.block_id.cmp(&b.0.block_id))
            });
            kept.truncate(self.config.top_k);
        }

        let mut scored = Vec::new();
        for (target, quick_ngram) in kept {
            if let Some(similarity) = self.combined(source, target, quick_ngram) {
                if similarity >= self.threshold {
                    scored.push(Scored {
                        source: source.block_id.as_str(),
                        target: target.block_id.as_str(),
                        similarity,
                    });
                }
            }
        }
        scored
    }

    /// Combined similarity with memoised LCS: the n-gram score when it
    /// meets the pass threshold, otherwise the (banded) LCS score.
    fn combined(&self, source: &'a CodeBlock, target: &'a CodeBlock, ngram: u32) -> Option<u32> {
        if ngram >= self.threshold {
            return Some(ngram);
        }

        if let Some(lcs) = self.cache.get(&source.block_id, &target.block_id) {
            return Some(lcs);
        }

        if self.config.banded_lcs {
            match banded_lcs_similarity(&source.tokens, &target.tokens, self.threshold, None) {
                BandedLcs::Score(score) => {
                    self.cache.insert(&source.block_id, &target.block_id, score);
                    Some(score)
                }
                BandedLcs::BelowThreshold => None,
            }
        } else {
            let score = lcs_similarity(&source.tokens, &target.tokens);
            self.cache.insert(&source.block_id, &target.block_id, score);
            Some(score)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(id: &str, hash: &str, tokens: Vec<i64>) -> CodeBlock {
        CodeBlock::new(id, "src/a.rs", 1, 10, format!("fn_{id}")).with_tokens(hash, tokens)
    }

    fn matcher(config: MatcherConfig) -> MethodMatcher {
        MethodMatcher::new(config).unwrap()
    }

    fn default_matcher() -> MethodMatcher {
        matcher(MatcherConfig::default())
    }

    #[test]
    fn test_exact_match_by_token_hash() {
        let old = vec![block("a1", "h1", vec![1, 2, 3])];
        let new = vec![block("b1", "h1", vec![1, 2, 3])];

        let outcome = default_matcher()
            .match_blocks(&old, &new, &CancelToken::new())
            .unwrap();

        assert_eq!(
            outcome.get("a1"),
            Some(&MethodMatch::Exact {
                target: "b1".to_string()
            })
        );
        assert_eq!(outcome.get("a1").unwrap().similarity(), Some(100));
    }

    #[test]
    fn test_exact_never_reuses_a_claimed_target() {
        // Two sources with the same hash, one target: the smaller source id
        // claims it exactly; the other falls through to fuzzy and scores 100.
        let old = vec![
            block("a2", "h1", vec![1, 2, 3, 4]),
            block("a1", "h1", vec![1, 2, 3, 4]),
        ];
        let new = vec![block("b1", "h1", vec![1, 2, 3, 4])];

        let outcome = default_matcher()
            .match_blocks(&old, &new, &CancelToken::new())
            .unwrap();

        assert_eq!(
            outcome.get("a1"),
            Some(&MethodMatch::Exact {
                target: "b1".to_string()
            })
        );
        assert_eq!(outcome.get("a2"), Some(&MethodMatch::None));
    }

    #[test]
    fn test_fuzzy_match_of_modified_block() {
        let old = vec![block("a1", "h1", vec![1, 2, 3, 4, 5])];
        let new = vec![block("b1", "h2", vec![1, 2, 3, 4, 9])];

        let outcome = default_matcher()
            .match_blocks(&old, &new, &CancelToken::new())
            .unwrap();

        match outcome.get("a1") {
            Some(MethodMatch::Fuzzy { target, similarity }) => {
                assert_eq!(target, "b1");
                assert!(*similarity >= 70);
            }
            other => panic!("expected fuzzy match, got {other:?}"),
        }
    }

    #[test]
    fn test_fuzzy_claims_are_injective() {
        // Both sources resemble the single target; only one may claim it.
        let old = vec![
            block("a1", "h1", vec![1, 2, 3, 4, 5, 6]),
            block("a2", "h2", vec![1, 2, 3, 4, 5, 7]),
        ];
        let new = vec![block("b1", "h3", vec![1, 2, 3, 4, 5, 8])];

        let outcome = default_matcher()
            .match_blocks(&old, &new, &CancelToken::new())
            .unwrap();

        let matched: Vec<&str> = ["a1", "a2"]
            .iter()
            .filter_map(|s| outcome.target_of(s))
            .collect();
        assert_eq!(matched, vec!["b1"]);
    }

    #[test]
    fn test_tie_breaks_prefer_smallest_target_id() {
        // Identical token sequences but distinct hashes force the fuzzy
        // path; both targets score equally.
        let old = vec![block("a1", "h1", vec![1, 2, 3, 4])];
        let new = vec![
            block("b2", "h2", vec![1, 2, 3, 4]),
            block("b1", "h3", vec![1, 2, 3, 4]),
        ];

        let outcome = default_matcher()
            .match_blocks(&old, &new, &CancelToken::new())
            .unwrap();

        assert_eq!(outcome.target_of("a1"), Some("b1"));
    }

    #[test]
    fn test_progressive_thresholds_claim_high_quality_first() {
        // a1→b1 scores 100 and claims b1 in the 90-pass; a2→b1 scores 83
        // and finds nothing left in the later passes.
        let mut config = MatcherConfig::default();
        config.progressive_thresholds = Some(vec![90, 80, 70]);

        let old = vec![
            block("a1", "h1", vec![1, 2, 3, 4, 5, 6]),
            block("a2", "h2", vec![1, 2, 3, 4, 5, 9]),
        ];
        let new = vec![block("b1", "h3", vec![1, 2, 3, 4, 5, 6])];

        let outcome = matcher(config)
            .match_blocks(&old, &new, &CancelToken::new())
            .unwrap();

        assert_eq!(outcome.target_of("a1"), Some("b1"));
        assert_eq!(outcome.get("a2"), Some(&MethodMatch::None));
    }

    #[test]
    fn test_length_skip_filters_candidates() {
        let old = vec![block("a1", "h1", vec![1, 2, 3])];
        let new = vec![block("b1", "h2", (1..=30).collect())];

        let outcome = default_matcher()
            .match_blocks(&old, &new, &CancelToken::new())
            .unwrap();

        assert_eq!(outcome.get("a1"), Some(&MethodMatch::None));
    }

    #[test]
    fn test_lsh_mode_finds_the_same_match() {
        let tokens: Vec<i64> = (0..80).collect();
        let mut modified = tokens.clone();
        modified[40] = 999;

        let old = vec![block("a1", "h1", tokens)];
        let new = vec![block("b1", "h2", modified)];

        let mut config = MatcherConfig::default();
        config.use_lsh = true;

        let outcome = matcher(config)
            .match_blocks(&old, &new, &CancelToken::new())
            .unwrap();

        assert_eq!(outcome.target_of("a1"), Some("b1"));
    }

    #[test]
    fn test_parallel_modes_agree() {
        let blocks_old: Vec<CodeBlock> = (0..12)
            .map(|i| {
                let tokens: Vec<i64> = (0..40).map(|t| t + i).collect();
                block(&format!("a{i:02}"), &format!("ha{i}"), tokens)
            })
            .collect();
        let blocks_new: Vec<CodeBlock> = (0..12)
            .map(|i| {
                let mut tokens: Vec<i64> = (0..40).map(|t| t + i).collect();
                tokens[5] = 1000 + i;
                block(&format!("b{i:02}"), &format!("hb{i}"), tokens)
            })
            .collect();

        let mut on = MatcherConfig::default();
        on.parallel = ParallelMode::On;
        let mut off = MatcherConfig::default();
        off.parallel = ParallelMode::Off;

        let outcome_on = matcher(on)
            .match_blocks(&blocks_old, &blocks_new, &CancelToken::new())
            .unwrap();
        let outcome_off = matcher(off)
            .match_blocks(&blocks_old, &blocks_new, &CancelToken::new())
            .unwrap();

        assert_eq!(outcome_on, outcome_off);
    }

    #[test]
    fn test_empty_target_leaves_all_unmatched() {
        let old = vec![block("a1", "h1", vec![1, 2, 3])];

        let outcome = default_matcher()
            .match_blocks(&old, &[], &CancelToken::new())
            .unwrap();

        assert_eq!(outcome.get("a1"), Some(&MethodMatch::None));
        assert_eq!(outcome.matched_count(), 0);
    }

    #[test]
    fn test_backward_view_inverts_matches() {
        let old = vec![block("a1", "h1", vec![1, 2, 3])];
        let new = vec![block("b1", "h1", vec![1, 2, 3])];

        let (forward, backward) = default_matcher()
            .bidirectional_match(&old, &new, &CancelToken::new())
            .unwrap();

        assert_eq!(forward.target_of("a1"), Some("b1"));
        assert_eq!(backward.get("b1").map(String::as_str), Some("a1"));
    }

    #[test]
    fn test_cancellation_between_passes() {
        let cancel = CancelToken::new();
        cancel.cancel();

        let old = vec![block("a1", "h1", vec![1, 2, 3])];
        let new = vec![block("b1", "h2", vec![1, 2, 4])];

        let err = default_matcher()
            .match_blocks(&old, &new, &cancel)
            .unwrap_err();
        assert!(matches!(err, crate::CloneTraceError::Cancelled { .. }));
    }
}
