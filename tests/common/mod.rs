//! Shared fixtures for the tracking integration tests.
#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use clonetrace::{ClonePair, CodeBlock, MemoryRevisionSource, RevisionData, RevisionInfo};

/// Noon on the given day, so whole-day lifetimes are unambiguous.
pub fn ts(year: i32, month: u32, day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

/// A block whose token hash is a deterministic function of its tokens, so
/// equal token sequences match exactly across revisions.
pub fn block(id: &str, tokens: &[i64]) -> CodeBlock {
    named_block(id, &format!("fn_{id}"), "src/lib.rs", tokens)
}

/// A block with an explicit function name and file path.
pub fn named_block(id: &str, name: &str, file: &str, tokens: &[i64]) -> CodeBlock {
    CodeBlock::new(id, file, 1, 10, name).with_tokens(format!("{tokens:?}"), tokens.to_vec())
}

/// A clone pair with an n-gram score and optional LCS score.
pub fn pair(a: &str, b: &str, ngram: u32, lcs: Option<u32>) -> ClonePair {
    ClonePair {
        block_id_1: a.to_string(),
        block_id_2: b.to_string(),
        ngram_similarity: ngram,
        lcs_similarity: lcs,
    }
}

/// Add a revision to the source.
pub fn push_revision(
    source: &mut MemoryRevisionSource,
    id: &str,
    timestamp: NaiveDateTime,
    blocks: Vec<CodeBlock>,
    pairs: Vec<ClonePair>,
) {
    source.push(
        RevisionInfo::new(id, timestamp),
        RevisionData::new(blocks, pairs),
    );
}
