//! Input data model: code blocks, clone pairs, and revision records.
//!
//! Records are plain typed structs; the revision source parses the raw
//! textual forms on load and the engine treats every field as read-only
//! thereafter.

use ahash::AHashSet;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::core::errors::{CloneTraceError, Result};

/// One formal parameter of a method signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name
    pub name: String,
    /// Parameter type
    #[serde(rename = "type")]
    pub ty: String,
}

/// One method in one revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeBlock {
    /// Opaque identifier, unique within its revision
    pub block_id: String,
    /// Path of the containing file
    pub file_path: String,
    /// First line of the method (1-based)
    pub start_line: u32,
    /// Last line of the method, inclusive
    pub end_line: u32,
    /// Name of the method
    pub function_name: String,
    /// Declared return type
    pub return_type: String,
    /// Ordered parameter list
    pub parameters: Vec<Parameter>,
    /// Digest of the token sequence; equality implies token equality
    pub token_hash: String,
    /// Integer-encoded token sequence
    pub tokens: Vec<i64>,
}

impl CodeBlock {
    /// Create a block with location information; signature and tokens are
    /// attached with the `with_*` builders.
    pub fn new(
        block_id: impl Into<String>,
        file_path: impl Into<String>,
        start_line: u32,
        end_line: u32,
        function_name: impl Into<String>,
    ) -> Self {
        Self {
            block_id: block_id.into(),
            file_path: file_path.into(),
            start_line,
            end_line,
            function_name: function_name.into(),
            return_type: String::new(),
            parameters: Vec::new(),
            token_hash: String::new(),
            tokens: Vec::new(),
        }
    }

    /// Attach return type and parameter list.
    #[must_use]
    pub fn with_signature(mut self, return_type: impl Into<String>, parameters: Vec<Parameter>) -> Self {
        self.return_type = return_type.into();
        self.parameters = parameters;
        self
    }

    /// Attach the token hash and token sequence.
    #[must_use]
    pub fn with_tokens(mut self, token_hash: impl Into<String>, tokens: Vec<i64>) -> Self {
        self.token_hash = token_hash.into();
        self.tokens = tokens;
        self
    }

    /// Lines of code spanned by the block.
    pub fn loc(&self) -> u32 {
        self.end_line - self.start_line + 1
    }
}

/// A recorded intra-revision similarity between two blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClonePair {
    /// First endpoint
    pub block_id_1: String,
    /// Second endpoint
    pub block_id_2: String,
    /// N-gram similarity, 0–100
    pub ngram_similarity: u32,
    /// LCS similarity, absent when the producer skipped it
    pub lcs_similarity: Option<u32>,
}

impl ClonePair {
    /// The effective similarity of the pair: the n-gram score when it meets
    /// `ngram_floor`, otherwise the LCS score when present, otherwise the
    /// n-gram score.
    pub fn effective_similarity(&self, ngram_floor: u32) -> u32 {
        if self.ngram_similarity >= ngram_floor {
            self.ngram_similarity
        } else {
            self.lcs_similarity.unwrap_or(self.ngram_similarity)
        }
    }
}

/// Identity of one revision in the ordered stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionInfo {
    /// Canonically sortable revision identifier
    pub revision_id: String,
    /// Absolute timestamp of the revision
    pub timestamp: NaiveDateTime,
}

impl RevisionInfo {
    /// Create a revision identity.
    pub fn new(revision_id: impl Into<String>, timestamp: NaiveDateTime) -> Self {
        Self {
            revision_id: revision_id.into(),
            timestamp,
        }
    }
}

/// The loaded contents of one revision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RevisionData {
    /// All code blocks of the revision
    pub blocks: Vec<CodeBlock>,
    /// All recorded clone pairs of the revision
    pub pairs: Vec<ClonePair>,
}

impl RevisionData {
    /// Create revision contents from blocks and pairs.
    pub fn new(blocks: Vec<CodeBlock>, pairs: Vec<ClonePair>) -> Self {
        Self { blocks, pairs }
    }

    /// Structural validation of the loaded records: line ranges, duplicate
    /// block ids, and similarity ranges. Fatal for the revision pair.
    pub fn validate(&self, revision_id: &str) -> Result<()> {
        let mut seen: AHashSet<&str> = AHashSet::with_capacity(self.blocks.len());

        for block in &self.blocks {
            if block.block_id.is_empty() {
                return Err(CloneTraceError::input_format(
                    revision_id,
                    format!("{}:{}", block.file_path, block.start_line),
                    "empty block_id",
                ));
            }
            if block.end_line < block.start_line {
                return Err(CloneTraceError::input_format(
                    revision_id,
                    format!("block {}", block.block_id),
                    format!(
                        "end_line {} precedes start_line {}",
                        block.end_line, block.start_line
                    ),
                ));
            }
            if !seen.insert(&block.block_id) {
                return Err(CloneTraceError::input_format(
                    revision_id,
                    format!("block {}", block.block_id),
                    "duplicate block_id",
                ));
            }
        }

        for (index, pair) in self.pairs.iter().enumerate() {
            if pair.ngram_similarity > 100 || pair.lcs_similarity.is_some_and(|s| s > 100) {
                return Err(CloneTraceError::input_format(
                    revision_id,
                    format!("pair #{index}"),
                    "similarity outside 0-100",
                ));
            }
        }

        Ok(())
    }
}
