//! # Clonetrace: Clone-Evolution Tracking Engine
//!
//! Clonetrace tracks the evolution of source-code methods and of clone
//! groups of methods across an ordered sequence of repository revisions.
//! Given, per revision, a catalogue of code blocks and a list of
//! syntactically similar clone pairs, it produces:
//!
//! - a per-method trace across revisions with a classified lifecycle state
//!   (added / survived / deleted plus refined sub-states), and
//! - a per-group trace tracking how clone groups are born, grow, shrink,
//!   split, merge, and dissolve.
//!
//! ## Pipeline
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    MethodTracker / GroupTracker              │
//! ├──────────────────────────────────────────────────────────────┤
//! │  GroupDetector │ MethodMatcher │ GroupMatcher │ Classifier   │
//! │  (union-find)  │ (hash + LSH + │ (member      │ (lifecycle   │
//! │                │  similarity)  │  overlap)    │  states)     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Matching is two-phase: an exact token-hash phase followed by a
//! similarity phase that can be accelerated with a MinHash-LSH candidate
//! index, banded LCS with early termination, top-k candidate filtering,
//! and progressive thresholds. Exact mode (LSH disabled) is byte-for-byte
//! reproducible; approximate mode is deterministic for the fixed
//! permutation seed.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use clonetrace::{MemoryRevisionSource, MethodTracker, TrackingConfig};
//!
//! fn main() -> clonetrace::Result<()> {
//!     let source = MemoryRevisionSource::new();
//!     // ... push revisions into the source ...
//!     let tracker = MethodTracker::new(TrackingConfig::default())?;
//!     let trace = tracker.track(&source)?;
//!     println!("{} trace rows", trace.rows.len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

// Core data structures and shared infrastructure
pub mod core {
    //! Core data model, configuration, and shared infrastructure.

    pub mod cancel;
    pub mod config;
    pub mod errors;
    pub mod model;
    pub mod union_find;
}

// Per-revision detection algorithms
pub mod detectors {
    //! Per-revision detection: similarity kernels, LSH index, clone groups.

    pub mod groups;
    pub mod lsh;
    pub mod similarity;
}

// Cross-revision matching and state classification
pub mod matching {
    //! Cross-revision matching of methods and groups, and lifecycle
    //! classification.

    pub mod filters;
    pub mod group_matcher;
    pub mod method_matcher;
    pub mod states;
}

// Revision-sequence drivers
pub mod tracking {
    //! Trackers that drive consecutive revision pairs and accumulate
    //! lineage and lifetime state.

    pub mod group_tracker;
    pub mod lifetime;
    pub mod method_tracker;
}

// External interfaces: revision sources and trace emission
pub mod io {
    //! Revision source interface and trace output streams.

    pub mod source;
    pub mod trace;
}

// Re-export primary types for convenience
pub use crate::core::cancel::CancelToken;
pub use crate::core::config::{DateRange, LshConfig, MatcherConfig, ParallelMode, TrackingConfig};
pub use crate::core::errors::{CloneTraceError, Result};
pub use crate::core::model::{ClonePair, CodeBlock, RevisionData, RevisionInfo};
pub use crate::detectors::groups::{CloneGroup, GroupDetector};
pub use crate::io::source::{MemoryRevisionSource, RevisionSource};
pub use crate::io::trace::{GroupTrace, GroupTraceRow, MembershipRow, MethodTrace, MethodTraceRow};
pub use crate::matching::group_matcher::{GroupMatch, GroupMatcher};
pub use crate::matching::method_matcher::{MatchOutcome, MatchType, MethodMatch, MethodMatcher};
pub use crate::matching::states::{GroupState, MethodState, MethodStateDetail, StateClassifier};
pub use crate::tracking::group_tracker::GroupTracker;
pub use crate::tracking::method_tracker::MethodTracker;

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
