//! Per-lineage lifetime bookkeeping.
//!
//! A lineage is observed once per trace row, including the terminal row of
//! a deleted method or dissolved group, so the revision count of the last
//! observation equals the lineage's total row count.

use ahash::AHashMap;
use chrono::NaiveDateTime;

/// First/latest observation and revision count of one lineage.
#[derive(Debug, Clone)]
struct LifetimeEntry {
    first_seen: NaiveDateTime,
    revisions: u32,
}

/// Lifetime observation result: (revisions observed, whole days spanned).
pub type Lifetime = (u32, i64);

/// Tracks lifetimes for all lineages of a run.
#[derive(Debug, Default)]
pub struct LifetimeLedger {
    entries: AHashMap<String, LifetimeEntry>,
}

impl LifetimeLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the first observation of a lineage.
    pub fn begin(&mut self, lineage_id: &str, timestamp: NaiveDateTime) -> Lifetime {
        self.entries.insert(
            lineage_id.to_string(),
            LifetimeEntry {
                first_seen: timestamp,
                revisions: 1,
            },
        );
        (1, 0)
    }

    /// Record a further observation of a lineage. Unknown lineages start
    /// fresh, which keeps the ledger robust against out-of-band inputs.
    pub fn observe(&mut self, lineage_id: &str, timestamp: NaiveDateTime) -> Lifetime {
        match self.entries.get_mut(lineage_id) {
            Some(entry) => {
                entry.revisions += 1;
                let days = (timestamp.date() - entry.first_seen.date()).num_days();
                (entry.revisions, days)
            }
            None => self.begin(lineage_id, timestamp),
        }
    }

    /// Number of tracked lineages.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no lineage has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
