//! The revision source interface.
//!
//! Enumeration, directory scanning, and on-disk formats live outside the
//! engine; the engine consumes this trait. [`MemoryRevisionSource`] is the
//! provided in-memory implementation used by tests and embedders that
//! already hold the data.

use chrono::NaiveDate;

use crate::core::errors::{CloneTraceError, Result};
use crate::core::model::{RevisionData, RevisionInfo};

/// Supplies the ordered revision stream and per-revision contents.
pub trait RevisionSource {
    /// The revisions inside the optional inclusive date range, ordered by
    /// timestamp (non-decreasing), ties by revision id.
    fn enumerate(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<RevisionInfo>>;

    /// The code blocks and clone pairs of one revision.
    fn load(&self, revision: &RevisionInfo) -> Result<RevisionData>;
}

/// In-memory revision source.
#[derive(Debug, Default)]
pub struct MemoryRevisionSource {
    revisions: Vec<(RevisionInfo, RevisionData)>,
}

impl MemoryRevisionSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a revision. Insertion order is irrelevant; enumeration sorts.
    pub fn push(&mut self, info: RevisionInfo, data: RevisionData) {
        self.revisions.push((info, data));
    }

    /// Number of stored revisions.
    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    /// Whether the source holds no revisions.
    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }
}

impl RevisionSource for MemoryRevisionSource {
    fn enumerate(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<RevisionInfo>> {
        let mut infos: Vec<RevisionInfo> = self
            .revisions
            .iter()
            .map(|(info, _)| info.clone())
            .filter(|info| {
                let date = info.timestamp.date();
                start_date.map_or(true, |start| date >= start)
                    && end_date.map_or(true, |end| date <= end)
            })
            .collect();

        infos.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.revision_id.cmp(&b.revision_id))
        });

        Ok(infos)
    }

    fn load(&self, revision: &RevisionInfo) -> Result<RevisionData> {
        self.revisions
            .iter()
            .find(|(info, _)| info.revision_id == revision.revision_id)
            .map(|(_, data)| data.clone())
            .ok_or_else(|| CloneTraceError::revision_not_found(&revision.revision_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn info(id: &str, year: i32, month: u32, day: u32) -> RevisionInfo {
        RevisionInfo::new(
            id,
            NaiveDate::from_ymd_opt(year, month, day)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
        )
    }

    #[test]
    fn test_enumerate_sorts_by_timestamp() {
        let mut source = MemoryRevisionSource::new();
        source.push(info("r3", 2024, 3, 1), RevisionData::default());
        source.push(info("r1", 2024, 1, 1), RevisionData::default());
        source.push(info("r2", 2024, 2, 1), RevisionData::default());

        let revisions = source.enumerate(None, None).unwrap();
        let ids: Vec<&str> = revisions.iter().map(|r| r.revision_id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r2", "r3"]);
    }

    #[test]
    fn test_enumerate_filters_date_range() {
        let mut source = MemoryRevisionSource::new();
        source.push(info("r1", 2024, 1, 1), RevisionData::default());
        source.push(info("r2", 2024, 2, 1), RevisionData::default());
        source.push(info("r3", 2024, 3, 1), RevisionData::default());

        let revisions = source
            .enumerate(
                NaiveDate::from_ymd_opt(2024, 1, 15),
                NaiveDate::from_ymd_opt(2024, 2, 15),
            )
            .unwrap();
        let ids: Vec<&str> = revisions.iter().map(|r| r.revision_id.as_str()).collect();
        assert_eq!(ids, vec!["r2"]);
    }

    #[test]
    fn test_load_unknown_revision_fails() {
        let source = MemoryRevisionSource::new();
        let err = source.load(&info("ghost", 2024, 1, 1)).unwrap_err();
        assert!(matches!(err, CloneTraceError::RevisionNotFound { .. }));
    }
}
