//! Trace output streams: method rows, group rows, membership snapshots.
//!
//! Column orders are part of the output contract and are pinned by the
//! header constants below. Rows are emitted ordered by revision timestamp,
//! then block / group id, so identical runs produce identical files.

use std::io::Write;

use serde::Serialize;

use crate::core::errors::Result;
use crate::matching::method_matcher::MatchType;
use crate::matching::states::{GroupState, MethodState, MethodStateDetail};

/// Column header of the method trace stream.
pub const METHOD_TRACE_HEADER: &str = "revision_id,block_id,function_name,file_path,start_line,end_line,loc,state,state_detail,matched_block_id,match_type,match_similarity,clone_count,clone_group_id,clone_group_size,lifetime_revisions,lifetime_days";

/// Column header of the lineage view of the method trace.
pub const LINEAGE_TRACE_HEADER: &str = "lineage_id,revision_id,function_name,file_path,start_line,end_line,loc,state,state_detail,match_type,match_similarity,clone_count,clone_group_id,clone_group_size,lifetime_revisions,lifetime_days";

/// Column header of the group trace stream.
pub const GROUP_TRACE_HEADER: &str = "revision_id,group_id,member_count,avg_similarity,min_similarity,max_similarity,density,state,matched_group_id,overlap_ratio,member_added,member_removed,lifetime_revisions,lifetime_days";

/// Column header of the membership stream.
pub const MEMBERSHIP_HEADER: &str = "revision_id,group_id,block_id,function_name,is_clone";

/// One method observation in the trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodTraceRow {
    /// Revision at which the observation was made
    pub revision_id: String,
    /// Block id within that revision
    pub block_id: String,
    /// Method name
    pub function_name: String,
    /// Containing file
    pub file_path: String,
    /// First line
    pub start_line: u32,
    /// Last line, inclusive
    pub end_line: u32,
    /// `end_line − start_line + 1`
    pub loc: u32,
    /// Coarse lifecycle state
    pub state: MethodState,
    /// Refined lifecycle state
    pub state_detail: MethodStateDetail,
    /// Matched predecessor in the previous revision
    pub matched_block_id: Option<String>,
    /// Match classification
    pub match_type: MatchType,
    /// Match similarity; 100 for exact matches
    pub match_similarity: Option<u32>,
    /// `clone_group_size − 1` for clone members, 0 otherwise
    pub clone_count: usize,
    /// Clone group id, empty for singletons
    pub clone_group_id: Option<String>,
    /// Size of the containing group (1 for singletons)
    pub clone_group_size: usize,
    /// Revisions in which this lineage has been observed
    pub lifetime_revisions: u32,
    /// Whole days between first and latest observation
    pub lifetime_days: i64,
    /// Stable lineage id; not a trace column, used by the lineage view
    #[serde(skip)]
    pub lineage_id: String,
}

impl MethodTraceRow {
    fn csv_record(&self) -> String {
        [
            csv_field(&self.revision_id),
            csv_field(&self.block_id),
            csv_field(&self.function_name),
            csv_field(&self.file_path),
            self.start_line.to_string(),
            self.end_line.to_string(),
            self.loc.to_string(),
            self.state.to_string(),
            self.state_detail.to_string(),
            opt_str(self.matched_block_id.as_deref()),
            self.match_type.to_string(),
            opt_display(self.match_similarity),
            self.clone_count.to_string(),
            opt_str(self.clone_group_id.as_deref()),
            self.clone_group_size.to_string(),
            self.lifetime_revisions.to_string(),
            self.lifetime_days.to_string(),
        ]
        .join(",")
    }

    fn lineage_record(&self) -> String {
        [
            csv_field(&self.lineage_id),
            csv_field(&self.revision_id),
            csv_field(&self.function_name),
            csv_field(&self.file_path),
            self.start_line.to_string(),
            self.end_line.to_string(),
            self.loc.to_string(),
            self.state.to_string(),
            self.state_detail.to_string(),
            self.match_type.to_string(),
            opt_display(self.match_similarity),
            self.clone_count.to_string(),
            opt_str(self.clone_group_id.as_deref()),
            self.clone_group_size.to_string(),
            self.lifetime_revisions.to_string(),
            self.lifetime_days.to_string(),
        ]
        .join(",")
    }
}

/// The accumulated method trace of a tracking run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MethodTrace {
    /// All rows, ordered by revision then block id
    pub rows: Vec<MethodTraceRow>,
}

impl MethodTrace {
    /// Write the 17-column method trace as CSV.
    pub fn write_csv<W: Write>(&self, mut writer: W) -> Result<()> {
        writeln!(writer, "{METHOD_TRACE_HEADER}")?;
        for row in &self.rows {
            writeln!(writer, "{}", row.csv_record())?;
        }
        Ok(())
    }

    /// The method trace as a CSV string.
    pub fn to_csv_string(&self) -> Result<String> {
        let mut buffer = Vec::new();
        self.write_csv(&mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| crate::core::errors::CloneTraceError::internal(e.to_string()))
    }

    /// Write the 16-column lineage view: rows keyed by the stable lineage
    /// id, without the matched_block_id column.
    pub fn write_lineage_csv<W: Write>(&self, mut writer: W) -> Result<()> {
        writeln!(writer, "{LINEAGE_TRACE_HEADER}")?;
        for row in &self.rows {
            writeln!(writer, "{}", row.lineage_record())?;
        }
        Ok(())
    }

    /// The lineage view as a CSV string.
    pub fn to_lineage_csv_string(&self) -> Result<String> {
        let mut buffer = Vec::new();
        self.write_lineage_csv(&mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| crate::core::errors::CloneTraceError::internal(e.to_string()))
    }
}

/// One group observation in the trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupTraceRow {
    /// Revision at which the observation was made
    pub revision_id: String,
    /// Group id within that revision (the old id for dissolved terminals)
    pub group_id: String,
    /// Member count
    pub member_count: usize,
    /// Mean pair similarity; empty for singletons
    pub avg_similarity: Option<f64>,
    /// Minimum pair similarity; empty for singletons
    pub min_similarity: Option<u32>,
    /// Maximum pair similarity; empty for singletons
    pub max_similarity: Option<u32>,
    /// Recorded edges over possible edges
    pub density: f64,
    /// Lifecycle state
    pub state: GroupState,
    /// Matched group in the previous revision
    pub matched_group_id: Option<String>,
    /// Overlap ratio of the accepted (or best rejected) candidate
    pub overlap_ratio: Option<f64>,
    /// New members absorbed since the previous revision
    pub member_added: usize,
    /// Members that left since the previous revision
    pub member_removed: usize,
    /// Revisions in which this group lineage has been observed
    pub lifetime_revisions: u32,
    /// Whole days between first and latest observation
    pub lifetime_days: i64,
}

impl GroupTraceRow {
    fn csv_record(&self) -> String {
        [
            csv_field(&self.revision_id),
            csv_field(&self.group_id),
            self.member_count.to_string(),
            opt_display(self.avg_similarity),
            opt_display(self.min_similarity),
            opt_display(self.max_similarity),
            self.density.to_string(),
            self.state.to_string(),
            opt_str(self.matched_group_id.as_deref()),
            opt_display(self.overlap_ratio),
            self.member_added.to_string(),
            self.member_removed.to_string(),
            self.lifetime_revisions.to_string(),
            self.lifetime_days.to_string(),
        ]
        .join(",")
    }
}

/// One (revision, group, member) membership fact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MembershipRow {
    /// Revision at which the membership was observed
    pub revision_id: String,
    /// Containing group
    pub group_id: String,
    /// Member block id
    pub block_id: String,
    /// Member method name
    pub function_name: String,
    /// Whether the group is a clone group proper
    pub is_clone: bool,
}

impl MembershipRow {
    fn csv_record(&self) -> String {
        [
            csv_field(&self.revision_id),
            csv_field(&self.group_id),
            csv_field(&self.block_id),
            csv_field(&self.function_name),
            self.is_clone.to_string(),
        ]
        .join(",")
    }
}

/// The accumulated group trace and membership snapshots of a tracking run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupTrace {
    /// Group rows, ordered by revision then group id
    pub rows: Vec<GroupTraceRow>,
    /// Membership rows, ordered by revision, group id, block id
    pub membership: Vec<MembershipRow>,
}

impl GroupTrace {
    /// Write the 14-column group trace as CSV.
    pub fn write_csv<W: Write>(&self, mut writer: W) -> Result<()> {
        writeln!(writer, "{GROUP_TRACE_HEADER}")?;
        for row in &self.rows {
            writeln!(writer, "{}", row.csv_record())?;
        }
        Ok(())
    }

    /// The group trace as a CSV string.
    pub fn to_csv_string(&self) -> Result<String> {
        let mut buffer = Vec::new();
        self.write_csv(&mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| crate::core::errors::CloneTraceError::internal(e.to_string()))
    }

    /// Write the 5-column membership stream as CSV.
    pub fn write_membership_csv<W: Write>(&self, mut writer: W) -> Result<()> {
        writeln!(writer, "{MEMBERSHIP_HEADER}")?;
        for row in &self.membership {
            writeln!(writer, "{}", row.csv_record())?;
        }
        Ok(())
    }

    /// The membership stream as a CSV string.
    pub fn to_membership_csv_string(&self) -> Result<String> {
        let mut buffer = Vec::new();
        self.write_membership_csv(&mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| crate::core::errors::CloneTraceError::internal(e.to_string()))
    }
}

fn opt_str(value: Option<&str>) -> String {
    value.map(csv_field).unwrap_or_default()
}

fn opt_display<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
