//! Lifecycle states for methods and clone groups, and their classifier.
//!
//! Labelling is one orthogonal set: clone-transition labels take precedence
//! for survivors; otherwise an exact match reads unchanged and a fuzzy
//! match reads modified. Split takes precedence over merge for groups.

use serde::{Deserialize, Serialize};

use crate::matching::group_matcher::GroupMatch;

/// Coarse state of a method at a revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodState {
    /// Present in the previous revision, unmatched in this one
    Deleted,
    /// Matched from the previous revision
    Survived,
    /// Present here without a predecessor
    Added,
}

impl MethodState {
    /// Stable textual form used in trace output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deleted => "deleted",
            Self::Survived => "survived",
            Self::Added => "added",
        }
    }
}

impl std::fmt::Display for MethodState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Refined state of a method at a revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodStateDetail {
    /// Deleted; its group was a singleton
    DeletedIsolated,
    /// Deleted from a group that keeps at least one survivor
    DeletedFromGroup,
    /// Deleted from a group left with zero survivors
    DeletedLastMember,
    /// Exact match, clone status unchanged
    SurvivedUnchanged,
    /// Fuzzy match, clone status unchanged
    SurvivedModified,
    /// Was isolated, now in a clone group
    SurvivedCloneGained,
    /// Was in a clone group, now isolated
    SurvivedCloneLost,
    /// Added as a singleton
    AddedIsolated,
    /// Added into a group that contains survivors
    AddedToGroup,
    /// Added into a group whose members are all added
    AddedNewGroup,
}

impl MethodStateDetail {
    /// Stable textual form used in trace output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DeletedIsolated => "deleted_isolated",
            Self::DeletedFromGroup => "deleted_from_group",
            Self::DeletedLastMember => "deleted_last_member",
            Self::SurvivedUnchanged => "survived_unchanged",
            Self::SurvivedModified => "survived_modified",
            Self::SurvivedCloneGained => "survived_clone_gained",
            Self::SurvivedCloneLost => "survived_clone_lost",
            Self::AddedIsolated => "added_isolated",
            Self::AddedToGroup => "added_to_group",
            Self::AddedNewGroup => "added_new_group",
        }
    }

    /// The coarse state this detail refines.
    pub fn state(self) -> MethodState {
        match self {
            Self::DeletedIsolated | Self::DeletedFromGroup | Self::DeletedLastMember => {
                MethodState::Deleted
            }
            Self::SurvivedUnchanged
            | Self::SurvivedModified
            | Self::SurvivedCloneGained
            | Self::SurvivedCloneLost => MethodState::Survived,
            Self::AddedIsolated | Self::AddedToGroup | Self::AddedNewGroup => MethodState::Added,
        }
    }
}

impl std::fmt::Display for MethodStateDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a clone group at a revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupState {
    /// First observation of this group lineage
    Born,
    /// Matched with a size change inside the tolerance
    Continued,
    /// Matched and larger than the tolerance allows
    Grown,
    /// Matched and smaller than the tolerance allows
    Shrunk,
    /// Scattered into several qualifying target groups
    Split,
    /// Absorbed together with another source group
    Merged,
    /// No target group met the overlap threshold
    Dissolved,
}

impl GroupState {
    /// Stable textual form used in trace output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Born => "born",
            Self::Continued => "continued",
            Self::Grown => "grown",
            Self::Shrunk => "shrunk",
            Self::Split => "split",
            Self::Merged => "merged",
            Self::Dissolved => "dissolved",
        }
    }
}

impl std::fmt::Display for GroupState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies method and group lifecycle states across a revision pair.
#[derive(Debug, Clone)]
pub struct StateClassifier {
    size_tolerance: f64,
}

impl Default for StateClassifier {
    fn default() -> Self {
        Self::new(0.10)
    }
}

impl StateClassifier {
    /// Create a classifier with the given group-size tolerance.
    pub fn new(size_tolerance: f64) -> Self {
        Self { size_tolerance }
    }

    /// Refined state of a survivor, from its match kind and the clone
    /// status of its groups on both sides.
    pub fn classify_survived(
        &self,
        exact: bool,
        had_clones: bool,
        has_clones: bool,
    ) -> MethodStateDetail {
        match (had_clones, has_clones) {
            (false, true) => MethodStateDetail::SurvivedCloneGained,
            (true, false) => MethodStateDetail::SurvivedCloneLost,
            _ if exact => MethodStateDetail::SurvivedUnchanged,
            _ => MethodStateDetail::SurvivedModified,
        }
    }

    /// Refined state of an added block, from its group size and whether the
    /// group contains any survivor.
    pub fn classify_added(&self, group_size: usize, has_surviving_peer: bool) -> MethodStateDetail {
        if group_size <= 1 {
            MethodStateDetail::AddedIsolated
        } else if has_surviving_peer {
            MethodStateDetail::AddedToGroup
        } else {
            MethodStateDetail::AddedNewGroup
        }
    }

    /// Refined state of a deleted block, from its old group size and the
    /// number of that group's members that survive into the new revision.
    pub fn classify_deleted(&self, group_size: usize, group_survivors: usize) -> MethodStateDetail {
        if group_size <= 1 {
            MethodStateDetail::DeletedIsolated
        } else if group_survivors == 0 {
            MethodStateDetail::DeletedLastMember
        } else {
            MethodStateDetail::DeletedFromGroup
        }
    }

    /// State of a matched old group. `Born` is not produced here; it applies
    /// to new groups without any accepted source.
    pub fn classify_group(&self, group_match: &GroupMatch) -> GroupState {
        let Some(target_size) = group_match.target_size else {
            return GroupState::Dissolved;
        };

        if group_match.split {
            return GroupState::Split;
        }
        if group_match.merge {
            return GroupState::Merged;
        }

        let delta = (target_size as f64 - group_match.source_size as f64)
            / group_match.source_size as f64;
        if delta > self.size_tolerance {
            GroupState::Grown
        } else if delta < -self.size_tolerance {
            GroupState::Shrunk
        } else {
            GroupState::Continued
        }
    }
}
