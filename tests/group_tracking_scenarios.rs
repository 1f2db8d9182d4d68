//! End-to-end clone-group tracking scenarios over the in-memory source.

mod common;

use clonetrace::{GroupTrace, GroupTraceRow, GroupTracker, MemoryRevisionSource, TrackingConfig};
use common::{block, pair, push_revision, ts};

fn track(source: &MemoryRevisionSource) -> GroupTrace {
    GroupTracker::new(TrackingConfig::default())
        .unwrap()
        .track(source)
        .unwrap()
}

fn row<'t>(trace: &'t GroupTrace, revision: &str, group_id: &str) -> &'t GroupTraceRow {
    trace
        .rows
        .iter()
        .find(|r| r.revision_id == revision && r.group_id == group_id)
        .unwrap_or_else(|| panic!("no group row for {revision}/{group_id}"))
}

#[test]
fn first_revision_groups_are_born() {
    let mut source = MemoryRevisionSource::new();
    push_revision(
        &mut source,
        "r1",
        ts(2024, 1, 1),
        vec![
            block("A", &[1, 2, 3, 4]),
            block("B", &[9, 8, 7, 6]),
            block("S", &[40, 41, 42]),
        ],
        vec![pair("A", "B", 88, None)],
    );

    let trace = track(&source);

    let group = row(&trace, "r1", "A");
    assert_eq!(group.state.as_str(), "born");
    assert_eq!(group.member_count, 2);
    assert_eq!(group.avg_similarity, Some(88.0));
    assert_eq!(group.min_similarity, Some(88));
    assert_eq!(group.max_similarity, Some(88));
    assert!((group.density - 1.0).abs() < 1e-9);
    assert_eq!(group.lifetime_revisions, 1);

    // singleton groups are tracked too, with empty similarity columns
    let singleton = row(&trace, "r1", "S");
    assert_eq!(singleton.member_count, 1);
    assert_eq!(singleton.avg_similarity, None);

    let members: Vec<&str> = trace
        .membership
        .iter()
        .filter(|m| m.group_id == "A")
        .map(|m| m.block_id.as_str())
        .collect();
    assert_eq!(members, vec!["A", "B"]);
    assert!(trace
        .membership
        .iter()
        .find(|m| m.block_id == "S")
        .is_some_and(|m| !m.is_clone));
}

#[test]
fn group_growth_counts_member_churn() {
    // Scenario: {A,B} grows into {A2,B2,C}
    let mut source = MemoryRevisionSource::new();
    push_revision(
        &mut source,
        "r1",
        ts(2024, 1, 1),
        vec![block("A", &[1, 2, 3, 4]), block("B", &[9, 8, 7, 6])],
        vec![pair("A", "B", 85, None)],
    );
    push_revision(
        &mut source,
        "r2",
        ts(2024, 1, 4),
        vec![
            block("A2", &[1, 2, 3, 4]),
            block("B2", &[9, 8, 7, 6]),
            block("C", &[21, 22, 23, 24]),
        ],
        vec![
            pair("A2", "B2", 85, None),
            pair("A2", "C", 78, None),
            pair("B2", "C", 76, None),
        ],
    );

    let trace = track(&source);

    let grown = row(&trace, "r2", "A2");
    assert_eq!(grown.state.as_str(), "grown");
    assert_eq!(grown.matched_group_id.as_deref(), Some("A"));
    assert_eq!(grown.member_added, 1);
    assert_eq!(grown.member_removed, 0);
    assert!((grown.overlap_ratio.unwrap() - 1.0).abs() < 1e-9);
    assert_eq!(grown.lifetime_revisions, 2);
    assert_eq!(grown.lifetime_days, 3);
}

#[test]
fn group_dissolution_emits_terminal_row() {
    // Scenario: group {A,B,C} vanishes; only A survives as a singleton
    let mut source = MemoryRevisionSource::new();
    push_revision(
        &mut source,
        "r1",
        ts(2024, 2, 1),
        vec![
            block("A", &[1, 2, 3, 4]),
            block("B", &[100, 200, 300, 400]),
            block("C", &[111, 222, 333, 444]),
        ],
        vec![
            pair("A", "B", 80, None),
            pair("B", "C", 85, None),
            pair("A", "C", 82, None),
        ],
    );
    push_revision(
        &mut source,
        "r2",
        ts(2024, 2, 8),
        vec![block("A2", &[1, 2, 3, 4])],
        vec![],
    );

    let trace = track(&source);

    let dissolved = row(&trace, "r2", "A");
    assert_eq!(dissolved.state.as_str(), "dissolved");
    assert_eq!(dissolved.member_count, 3);
    assert_eq!(dissolved.matched_group_id, None);
    // one of three members reached the singleton group: best ratio 1/3
    assert!((dissolved.overlap_ratio.unwrap() - 1.0 / 3.0).abs() < 1e-9);
    assert_eq!(dissolved.member_removed, 3);
    assert_eq!(dissolved.lifetime_revisions, 2);

    // the surviving singleton starts a new group lineage
    let born = row(&trace, "r2", "A2");
    assert_eq!(born.state.as_str(), "born");
    assert_eq!(born.member_count, 1);
}

#[test]
fn group_split_is_flagged() {
    // Scenario: {A,B,C,D} splits into {A2,B2} and {C2,D2}
    let mut source = MemoryRevisionSource::new();
    push_revision(
        &mut source,
        "r1",
        ts(2024, 3, 1),
        vec![
            block("A", &[1, 2, 3, 4]),
            block("B", &[5, 6, 7, 8]),
            block("C", &[9, 10, 11, 12]),
            block("D", &[13, 14, 15, 16]),
        ],
        vec![
            pair("A", "B", 90, None),
            pair("A", "C", 88, None),
            pair("A", "D", 87, None),
            pair("B", "C", 86, None),
            pair("B", "D", 85, None),
            pair("C", "D", 84, None),
        ],
    );
    push_revision(
        &mut source,
        "r2",
        ts(2024, 3, 8),
        vec![
            block("A2", &[1, 2, 3, 4]),
            block("B2", &[5, 6, 7, 8]),
            block("C2", &[9, 10, 11, 12]),
            block("D2", &[13, 14, 15, 16]),
        ],
        vec![pair("A2", "B2", 90, None), pair("C2", "D2", 84, None)],
    );

    let trace = track(&source);

    // the old group's accepted match ties to the smaller target id and is
    // flagged as a split
    let split = row(&trace, "r2", "A2");
    assert_eq!(split.state.as_str(), "split");
    assert_eq!(split.matched_group_id.as_deref(), Some("A"));
    assert!((split.overlap_ratio.unwrap() - 0.5).abs() < 1e-9);

    // the other fragment has no accepted source and is born
    let fragment = row(&trace, "r2", "C2");
    assert_eq!(fragment.state.as_str(), "born");
}

#[test]
fn group_merge_is_flagged() {
    // Scenario: {A,B} and {C,D} merge into one four-member group
    let mut source = MemoryRevisionSource::new();
    push_revision(
        &mut source,
        "r1",
        ts(2024, 4, 1),
        vec![
            block("A", &[1, 2, 3, 4]),
            block("B", &[5, 6, 7, 8]),
            block("C", &[9, 10, 11, 12]),
            block("D", &[13, 14, 15, 16]),
        ],
        vec![pair("A", "B", 90, None), pair("C", "D", 88, None)],
    );
    push_revision(
        &mut source,
        "r2",
        ts(2024, 4, 8),
        vec![
            block("A2", &[1, 2, 3, 4]),
            block("B2", &[5, 6, 7, 8]),
            block("C2", &[9, 10, 11, 12]),
            block("D2", &[13, 14, 15, 16]),
        ],
        vec![
            pair("A2", "B2", 90, None),
            pair("B2", "C2", 85, None),
            pair("C2", "D2", 88, None),
        ],
    );

    let trace = track(&source);

    let merged = row(&trace, "r2", "A2");
    assert_eq!(merged.state.as_str(), "merged");
    assert_eq!(merged.member_count, 4);
    // lineage and matched_group_id come from the dominant source; both
    // sources tie at overlap 2, so the smaller id wins
    assert_eq!(merged.matched_group_id.as_deref(), Some("A"));
    assert_eq!(merged.member_added, 2);
    assert_eq!(merged.member_removed, 0);
}

#[test]
fn membership_covers_every_revision_and_group() {
    let mut source = MemoryRevisionSource::new();
    push_revision(
        &mut source,
        "r1",
        ts(2024, 1, 1),
        vec![block("A", &[1, 2, 3]), block("B", &[4, 5, 6])],
        vec![],
    );
    push_revision(
        &mut source,
        "r2",
        ts(2024, 1, 2),
        vec![block("A2", &[1, 2, 3]), block("B2", &[4, 5, 6])],
        vec![],
    );

    let trace = track(&source);

    // two singleton groups per revision, one membership row each
    assert_eq!(trace.membership.len(), 4);
    let keys: Vec<(String, String, String)> = trace
        .membership
        .iter()
        .map(|m| (m.revision_id.clone(), m.group_id.clone(), m.block_id.clone()))
        .collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

#[test]
fn group_csv_output_is_reproducible() {
    let mut source = MemoryRevisionSource::new();
    push_revision(
        &mut source,
        "r1",
        ts(2024, 1, 1),
        vec![block("A", &[1, 2, 3, 4]), block("B", &[5, 6, 7, 8])],
        vec![pair("A", "B", 91, None)],
    );
    push_revision(
        &mut source,
        "r2",
        ts(2024, 1, 3),
        vec![block("A2", &[1, 2, 3, 4]), block("B2", &[5, 6, 7, 8])],
        vec![pair("A2", "B2", 91, None)],
    );

    let tracker = GroupTracker::new(TrackingConfig::default()).unwrap();
    let first = tracker.track(&source).unwrap();
    let second = tracker.track(&source).unwrap();

    assert_eq!(
        first.to_csv_string().unwrap(),
        second.to_csv_string().unwrap()
    );
    assert_eq!(
        first.to_membership_csv_string().unwrap(),
        second.to_membership_csv_string().unwrap()
    );
}
