//! Parallel batch planning.
//!
//! Two strategies, tried in order:
//!
//! 1. Declared execution groups: a `parallel` group is one batch, a
//!    `sequential` group is one batch per member.
//! 2. Greedy file-conflict partitioning: sweep the remaining candidates in
//!    order, admitting an item to the current batch only if it shares no
//!    touched file with anything already admitted.
//!
//! No batch produced by the partitioner contains two items that touch the
//! same file.

use crate::models::{ExecutionGroup, GroupKind};
use std::collections::{BTreeSet, HashSet};

/// A dispatch candidate: item id plus the files it touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: String,
    pub files: BTreeSet<String>,
}

impl Candidate {
    pub fn new<I, S>(id: &str, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.to_string(),
            files: files.into_iter().map(Into::into).collect(),
        }
    }
}

/// Partition `candidates` into conflict-free batches, preserving input order
/// within each batch.
pub fn partition_by_files(candidates: &[Candidate]) -> Vec<Vec<String>> {
    let mut remaining: Vec<&Candidate> = candidates.iter().collect();
    let mut batches = Vec::new();

    while !remaining.is_empty() {
        let mut batch: Vec<String> = Vec::new();
        let mut claimed: HashSet<&str> = HashSet::new();
        let mut deferred = Vec::new();

        for candidate in remaining {
            let conflicts = candidate.files.iter().any(|f| claimed.contains(f.as_str()));
            if conflicts {
                deferred.push(candidate);
            } else {
                claimed.extend(candidate.files.iter().map(String::as_str));
                batch.push(candidate.id.clone());
            }
        }

        // Every sweep must make progress
        if batch.is_empty() {
            let forced = deferred.remove(0);
            batch.push(forced.id.clone());
        }

        batches.push(batch);
        remaining = deferred;
    }

    batches
}

/// Plan batches for `candidates`, honoring `groups` when any are declared.
///
/// Candidates not named by any declared group fall through to the greedy
/// partitioner and are appended after the group batches.
pub fn plan_batches(candidates: &[Candidate], groups: &[ExecutionGroup]) -> Vec<Vec<String>> {
    if groups.is_empty() {
        return partition_by_files(candidates);
    }

    let candidate_ids: HashSet<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
    let mut placed: HashSet<String> = HashSet::new();
    let mut batches = Vec::new();

    for group in groups {
        let members: Vec<String> = group
            .solutions
            .iter()
            .filter(|id| candidate_ids.contains(id.as_str()))
            .filter(|id| placed.insert((*id).clone()))
            .cloned()
            .collect();
        if members.is_empty() {
            continue;
        }
        match group.kind {
            GroupKind::Parallel => batches.push(members),
            GroupKind::Sequential => batches.extend(members.into_iter().map(|m| vec![m])),
        }
    }

    let leftovers: Vec<Candidate> = candidates
        .iter()
        .filter(|c| !placed.contains(&c.id))
        .cloned()
        .collect();
    batches.extend(partition_by_files(&leftovers));
    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(id: &str, kind: GroupKind, members: &[&str]) -> ExecutionGroup {
        ExecutionGroup {
            id: id.to_string(),
            kind,
            solutions: members.iter().map(|m| m.to_string()).collect(),
        }
    }

    fn assert_batches_conflict_free(candidates: &[Candidate], batches: &[Vec<String>]) {
        for batch in batches {
            let mut seen = HashSet::new();
            for id in batch {
                let candidate = candidates.iter().find(|c| &c.id == id).unwrap();
                for file in &candidate.files {
                    assert!(seen.insert(file.clone()), "file {} shared in batch {:?}", file, batch);
                }
            }
        }
    }

    #[test]
    fn test_disjoint_items_share_one_batch() {
        let candidates = vec![
            Candidate::new("S-1", ["a.rs"]),
            Candidate::new("S-2", ["b.rs"]),
            Candidate::new("S-3", Vec::<String>::new()),
        ];
        assert_eq!(
            partition_by_files(&candidates),
            vec![vec!["S-1", "S-2", "S-3"]]
        );
    }

    #[test]
    fn test_conflicting_items_split_across_batches() {
        let candidates = vec![
            Candidate::new("S-1", ["a.rs", "b.rs"]),
            Candidate::new("S-2", ["b.rs"]),
            Candidate::new("S-3", ["c.rs"]),
            Candidate::new("S-4", ["a.rs", "c.rs"]),
        ];
        let batches = partition_by_files(&candidates);
        assert_eq!(batches, vec![vec!["S-1", "S-3"], vec!["S-2", "S-4"]]);
        assert_batches_conflict_free(&candidates, &batches);
    }

    #[test]
    fn test_total_conflict_yields_singletons() {
        let candidates: Vec<Candidate> = (1..=4)
            .map(|n| Candidate::new(&format!("S-{}", n), ["shared.rs"]))
            .collect();
        let batches = partition_by_files(&candidates);
        assert_eq!(batches.len(), 4);
        assert!(batches.iter().all(|b| b.len() == 1));
        assert_eq!(batches[0], vec!["S-1"]);
        assert_eq!(batches[3], vec!["S-4"]);
    }

    #[test]
    fn test_every_candidate_lands_in_exactly_one_batch() {
        let candidates = vec![
            Candidate::new("S-1", ["x", "y"]),
            Candidate::new("S-2", ["y", "z"]),
            Candidate::new("S-3", ["z", "x"]),
            Candidate::new("S-4", ["w"]),
            Candidate::new("S-5", ["x"]),
        ];
        let batches = partition_by_files(&candidates);
        let mut all: Vec<String> = batches.iter().flatten().cloned().collect();
        all.sort();
        assert_eq!(all, vec!["S-1", "S-2", "S-3", "S-4", "S-5"]);
        assert_batches_conflict_free(&candidates, &batches);
    }

    #[test]
    fn test_empty_input_has_no_batches() {
        assert!(partition_by_files(&[]).is_empty());
        assert!(plan_batches(&[], &[group("P1", GroupKind::Parallel, &["S-1"])]).is_empty());
    }

    #[test]
    fn test_declared_parallel_and_sequential_groups() {
        let candidates = vec![
            Candidate::new("S-1", ["a.rs"]),
            Candidate::new("S-2", ["a.rs"]),
            Candidate::new("S-3", ["b.rs"]),
            Candidate::new("S-4", ["c.rs"]),
        ];
        let groups = vec![
            group("P1", GroupKind::Parallel, &["S-1", "S-2"]),
            group("S1", GroupKind::Sequential, &["S-4", "S-3"]),
        ];
        assert_eq!(
            plan_batches(&candidates, &groups),
            vec![vec!["S-1", "S-2"], vec!["S-4"], vec!["S-3"]]
        );
    }

    #[test]
    fn test_declared_groups_filter_to_candidates() {
        let candidates = vec![Candidate::new("S-2", ["a.rs"]), Candidate::new("S-5", ["b.rs"])];
        let groups = vec![
            group("P1", GroupKind::Parallel, &["S-1", "S-2"]),
            group("P2", GroupKind::Parallel, &["S-3"]),
        ];
        // S-5 is in no group and is partitioned after the declared batches
        assert_eq!(
            plan_batches(&candidates, &groups),
            vec![vec!["S-2"], vec!["S-5"]]
        );
    }

    #[test]
    fn test_item_in_two_groups_is_placed_once() {
        let candidates = vec![Candidate::new("S-1", ["a"]), Candidate::new("S-2", ["b"])];
        let groups = vec![
            group("P1", GroupKind::Parallel, &["S-1"]),
            group("P2", GroupKind::Parallel, &["S-1", "S-2"]),
        ];
        assert_eq!(
            plan_batches(&candidates, &groups),
            vec![vec!["S-1"], vec!["S-2"]]
        );
    }
}
