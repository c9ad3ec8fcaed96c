//! Dependency graph and dispatch planning over a queue's items.
//!
//! The scheduler is pure: it takes a loaded [`Queue`] and returns a
//! [`QueueDag`] describing readiness, edges, group membership and the planned
//! parallel batches. It never touches storage.

pub mod batch;

pub use batch::{Candidate, partition_by_files, plan_batches};

use crate::models::{Executor, ItemStatus, Queue, QueueItem};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Status of every item in a queue, keyed by item id.
pub fn status_map(queue: &Queue) -> HashMap<&str, ItemStatus> {
    queue
        .items
        .iter()
        .map(|i| (i.item_id.as_str(), i.status))
        .collect()
}

/// Whether every dependency of `item` is completed or absent from the queue.
pub fn dependencies_satisfied(item: &QueueItem, statuses: &HashMap<&str, ItemStatus>) -> bool {
    item.depends_on
        .iter()
        .all(|dep| match statuses.get(dep.as_str()) {
            Some(status) => *status == ItemStatus::Completed,
            None => true,
        })
}

/// Pending with all dependencies satisfied.
pub fn is_ready(item: &QueueItem, statuses: &HashMap<&str, ItemStatus>) -> bool {
    item.status == ItemStatus::Pending && dependencies_satisfied(item, statuses)
}

/// Dependencies present in the queue that are neither completed nor failed.
pub fn blocked_by(item: &QueueItem, statuses: &HashMap<&str, ItemStatus>) -> Vec<String> {
    item.depends_on
        .iter()
        .filter(|dep| {
            statuses
                .get(dep.as_str())
                .is_some_and(|status| !status.is_settled())
        })
        .cloned()
        .collect()
}

/// Items eligible for dispatch planning: ready items plus those already
/// executing, in queue order.
pub fn dispatchable(queue: &Queue) -> Vec<&QueueItem> {
    let statuses = status_map(queue);
    queue
        .items
        .iter()
        .filter(|i| i.status == ItemStatus::Executing || is_ready(i, &statuses))
        .collect()
}

/// The ready item with the lowest execution order.
pub fn next_ready(queue: &Queue) -> Option<&QueueItem> {
    let statuses = status_map(queue);
    queue
        .items
        .iter()
        .filter(|i| is_ready(i, &statuses))
        .min_by_key(|i| i.execution_order)
}

/// An executing item to resume, lowest execution order first.
pub fn resumable(queue: &Queue) -> Option<&QueueItem> {
    queue
        .items
        .iter()
        .filter(|i| i.status == ItemStatus::Executing)
        .min_by_key(|i| i.execution_order)
}

/// One node of the queue dependency graph.
#[derive(Debug, Clone, Serialize)]
pub struct DagNode {
    pub id: String,
    pub issue_id: String,
    pub solution_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub status: ItemStatus,
    pub executor: Executor,
    pub priority: f64,
    pub execution_group: String,
    pub depends_on: Vec<String>,
    pub task_count: usize,
    pub files_touched: Vec<String>,
    pub ready: bool,
    pub blocked_by: Vec<String>,
}

/// Directed edge: `from` must complete before `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DagEdge {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DagSummary {
    pub total: usize,
    pub ready: usize,
    pub executing: usize,
    pub completed: usize,
    pub failed: usize,
    /// Size of the first batch
    pub can_parallel: usize,
    pub batches_needed: usize,
}

/// The queryable dependency graph of a queue.
#[derive(Debug, Clone, Serialize)]
pub struct QueueDag {
    pub queue_id: String,
    pub nodes: Vec<DagNode>,
    pub edges: Vec<DagEdge>,
    /// Execution group label to dispatchable item ids
    pub groups: BTreeMap<String, Vec<String>>,
    pub parallel_batches: Vec<Vec<String>>,
    #[serde(rename = "_summary")]
    pub summary: DagSummary,
}

/// Build the DAG for `queue`.
///
/// `backfill` supplies touched files for legacy items that carry no cached
/// `files_touched`; it is not consulted for items that do.
pub fn build_dag<F>(queue: &Queue, backfill: F) -> QueueDag
where
    F: Fn(&QueueItem) -> Vec<String>,
{
    let statuses = status_map(queue);

    let files_of = |item: &QueueItem| -> Vec<String> {
        match &item.files_touched {
            Some(files) => files.clone(),
            None => backfill(item),
        }
    };

    let mut nodes = Vec::with_capacity(queue.items.len());
    let mut edges = Vec::new();
    for item in &queue.items {
        for dep in &item.depends_on {
            edges.push(DagEdge {
                from: dep.clone(),
                to: item.item_id.clone(),
            });
        }
        nodes.push(DagNode {
            id: item.item_id.clone(),
            issue_id: item.issue_id.clone(),
            solution_id: item.solution_id.clone(),
            task_id: item.task_id.clone(),
            status: item.status,
            executor: item.assigned_executor,
            priority: item.semantic_priority,
            execution_group: item.execution_group.clone(),
            depends_on: item.depends_on.clone(),
            task_count: item.task_count,
            files_touched: files_of(item),
            ready: is_ready(item, &statuses),
            blocked_by: blocked_by(item, &statuses),
        });
    }

    let dispatch = dispatchable(queue);
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for item in &dispatch {
        groups
            .entry(item.execution_group.clone())
            .or_default()
            .push(item.item_id.clone());
    }

    let candidates: Vec<Candidate> = dispatch
        .iter()
        .map(|item| {
            let files = nodes
                .iter()
                .find(|n| n.id == item.item_id)
                .map(|n| n.files_touched.clone())
                .unwrap_or_default();
            Candidate::new(&item.item_id, files)
        })
        .collect();
    let parallel_batches = plan_batches(&candidates, &queue.execution_groups);

    let count = |status: ItemStatus| nodes.iter().filter(|n| n.status == status).count();
    let summary = DagSummary {
        total: nodes.len(),
        ready: nodes.iter().filter(|n| n.ready).count(),
        executing: count(ItemStatus::Executing),
        completed: count(ItemStatus::Completed),
        failed: count(ItemStatus::Failed),
        can_parallel: parallel_batches.first().map_or(0, Vec::len),
        batches_needed: parallel_batches.len(),
    };

    QueueDag {
        queue_id: queue.id.clone(),
        nodes,
        edges,
        groups,
        parallel_batches,
        summary,
    }
}
