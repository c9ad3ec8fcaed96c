//! Queue management: add, switch, list/history, archive, delete, plan and dag.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use super::{Output, json_string, read_json_file};
use crate::config::ResolvedConfig;
use crate::models::queue::{DEFAULT_GROUP, DEFAULT_SEMANTIC_PRIORITY};
use crate::models::{
    ExecutionGroup, Executor, IssueStatus, Queue, QueueConflict, QueueItem, QueueStatus,
    QueueSummary,
};
use crate::scheduler::{self, QueueDag};
use crate::storage::Storage;
use crate::{Error, Result};

fn queue_line(summary: &QueueSummary, active: bool) -> String {
    format!(
        "{} {} [{}] {}/{} completed{} issues: {}",
        if active { "*" } else { " " },
        summary.id,
        summary.status,
        summary.completed_items,
        summary.total_items,
        if summary.failed_items > 0 {
            format!(", {} failed,", summary.failed_items)
        } else {
            String::new()
        },
        if summary.issue_ids.is_empty() {
            "-".to_string()
        } else {
            summary.issue_ids.join(", ")
        }
    )
}

fn item_line(item: &QueueItem) -> String {
    let mut line = format!(
        "  {} [{}] {} / {}",
        item.item_id, item.status, item.issue_id, item.solution_id
    );
    if let Some(ref task_id) = item.task_id {
        line.push_str(&format!(" / {}", task_id));
    }
    line.push_str(&format!(" ({}, {})", item.execution_group, item.assigned_executor));
    if !item.depends_on.is_empty() {
        line.push_str(&format!(" after {}", item.depends_on.join(", ")));
    }
    line
}

// === show ===

#[derive(Debug, Serialize)]
pub struct QueueShowResult {
    pub queue: Option<Queue>,
}

impl Output for QueueShowResult {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        match self.queue {
            None => "No active queue".to_string(),
            Some(ref queue) => {
                let mut lines = vec![queue_line(&queue.summary(), true)];
                if queue.items.is_empty() {
                    lines.push("  (no items)".to_string());
                }
                lines.extend(queue.items.iter().map(item_line));
                lines.join("\n")
            }
        }
    }
}

/// The active queue with its items, if there is one.
pub fn queue_show(storage: &Storage) -> Result<QueueShowResult> {
    Ok(QueueShowResult {
        queue: storage.active_queue()?,
    })
}

// === add ===

/// Scheduling defaults applied by `queue add` when no option overrides them.
#[derive(Debug, Clone)]
pub struct QueueDefaults {
    pub executor: Executor,
    pub group: String,
    pub semantic_priority: f64,
}

impl Default for QueueDefaults {
    fn default() -> Self {
        Self {
            executor: Executor::default(),
            group: DEFAULT_GROUP.to_string(),
            semantic_priority: DEFAULT_SEMANTIC_PRIORITY,
        }
    }
}

impl QueueDefaults {
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self {
            executor: config.default_executor.value,
            group: config.default_group.value.clone(),
            semantic_priority: config.default_semantic_priority.value,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    pub depends_on: Vec<String>,
    pub group: Option<String>,
    pub executor: Option<String>,
    pub semantic_priority: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct QueueAddResult {
    pub queue_id: String,
    pub created_queue: bool,
    pub item: QueueItem,
}

impl Output for QueueAddResult {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        if self.created_queue {
            lines.push(format!("Created queue {}", self.queue_id));
        }
        lines.push(format!(
            "Queued {} as {} in {} ({} task{}, {} file{})",
            self.item.issue_id,
            self.item.item_id,
            self.queue_id,
            self.item.task_count,
            if self.item.task_count == 1 { "" } else { "s" },
            self.item.files_touched.as_ref().map_or(0, Vec::len),
            if self.item.files_touched.as_ref().map_or(0, Vec::len) == 1 {
                ""
            } else {
                "s"
            },
        ));
        lines.join("\n")
    }
}

/// Queue the issue's bound solution as a new item of the active queue.
///
/// A new queue is created when there is no active queue or the active queue
/// is no longer `active`.
pub fn queue_add(
    storage: &Storage,
    issue_id: &str,
    opts: AddOptions,
    defaults: &QueueDefaults,
) -> Result<QueueAddResult> {
    let executor = match opts.executor {
        Some(ref raw) => Executor::parse(raw)?,
        None => defaults.executor,
    };
    let semantic_priority = opts.semantic_priority.unwrap_or(defaults.semantic_priority);
    if !(0.0..=1.0).contains(&semantic_priority) {
        return Err(Error::InvalidInput(format!(
            "Semantic priority must be between 0 and 1, got {}",
            semantic_priority
        )));
    }
    let group = opts
        .group
        .filter(|g| !g.trim().is_empty())
        .unwrap_or_else(|| defaults.group.clone());

    let _lock = storage.lock()?;
    let mut issue = storage.get_issue(issue_id)?;
    let solution = storage.bound_solution(issue_id)?.ok_or_else(|| {
        Error::InvalidInput(format!(
            "Issue {} has no bound solution (run bind first)",
            issue_id
        ))
    })?;

    let active = storage
        .active_queue()?
        .filter(|q| q.status == QueueStatus::Active);

    if let Some(ref queue) = active {
        if queue.contains_solution(issue_id, &solution.id) {
            return Err(Error::AlreadyExists(format!(
                "Solution {} of issue {} is already in queue {}",
                solution.id, issue_id, queue.id
            )));
        }
    }
    for dep in &opts.depends_on {
        let known = active.as_ref().is_some_and(|q| q.find_item(dep).is_some());
        if !known {
            return Err(Error::NotFound(format!(
                "Queue item {} (--depends-on must name an item in the active queue)",
                dep
            )));
        }
    }

    let now = Utc::now();
    let created_queue = active.is_none();
    let mut queue = match active {
        Some(queue) => queue,
        None => storage.create_queue(now)?,
    };

    let mut item = QueueItem::new(
        queue.next_item_id("S")?,
        issue_id.to_string(),
        solution.id.clone(),
    );
    item.execution_order = queue.next_execution_order()?;
    item.execution_group = group;
    item.depends_on = opts.depends_on;
    item.semantic_priority = semantic_priority;
    item.assigned_executor = executor;
    item.task_count = solution.tasks.len();
    item.files_touched = Some(solution.files_touched());
    item.queued_at = now;

    queue.items.push(item.clone());
    if !queue.issue_ids.iter().any(|id| id == issue_id) {
        queue.issue_ids.push(issue_id.to_string());
    }
    storage.write_queue(&mut queue)?;

    issue.set_status(IssueStatus::Queued, now);
    storage.update_issues(std::slice::from_ref(&issue))?;
    tracing::info!(queue = %queue.id, item = %item.item_id, issue = %issue_id, "queued solution");

    Ok(QueueAddResult {
        queue_id: queue.id,
        created_queue,
        item,
    })
}

// === switch ===

#[derive(Debug, Serialize)]
pub struct QueueSwitchResult {
    pub active_queue_id: String,
    pub previous_queue_id: Option<String>,
}

impl Output for QueueSwitchResult {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        match self.previous_queue_id {
            Some(ref prev) if prev != &self.active_queue_id => {
                format!("Switched active queue: {} -> {}", prev, self.active_queue_id)
            }
            _ => format!("Active queue: {}", self.active_queue_id),
        }
    }
}

/// Point the index's active pointer at `queue_id`.
pub fn queue_switch(storage: &Storage, queue_id: &str) -> Result<QueueSwitchResult> {
    let _lock = storage.lock()?;
    if !storage.queue_exists(queue_id) {
        return Err(Error::NotFound(format!("Queue {}", queue_id)));
    }
    let queue = storage.read_queue(queue_id)?;

    let mut index = storage.read_index()?;
    let previous_queue_id = index.active_queue_id.replace(queue.id.clone());
    index.upsert(queue.summary());
    storage.write_index(&index)?;
    tracing::info!(queue = %queue.id, "switched active queue");

    Ok(QueueSwitchResult {
        active_queue_id: queue.id,
        previous_queue_id,
    })
}

// === list / history ===

#[derive(Debug, Serialize)]
pub struct QueueListResult {
    pub active_queue_id: Option<String>,
    pub queues: Vec<QueueSummary>,
}

impl Output for QueueListResult {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        if self.queues.is_empty() {
            return "No queues".to_string();
        }
        self.queues
            .iter()
            .map(|q| queue_line(q, self.active_queue_id.as_deref() == Some(q.id.as_str())))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Every queue in index order.
pub fn queue_list(storage: &Storage) -> Result<QueueListResult> {
    let index = storage.read_index()?;
    Ok(QueueListResult {
        active_queue_id: index.active_queue_id,
        queues: index.queues,
    })
}

/// Every queue, newest first.
pub fn queue_history(storage: &Storage) -> Result<QueueListResult> {
    let mut result = queue_list(storage)?;
    result
        .queues
        .sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
    Ok(result)
}

// === archive ===

#[derive(Debug, Serialize)]
pub struct QueueArchiveResult {
    pub queue_id: String,
    pub was_active: bool,
}

impl Output for QueueArchiveResult {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        if self.was_active {
            format!("Archived queue {} (no active queue now)", self.queue_id)
        } else {
            format!("Archived queue {}", self.queue_id)
        }
    }
}

/// Archive a queue (the active one by default) and clear the active pointer
/// if it pointed there.
pub fn queue_archive(storage: &Storage, queue_id: Option<&str>) -> Result<QueueArchiveResult> {
    let _lock = storage.lock()?;
    let mut queue = storage.resolve_queue(queue_id)?;
    queue.status = QueueStatus::Archived;
    storage.write_queue(&mut queue)?;

    let mut index = storage.read_index()?;
    let was_active = index.active_queue_id.as_deref() == Some(queue.id.as_str());
    if was_active {
        index.active_queue_id = None;
        storage.write_index(&index)?;
    }
    tracing::info!(queue = %queue.id, "archived queue");

    Ok(QueueArchiveResult {
        queue_id: queue.id,
        was_active,
    })
}

// === delete ===

#[derive(Debug, Serialize)]
pub struct QueueDeleteResult {
    pub queue_id: String,
    pub was_active: bool,
}

impl Output for QueueDeleteResult {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        format!("Deleted queue {}", self.queue_id)
    }
}

/// Remove a queue file and its index entry.
pub fn queue_delete(storage: &Storage, queue_id: &str) -> Result<QueueDeleteResult> {
    let _lock = storage.lock()?;
    let mut index = storage.read_index()?;
    let was_active = index.active_queue_id.as_deref() == Some(queue_id);

    let removed_entry = index.remove(queue_id);
    let removed_file = storage.delete_queue_file(queue_id)?;
    if !removed_entry && !removed_file {
        return Err(Error::NotFound(format!("Queue {}", queue_id)));
    }
    if removed_entry {
        storage.write_index(&index)?;
    }
    tracing::info!(queue = %queue_id, was_active, "deleted queue");

    Ok(QueueDeleteResult {
        queue_id: queue_id.to_string(),
        was_active,
    })
}

// === plan ===

/// Planner output: declared execution groups and conflicts.
#[derive(Debug, Default, Deserialize)]
struct PlanImport {
    #[serde(default)]
    execution_groups: Vec<ExecutionGroup>,
    #[serde(default)]
    conflicts: Vec<QueueConflict>,
}

#[derive(Debug, Serialize)]
pub struct QueuePlanResult {
    pub queue_id: String,
    pub execution_groups: Vec<ExecutionGroup>,
    pub conflicts: Vec<QueueConflict>,
}

impl Output for QueuePlanResult {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "Planned queue {}: {} group{}, {} conflict{}",
            self.queue_id,
            self.execution_groups.len(),
            if self.execution_groups.len() == 1 { "" } else { "s" },
            self.conflicts.len(),
            if self.conflicts.len() == 1 { "" } else { "s" },
        )];
        for group in &self.execution_groups {
            let kind = match group.kind {
                crate::models::GroupKind::Parallel => "parallel",
                crate::models::GroupKind::Sequential => "sequential",
            };
            lines.push(format!("  {} ({}): {}", group.id, kind, group.solutions.join(", ")));
        }
        lines.join("\n")
    }
}

/// Replace a queue's declared execution groups and conflicts with those in
/// the plan file at `path`.
pub fn queue_plan(storage: &Storage, path: &Path, queue_id: Option<&str>) -> Result<QueuePlanResult> {
    let plan: PlanImport = read_json_file(path, "plan")?;
    if plan.execution_groups.is_empty() && plan.conflicts.is_empty() {
        return Err(Error::InvalidInput(
            "Plan declares no execution_groups or conflicts".to_string(),
        ));
    }

    let _lock = storage.lock()?;
    let mut queue = storage.resolve_queue(queue_id)?;

    let referenced = plan
        .execution_groups
        .iter()
        .flat_map(|g| g.solutions.iter())
        .chain(plan.conflicts.iter().flat_map(|c| c.solutions.iter()))
        .chain(plan.conflicts.iter().flat_map(|c| c.resolution_order.iter()));
    for id in referenced {
        if queue.find_item(id).is_none() {
            return Err(Error::NotFound(format!(
                "Queue item {} in queue {}",
                id, queue.id
            )));
        }
    }

    queue.execution_groups = plan.execution_groups;
    queue.conflicts = plan.conflicts;
    storage.write_queue(&mut queue)?;
    tracing::info!(
        queue = %queue.id,
        groups = queue.execution_groups.len(),
        conflicts = queue.conflicts.len(),
        "imported queue plan"
    );

    Ok(QueuePlanResult {
        queue_id: queue.id,
        execution_groups: queue.execution_groups,
        conflicts: queue.conflicts,
    })
}

// === dag ===

impl Output for QueueDag {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        let s = &self.summary;
        let mut lines = vec![format!(
            "Queue {}: {} items, {} ready, {} executing, {} completed, {} failed",
            self.queue_id, s.total, s.ready, s.executing, s.completed, s.failed
        )];
        for node in &self.nodes {
            let mut line = format!("  {} [{}]", node.id, node.status);
            if node.ready {
                line.push_str(" ready");
            }
            if !node.blocked_by.is_empty() {
                line.push_str(&format!(" blocked by {}", node.blocked_by.join(", ")));
            }
            lines.push(line);
        }
        if self.parallel_batches.is_empty() {
            lines.push("Nothing to dispatch".to_string());
        } else {
            lines.push(format!(
                "Batches ({} needed, {} can run now):",
                s.batches_needed, s.can_parallel
            ));
            for (i, batch) in self.parallel_batches.iter().enumerate() {
                lines.push(format!("  {}: {}", i + 1, batch.join(", ")));
            }
        }
        lines.join("\n")
    }
}

/// Touched files for items written before the `files_touched` cache existed.
///
/// Task-level items use their own task's files when the task can be found;
/// everything else uses the whole solution.
fn backfill_files(storage: &Storage, queue: &Queue) -> Result<HashMap<String, Vec<String>>> {
    let mut files = HashMap::new();
    for item in queue.items.iter().filter(|i| i.files_touched.is_none()) {
        let Some(solution) = storage.find_solution(&item.issue_id, &item.solution_id)? else {
            tracing::warn!(item = %item.item_id, solution = %item.solution_id, "solution missing; assuming no touched files");
            continue;
        };
        let touched = match item.task_id.as_deref().and_then(|t| solution.find_task(t)) {
            Some(task) => {
                let mut own: Vec<String> = task
                    .modification_points
                    .iter()
                    .map(|mp| mp.file.clone())
                    .filter(|f| !f.is_empty())
                    .collect();
                own.sort();
                own.dedup();
                own
            }
            None => solution.files_touched(),
        };
        files.insert(item.item_id.clone(), touched);
    }
    Ok(files)
}

/// Dependency graph and parallel batches for a queue (the active one by default).
pub fn queue_dag(storage: &Storage, queue_id: Option<&str>) -> Result<QueueDag> {
    let queue = storage.resolve_queue(queue_id)?;
    let backfilled = backfill_files(storage, &queue)?;
    Ok(scheduler::build_dag(&queue, |item| {
        backfilled.get(&item.item_id).cloned().unwrap_or_default()
    }))
}
