//! Execution queue models.
//!
//! A `Queue` is persisted as one pretty-printed JSON document per queue. Newer
//! files carry solution-level items under `solutions`; older files carry
//! task-level items under `tasks`. [`Queue::migrate_legacy`] folds the old shape
//! into the unified item list once, right after load.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::next_sequence;
use crate::{Error, Result};

/// Current on-disk queue schema version.
pub const QUEUE_SCHEMA_VERSION: &str = "2.0";

/// Default execution group label for new items.
pub const DEFAULT_GROUP: &str = "P1";

/// Default semantic priority for new items.
pub const DEFAULT_SEMANTIC_PRIORITY: f64 = 0.5;

/// Queue lifecycle status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    #[default]
    Active,
    Completed,
    Archived,
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Active => "active",
            QueueStatus::Completed => "completed",
            QueueStatus::Archived => "archived",
            QueueStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a single queue item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    Pending,
    Ready,
    Executing,
    Completed,
    Failed,
    /// Advisory only; never produced by the built-in transitions
    Blocked,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Ready => "ready",
            ItemStatus::Executing => "executing",
            ItemStatus::Completed => "completed",
            ItemStatus::Failed => "failed",
            ItemStatus::Blocked => "blocked",
        }
    }

    /// Completed or failed.
    pub fn is_settled(&self) -> bool {
        matches!(self, ItemStatus::Completed | ItemStatus::Failed)
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which executor an item is assigned to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Executor {
    #[default]
    Codex,
    Gemini,
    Agent,
}

impl Executor {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "codex" => Ok(Executor::Codex),
            "gemini" => Ok(Executor::Gemini),
            "agent" => Ok(Executor::Agent),
            _ => Err(Error::InvalidInput(format!(
                "Invalid executor '{}' (valid: codex, gemini, agent)",
                s
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Executor::Codex => "codex",
            Executor::Gemini => "gemini",
            Executor::Agent => "agent",
        }
    }
}

impl fmt::Display for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn default_group() -> String {
    DEFAULT_GROUP.to_string()
}

fn default_semantic_priority() -> f64 {
    DEFAULT_SEMANTIC_PRIORITY
}

/// One schedulable unit inside a queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    /// `S-{n}` for solution-level items, `T-{n}` for legacy task-level items
    pub item_id: String,

    pub issue_id: String,

    pub solution_id: String,

    /// Set only for legacy task-level items
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,

    #[serde(default)]
    pub status: ItemStatus,

    /// Insertion sequence within the queue
    #[serde(default)]
    pub execution_order: u32,

    #[serde(default = "default_group")]
    pub execution_group: String,

    /// Item ids within the same queue
    #[serde(default)]
    pub depends_on: Vec<String>,

    #[serde(default = "default_semantic_priority")]
    pub semantic_priority: f64,

    #[serde(default)]
    pub assigned_executor: Executor,

    #[serde(default)]
    pub task_count: usize,

    /// Cached union of the solution's modification files.
    /// `None` on legacy records that predate the cache.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_touched: Option<Vec<String>>,

    #[serde(default = "Utc::now")]
    pub queued_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl QueueItem {
    /// Create a pending solution-level item with default scheduling hints.
    pub fn new(item_id: String, issue_id: String, solution_id: String) -> Self {
        Self {
            item_id,
            issue_id,
            solution_id,
            task_id: None,
            status: ItemStatus::Pending,
            execution_order: 0,
            execution_group: default_group(),
            depends_on: Vec::new(),
            semantic_priority: default_semantic_priority(),
            assigned_executor: Executor::default(),
            task_count: 0,
            files_touched: None,
            queued_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            failure_reason: None,
        }
    }
}

/// Kind of a declared queue conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    File,
    Dependency,
    Resource,
    #[serde(other)]
    Unknown,
}

/// A conflict declared by the planner together with its resolution policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConflict {
    #[serde(rename = "type")]
    pub kind: ConflictKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Item ids involved in the conflict
    #[serde(default, alias = "tasks")]
    pub solutions: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resolution_order: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

/// How members of an execution group run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    Parallel,
    Sequential,
}

/// An agent-declared grouping of items for dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionGroup {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: GroupKind,

    /// Member item ids, in run order for sequential groups
    #[serde(default, alias = "tasks")]
    pub solutions: Vec<String>,
}

/// Counts and bookkeeping recomputed on every queue write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMetadata {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub total_items: usize,
    #[serde(default)]
    pub pending_count: usize,
    #[serde(default)]
    pub executing_count: usize,
    #[serde(default)]
    pub completed_count: usize,
    #[serde(default)]
    pub failed_count: usize,
    /// Stamp of the last successful write; used as the optimistic-concurrency token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_version() -> String {
    QUEUE_SCHEMA_VERSION.to_string()
}

impl Default for QueueMetadata {
    fn default() -> Self {
        Self {
            version: default_version(),
            total_items: 0,
            pending_count: 0,
            executing_count: 0,
            completed_count: 0,
            failed_count: 0,
            updated_at: None,
        }
    }
}

/// A persisted batch of schedulable work items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Queue {
    /// `QUE-{YYYYMMDDHHMMSS}`
    pub id: String,

    #[serde(default)]
    pub status: QueueStatus,

    #[serde(default)]
    pub issue_ids: Vec<String>,

    #[serde(rename = "solutions", default)]
    pub items: Vec<QueueItem>,

    /// Legacy task-level items; drained by `migrate_legacy` and never written back
    #[serde(rename = "tasks", default, skip_serializing)]
    pub legacy_items: Vec<QueueItem>,

    #[serde(default)]
    pub conflicts: Vec<QueueConflict>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub execution_groups: Vec<ExecutionGroup>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(rename = "_metadata", default)]
    pub metadata: QueueMetadata,
}

impl Queue {
    /// Create an empty active queue.
    pub fn new(id: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            status: QueueStatus::Active,
            issue_ids: Vec::new(),
            items: Vec::new(),
            legacy_items: Vec::new(),
            conflicts: Vec::new(),
            execution_groups: Vec::new(),
            created_at: now,
            completed_at: None,
            metadata: QueueMetadata::default(),
        }
    }

    /// Queue id derived from a creation timestamp.
    pub fn id_for(now: DateTime<Utc>) -> String {
        format!("QUE-{}", now.format("%Y%m%d%H%M%S"))
    }

    /// Fold legacy `tasks` items into the unified item list.
    ///
    /// Returns true when anything was migrated.
    pub fn migrate_legacy(&mut self) -> bool {
        if self.legacy_items.is_empty() {
            return false;
        }
        let legacy = std::mem::take(&mut self.legacy_items);
        for item in legacy {
            if self.find_item(&item.item_id).is_none() {
                self.items.push(item);
            }
        }
        true
    }

    pub fn find_item(&self, item_id: &str) -> Option<&QueueItem> {
        self.items.iter().find(|i| i.item_id == item_id)
    }

    pub fn find_item_mut(&mut self, item_id: &str) -> Option<&mut QueueItem> {
        self.items.iter_mut().find(|i| i.item_id == item_id)
    }

    /// Next item id for `prefix` ("S" or "T"), one past the highest used.
    pub fn next_item_id(&self, prefix: &str) -> Result<String> {
        let lead = format!("{}-", prefix);
        let used = self
            .items
            .iter()
            .filter_map(|i| i.item_id.strip_prefix(lead.as_str()))
            .filter_map(|n| n.parse::<u32>().ok());
        Ok(format!("{}{}", lead, next_sequence(used, "queue item id")?))
    }

    /// Next insertion sequence number.
    pub fn next_execution_order(&self) -> Result<u32> {
        next_sequence(
            self.items.iter().map(|i| i.execution_order),
            "execution order",
        )
    }

    pub fn contains_solution(&self, issue_id: &str, solution_id: &str) -> bool {
        self.items
            .iter()
            .any(|i| i.issue_id == issue_id && i.solution_id == solution_id && i.task_id.is_none())
    }

    /// Recompute `_metadata` counts from the item list and fill in derived
    /// `issue_ids` when none were set explicitly.
    pub fn refresh_metadata(&mut self, now: DateTime<Utc>) {
        let count = |status: ItemStatus| self.items.iter().filter(|i| i.status == status).count();
        self.metadata = QueueMetadata {
            version: QUEUE_SCHEMA_VERSION.to_string(),
            total_items: self.items.len(),
            pending_count: count(ItemStatus::Pending),
            executing_count: count(ItemStatus::Executing),
            completed_count: count(ItemStatus::Completed),
            failed_count: count(ItemStatus::Failed),
            updated_at: Some(now),
        };

        if self.issue_ids.is_empty() {
            for item in &self.items {
                if !self.issue_ids.contains(&item.issue_id) {
                    self.issue_ids.push(item.issue_id.clone());
                }
            }
        }
    }

    /// Settle the queue status from its items: `completed` when every item
    /// completed, `failed` when every item settled with at least one failure,
    /// otherwise unchanged. Archived queues are left alone.
    pub fn aggregate_status(&mut self, now: DateTime<Utc>) -> QueueStatus {
        if self.status == QueueStatus::Archived || self.items.is_empty() {
            return self.status;
        }
        let all_completed = self.items.iter().all(|i| i.status == ItemStatus::Completed);
        let all_settled = self.items.iter().all(|i| i.status.is_settled());
        let any_failed = self.items.iter().any(|i| i.status == ItemStatus::Failed);

        if all_completed {
            self.status = QueueStatus::Completed;
            self.completed_at = Some(now);
        } else if all_settled && any_failed {
            self.status = QueueStatus::Failed;
            self.completed_at = Some(now);
        }
        self.status
    }

    /// Index entry describing this queue.
    pub fn summary(&self) -> QueueSummary {
        QueueSummary {
            id: self.id.clone(),
            status: self.status,
            issue_ids: self.issue_ids.clone(),
            total_items: self.items.len(),
            completed_items: self
                .items
                .iter()
                .filter(|i| i.status == ItemStatus::Completed)
                .count(),
            failed_items: self
                .items
                .iter()
                .filter(|i| i.status == ItemStatus::Failed)
                .count(),
            created_at: self.created_at,
            completed_at: self.completed_at,
        }
    }
}

/// Summary row for one queue in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSummary {
    pub id: String,
    #[serde(default)]
    pub status: QueueStatus,
    #[serde(default)]
    pub issue_ids: Vec<String>,
    #[serde(default)]
    pub total_items: usize,
    #[serde(default)]
    pub completed_items: usize,
    #[serde(default)]
    pub failed_items: usize,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Queue index: every known queue plus the active pointer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueIndex {
    #[serde(default)]
    pub active_queue_id: Option<String>,
    #[serde(default)]
    pub queues: Vec<QueueSummary>,
}

impl QueueIndex {
    /// Insert or replace the entry for `summary.id`.
    pub fn upsert(&mut self, summary: QueueSummary) {
        match self.queues.iter_mut().find(|q| q.id == summary.id) {
            Some(existing) => *existing = summary,
            None => self.queues.push(summary),
        }
    }

    /// Remove the entry for `queue_id`, clearing the active pointer if it matched.
    pub fn remove(&mut self, queue_id: &str) -> bool {
        let before = self.queues.len();
        self.queues.retain(|q| q.id != queue_id);
        let was_active = self.active_queue_id.as_deref() == Some(queue_id);
        if was_active {
            self.active_queue_id = None;
        }
        before != self.queues.len() || was_active
    }

    pub fn get(&self, queue_id: &str) -> Option<&QueueSummary> {
        self.queues.iter().find(|q| q.id == queue_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, status: ItemStatus) -> QueueItem {
        let mut item = QueueItem::new(id.to_string(), "ISSUE-1".to_string(), "SOL-1".to_string());
        item.status = status;
        item
    }

    fn queue_with(statuses: &[ItemStatus]) -> Queue {
        let mut queue = Queue::new("QUE-20260101000000".to_string(), Utc::now());
        for (n, status) in statuses.iter().enumerate() {
            queue.items.push(item(&format!("S-{}", n + 1), *status));
        }
        queue
    }

    #[test]
    fn test_queue_id_format() {
        let now = DateTime::parse_from_rfc3339("2026-03-04T05:06:07Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(Queue::id_for(now), "QUE-20260304050607");
    }

    #[test]
    fn test_next_item_id_is_monotonic() {
        let mut queue = queue_with(&[]);
        assert_eq!(queue.next_item_id("S").unwrap(), "S-1");
        queue.items.push(item("S-1", ItemStatus::Pending));
        queue.items.push(item("S-3", ItemStatus::Pending));
        queue.items.push(item("T-9", ItemStatus::Pending));
        assert_eq!(queue.next_item_id("S").unwrap(), "S-4");
        assert_eq!(queue.next_item_id("T").unwrap(), "T-10");
    }

    #[test]
    fn test_exhausted_counters_are_errors() {
        let mut queue = queue_with(&[]);
        let mut last = item("S-4294967295", ItemStatus::Pending);
        last.execution_order = u32::MAX;
        queue.items.push(last);

        assert!(matches!(queue.next_item_id("S"), Err(Error::InvalidInput(_))));
        assert!(matches!(queue.next_execution_order(), Err(Error::InvalidInput(_))));
        assert_eq!(queue.next_item_id("T").unwrap(), "T-1");
    }

    #[test]
    fn test_aggregate_all_completed() {
        let mut queue = queue_with(&[ItemStatus::Completed, ItemStatus::Completed]);
        assert_eq!(queue.aggregate_status(Utc::now()), QueueStatus::Completed);
        assert!(queue.completed_at.is_some());
    }

    #[test]
    fn test_aggregate_settled_with_failure() {
        let mut queue = queue_with(&[ItemStatus::Completed, ItemStatus::Failed]);
        assert_eq!(queue.aggregate_status(Utc::now()), QueueStatus::Failed);
    }

    #[test]
    fn test_aggregate_unsettled_stays_active() {
        let mut queue = queue_with(&[ItemStatus::Failed, ItemStatus::Executing]);
        assert_eq!(queue.aggregate_status(Utc::now()), QueueStatus::Active);

        let mut empty = queue_with(&[]);
        assert_eq!(empty.aggregate_status(Utc::now()), QueueStatus::Active);
    }

    #[test]
    fn test_aggregate_leaves_archived_alone() {
        let mut queue = queue_with(&[ItemStatus::Completed]);
        queue.status = QueueStatus::Archived;
        assert_eq!(queue.aggregate_status(Utc::now()), QueueStatus::Archived);
    }

    #[test]
    fn test_refresh_metadata_counts_and_issue_ids() {
        let mut queue = queue_with(&[
            ItemStatus::Pending,
            ItemStatus::Executing,
            ItemStatus::Completed,
            ItemStatus::Failed,
            ItemStatus::Pending,
        ]);
        queue.items[4].issue_id = "ISSUE-2".to_string();
        let now = Utc::now();
        queue.refresh_metadata(now);

        assert_eq!(queue.metadata.total_items, 5);
        assert_eq!(queue.metadata.pending_count, 2);
        assert_eq!(queue.metadata.executing_count, 1);
        assert_eq!(queue.metadata.completed_count, 1);
        assert_eq!(queue.metadata.failed_count, 1);
        assert_eq!(queue.metadata.updated_at, Some(now));
        assert_eq!(queue.issue_ids, vec!["ISSUE-1", "ISSUE-2"]);
    }

    #[test]
    fn test_legacy_tasks_migrate_into_items() {
        let json = r#"{
            "id": "QUE-20250101000000",
            "status": "active",
            "tasks": [
                {"item_id": "T-1", "issue_id": "ISSUE-1", "solution_id": "SOL-1", "task_id": "T1"},
                {"item_id": "T-2", "issue_id": "ISSUE-1", "solution_id": "SOL-1", "task_id": "T2", "depends_on": ["T-1"]}
            ]
        }"#;
        let mut queue: Queue = serde_json::from_str(json).unwrap();
        assert!(queue.items.is_empty());

        assert!(queue.migrate_legacy());
        assert_eq!(queue.items.len(), 2);
        assert_eq!(queue.items[1].task_id.as_deref(), Some("T2"));
        assert_eq!(queue.items[1].execution_group, "P1");
        assert!(!queue.migrate_legacy());

        let written = serde_json::to_value(&queue).unwrap();
        assert!(written.get("tasks").is_none());
        assert_eq!(written["solutions"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_index_upsert_and_remove() {
        let mut index = QueueIndex::default();
        let mut queue = queue_with(&[ItemStatus::Pending]);
        index.upsert(queue.summary());
        queue.items[0].status = ItemStatus::Completed;
        index.upsert(queue.summary());
        index.active_queue_id = Some(queue.id.clone());

        assert_eq!(index.queues.len(), 1);
        assert_eq!(index.queues[0].completed_items, 1);

        assert!(index.remove(&queue.id));
        assert!(index.queues.is_empty());
        assert!(index.active_queue_id.is_none());
        assert!(!index.remove(&queue.id));
    }

    #[test]
    fn test_execution_group_accepts_legacy_tasks_key() {
        let group: ExecutionGroup =
            serde_json::from_str(r#"{"id":"P2","type":"sequential","tasks":["T-1","T-2"]}"#)
                .unwrap();
        assert_eq!(group.kind, GroupKind::Sequential);
        assert_eq!(group.solutions, vec!["T-1", "T-2"]);
    }
}
