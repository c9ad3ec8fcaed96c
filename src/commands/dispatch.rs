//! Execution dispatch: the state-machine surface used by executor agents.
//!
//! ```text
//! pending --next--> executing --done--> completed
//!                       |
//!                       +--done --fail--> failed --retry--> pending
//! ```
//!
//! `next` claims work (or resumes an item already executing), `detail` reads
//! the same payload without claiming, `done` settles an item and re-derives
//! the queue status, and `retry` puts failed items back to pending.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{Output, json_string};
use crate::models::{
    Executor, Issue, IssueStatus, ItemStatus, Queue, QueueItem, QueueMetadata, QueueStatus,
    Solution, Task,
};
use crate::scheduler;
use crate::storage::Storage;
use crate::{Error, Result};

/// Default reason recorded for `done --fail` without `--reason`.
pub const DEFAULT_FAILURE_REASON: &str = "Unknown failure";

/// Issue fields an executor needs alongside the solution.
#[derive(Debug, Clone, Serialize)]
pub struct IssueContext {
    pub id: String,
    pub title: String,
    pub priority: u8,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub context: String,
}

impl From<&Issue> for IssueContext {
    fn from(issue: &Issue) -> Self {
        Self {
            id: issue.id.clone(),
            title: issue.title.clone(),
            priority: issue.priority,
            context: issue.context.clone(),
        }
    }
}

/// Everything an executor needs to work on one item.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPayload {
    pub queue_id: String,
    pub item_id: String,
    pub issue_id: String,
    pub solution_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub status: ItemStatus,
    /// True when `next` returned an item that was already executing
    pub resumed: bool,
    pub execution_order: u32,
    pub execution_group: String,
    pub assigned_executor: Executor,
    pub depends_on: Vec<String>,
    pub files_touched: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<IssueContext>,
    /// The full bound solution, every task included
    pub solution: Solution,
    /// The targeted task, for task-level items
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<Task>,
}

impl ExecutionPayload {
    fn build(
        queue_id: &str,
        item: &QueueItem,
        resumed: bool,
        issue: Option<&Issue>,
        solution: Solution,
    ) -> Self {
        let task = item
            .task_id
            .as_deref()
            .and_then(|t| solution.find_task(t))
            .cloned();
        let files_touched = item
            .files_touched
            .clone()
            .unwrap_or_else(|| solution.files_touched());
        Self {
            queue_id: queue_id.to_string(),
            item_id: item.item_id.clone(),
            issue_id: item.issue_id.clone(),
            solution_id: item.solution_id.clone(),
            task_id: item.task_id.clone(),
            status: item.status,
            resumed,
            execution_order: item.execution_order,
            execution_group: item.execution_group.clone(),
            assigned_executor: item.assigned_executor,
            depends_on: item.depends_on.clone(),
            files_touched,
            started_at: item.started_at,
            issue: issue.map(IssueContext::from),
            solution,
            task,
        }
    }
}

impl Output for ExecutionPayload {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        self.to_json()
    }
}

/// Returned by `next` when nothing can be dispatched.
#[derive(Debug, Clone, Serialize)]
pub struct EmptyDispatch {
    /// Always "empty"
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<QueueMetadata>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum NextResult {
    Item(Box<ExecutionPayload>),
    Empty(EmptyDispatch),
}

impl NextResult {
    /// True when this call moved an item to `executing`. Resumes and empty
    /// results change nothing.
    pub fn is_new_claim(&self) -> bool {
        matches!(self, NextResult::Item(payload) if !payload.resumed)
    }
}

impl Output for NextResult {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        self.to_json()
    }
}

fn empty(message: &str, queue: Option<&Queue>) -> NextResult {
    NextResult::Empty(EmptyDispatch {
        status: "empty",
        message: message.to_string(),
        queue_id: queue.map(|q| q.id.clone()),
        metadata: queue.map(|q| q.metadata.clone()),
    })
}

fn item_not_found(item_id: &str, queue: &Queue) -> Error {
    Error::NotFound(format!("Queue item {} in queue {}", item_id, queue.id))
}

fn load_solution(storage: &Storage, item: &QueueItem) -> Result<Solution> {
    storage
        .find_solution(&item.issue_id, &item.solution_id)?
        .ok_or_else(|| {
            Error::NotFound(format!(
                "Solution {} for issue {}",
                item.solution_id, item.issue_id
            ))
        })
}

// === next ===

/// Claim the next item of the active queue, or resume one already executing.
///
/// With `item_id`, that item is claimed directly: an executing item is
/// resumed and a settled one is an error. Without it, an executing item is
/// preferred, then the lowest-ordered ready item.
pub fn next(storage: &Storage, item_id: Option<&str>) -> Result<NextResult> {
    let _lock = storage.lock()?;
    let Some(mut queue) = storage.active_queue()? else {
        return Ok(empty("No active queue", None));
    };

    let (target, resumed) = match item_id {
        Some(id) => {
            let item = queue.find_item(id).ok_or_else(|| item_not_found(id, &queue))?;
            match item.status {
                ItemStatus::Executing => (id.to_string(), true),
                ItemStatus::Completed | ItemStatus::Failed => {
                    return Err(Error::InvalidStatus(format!(
                        "Item {} is already {}",
                        id, item.status
                    )));
                }
                _ => (id.to_string(), false),
            }
        }
        None => match scheduler::resumable(&queue) {
            Some(item) => (item.item_id.clone(), true),
            None => match scheduler::next_ready(&queue) {
                Some(item) => (item.item_id.clone(), false),
                None => return Ok(empty("No ready items", Some(&queue))),
            },
        },
    };

    let item = queue
        .find_item(&target)
        .ok_or_else(|| item_not_found(&target, &queue))?;
    let solution = load_solution(storage, item)?;
    let mut issue = storage.find_issue(&item.issue_id)?;

    if !resumed {
        let now = Utc::now();
        let item = queue
            .find_item_mut(&target)
            .ok_or_else(|| Error::Other(format!("item {} vanished", target)))?;
        item.status = ItemStatus::Executing;
        item.started_at = Some(now);
        storage.write_queue(&mut queue)?;

        if let Some(ref mut issue) = issue {
            issue.set_status(IssueStatus::Executing, now);
            storage.update_issues(std::slice::from_ref(issue))?;
        }
        tracing::info!(queue = %queue.id, item = %target, "claimed item");
    } else {
        tracing::info!(queue = %queue.id, item = %target, "resuming item");
    }

    let item = queue
        .find_item(&target)
        .ok_or_else(|| item_not_found(&target, &queue))?;
    Ok(NextResult::Item(Box::new(ExecutionPayload::build(
        &queue.id,
        item,
        resumed,
        issue.as_ref(),
        solution,
    ))))
}

// === detail ===

/// The `next` payload for one item, without claiming it.
pub fn detail(storage: &Storage, item_id: &str, queue_id: Option<&str>) -> Result<ExecutionPayload> {
    let queue = storage.resolve_queue(queue_id)?;
    let item = queue
        .find_item(item_id)
        .ok_or_else(|| item_not_found(item_id, &queue))?;
    let solution = load_solution(storage, item)?;
    let issue = storage.find_issue(&item.issue_id)?;
    Ok(ExecutionPayload::build(
        &queue.id,
        item,
        false,
        issue.as_ref(),
        solution,
    ))
}

// === done ===

#[derive(Debug, Clone, Default)]
pub struct DoneOptions {
    pub fail: bool,
    pub reason: Option<String>,
    /// Raw JSON result document
    pub result: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DoneResult {
    pub queue_id: String,
    pub item_id: String,
    pub issue_id: String,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub queue_status: QueueStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_status: Option<IssueStatus>,
}

impl Output for DoneResult {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        let mut line = match self.failure_reason {
            Some(ref reason) => format!("Item {} failed: {}", self.item_id, reason),
            None => format!("Item {} completed", self.item_id),
        };
        if self.queue_status != QueueStatus::Active {
            line.push_str(&format!("\nQueue {} is now {}", self.queue_id, self.queue_status));
        }
        line
    }
}

/// Settle an item of the active queue as completed or failed.
///
/// The parent issue becomes `failed` on failure, and `completed` once every
/// one of its items in the queue is completed.
pub fn done(storage: &Storage, item_id: &str, opts: DoneOptions) -> Result<DoneResult> {
    let result_value = opts
        .result
        .as_deref()
        .map(|raw| {
            serde_json::from_str::<serde_json::Value>(raw)
                .map_err(|e| Error::InvalidInput(format!("--result is not valid JSON: {}", e)))
        })
        .transpose()?;

    let _lock = storage.lock()?;
    let mut queue = storage.resolve_queue(None)?;
    let now = Utc::now();

    let queue_id = queue.id.clone();
    let item = queue
        .find_item_mut(item_id)
        .ok_or_else(|| Error::NotFound(format!("Queue item {} in queue {}", item_id, queue_id)))?;
    if item.status.is_settled() {
        return Err(Error::InvalidStatus(format!(
            "Item {} is already {}",
            item_id, item.status
        )));
    }

    if opts.fail {
        item.status = ItemStatus::Failed;
        item.failure_reason = Some(
            opts.reason
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_FAILURE_REASON.to_string()),
        );
    } else {
        item.status = ItemStatus::Completed;
        item.failure_reason = None;
        if result_value.is_some() {
            item.result = result_value;
        }
    }
    item.completed_at = Some(now);
    if item.started_at.is_none() {
        item.started_at = Some(now);
    }
    let status = item.status;
    let failure_reason = item.failure_reason.clone();
    let issue_id = item.issue_id.clone();

    let queue_status = queue.aggregate_status(now);
    storage.write_queue(&mut queue)?;

    let mut issue_status = None;
    match storage.find_issue(&issue_id)? {
        Some(mut issue) => {
            let next_status = if status == ItemStatus::Failed {
                Some(IssueStatus::Failed)
            } else if queue
                .items
                .iter()
                .filter(|i| i.issue_id == issue_id)
                .all(|i| i.status == ItemStatus::Completed)
            {
                Some(IssueStatus::Completed)
            } else {
                None
            };
            if let Some(s) = next_status {
                issue.set_status(s, now);
                storage.update_issues(std::slice::from_ref(&issue))?;
            }
            issue_status = Some(issue.status);
        }
        None => tracing::warn!(issue = %issue_id, "queue item references a missing issue"),
    }
    tracing::info!(queue = %queue.id, item = %item_id, status = %status, queue_status = %queue_status, "settled item");

    Ok(DoneResult {
        queue_id: queue.id,
        item_id: item_id.to_string(),
        issue_id,
        status,
        failure_reason,
        queue_status,
        issue_status,
    })
}

// === retry ===

#[derive(Debug, Serialize)]
pub struct RetryResult {
    pub queue_id: String,
    pub reset_items: Vec<String>,
    pub issue_ids: Vec<String>,
    pub queue_status: QueueStatus,
}

impl Output for RetryResult {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        if self.reset_items.is_empty() {
            return "No failed items".to_string();
        }
        format!(
            "Reset {} item{} to pending: {}",
            self.reset_items.len(),
            if self.reset_items.len() == 1 { "" } else { "s" },
            self.reset_items.join(", ")
        )
    }
}

/// Put failed items of the active queue (optionally only one issue's) back to
/// pending. Writes nothing when there is nothing to reset.
pub fn retry(storage: &Storage, issue_id: Option<&str>) -> Result<RetryResult> {
    let _lock = storage.lock()?;
    let mut queue = storage.resolve_queue(None)?;

    let mut reset_items = Vec::new();
    let mut issue_ids: Vec<String> = Vec::new();
    for item in queue.items.iter_mut() {
        if item.status != ItemStatus::Failed {
            continue;
        }
        if issue_id.is_some_and(|id| id != item.issue_id) {
            continue;
        }
        item.status = ItemStatus::Pending;
        item.failure_reason = None;
        item.started_at = None;
        item.completed_at = None;
        reset_items.push(item.item_id.clone());
        if !issue_ids.contains(&item.issue_id) {
            issue_ids.push(item.issue_id.clone());
        }
    }

    if reset_items.is_empty() {
        return Ok(RetryResult {
            queue_id: queue.id,
            reset_items,
            issue_ids,
            queue_status: queue.status,
        });
    }

    let now = Utc::now();
    if queue.status == QueueStatus::Failed {
        queue.status = QueueStatus::Active;
        queue.completed_at = None;
    }
    storage.write_queue(&mut queue)?;

    let mut issues = Vec::new();
    for id in &issue_ids {
        match storage.find_issue(id)? {
            Some(mut issue) => {
                issue.set_status(IssueStatus::Queued, now);
                issues.push(issue);
            }
            None => tracing::warn!(issue = %id, "queue item references a missing issue"),
        }
    }
    storage.update_issues(&issues)?;
    tracing::info!(queue = %queue.id, items = reset_items.len(), "reset failed items");

    Ok(RetryResult {
        queue_id: queue.id,
        reset_items,
        issue_ids,
        queue_status: queue.status,
    })
}
