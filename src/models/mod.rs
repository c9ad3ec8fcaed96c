//! Data models for issue/queue entities.
//!
//! This module defines the core data structures:
//! - `Issue` - A unit of requested work with a lifecycle status
//! - `Solution` - One candidate approach for an issue, composed of tasks
//! - `Task` - One concrete implementation step with test/acceptance/commit metadata
//! - `Queue`, `QueueItem`, `QueueIndex` - Execution queues (see [`queue`])

pub mod queue;

pub use queue::{
    ConflictKind, ExecutionGroup, Executor, GroupKind, ItemStatus, Queue, QueueConflict,
    QueueIndex, QueueItem, QueueMetadata, QueueStatus, QueueSummary,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::{Error, Result};

/// Issue status in the workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    #[default]
    Registered,
    Planning,
    Planned,
    Queued,
    Executing,
    Completed,
    Failed,
    Paused,
}

impl IssueStatus {
    pub const ALL: [IssueStatus; 8] = [
        IssueStatus::Registered,
        IssueStatus::Planning,
        IssueStatus::Planned,
        IssueStatus::Queued,
        IssueStatus::Executing,
        IssueStatus::Completed,
        IssueStatus::Failed,
        IssueStatus::Paused,
    ];

    /// Parse a status string, case-insensitive.
    pub fn parse(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == wanted)
            .ok_or_else(|| {
                let valid: Vec<&str> = Self::ALL.iter().map(|s| s.as_str()).collect();
                Error::InvalidStatus(format!("'{}' (valid: {})", s, valid.join(", ")))
            })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IssueStatus::Registered => "registered",
            IssueStatus::Planning => "planning",
            IssueStatus::Planned => "planned",
            IssueStatus::Queued => "queued",
            IssueStatus::Executing => "executing",
            IssueStatus::Completed => "completed",
            IssueStatus::Failed => "failed",
            IssueStatus::Paused => "paused",
        }
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn default_issue_priority() -> u8 {
    3
}

/// A unit of work requested by a user or agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    /// Externally supplied identifier (e.g., "ISSUE-42", "GH-123")
    pub id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub status: IssueStatus,

    /// Priority level (1-5, lower is more urgent)
    #[serde(default = "default_issue_priority")]
    pub priority: u8,

    /// Free-text problem context
    #[serde(default)]
    pub context: String,

    /// Currently bound solution, if any
    #[serde(default)]
    pub bound_solution_id: Option<String>,

    /// Cached number of registered solutions
    #[serde(default)]
    pub solution_count: usize,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planned_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queued_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Issue {
    /// Create a newly registered issue.
    pub fn new(id: String, title: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            title,
            status: IssueStatus::Registered,
            priority: default_issue_priority(),
            context: String::new(),
            bound_solution_id: None,
            solution_count: 0,
            created_at: now,
            updated_at: now,
            planned_at: None,
            queued_at: None,
            completed_at: None,
        }
    }

    /// Move the issue to `status`, stamping the matching lifecycle timestamp.
    pub fn set_status(&mut self, status: IssueStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
        match status {
            IssueStatus::Planned => self.planned_at = Some(now),
            IssueStatus::Queued => self.queued_at = Some(now),
            IssueStatus::Completed => self.completed_at = Some(now),
            _ => {}
        }
    }
}

/// Risk/impact/complexity assessment attached to a solution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolutionAnalysis {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<String>,
}

/// One candidate approach to resolving an issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    /// Identifier, preferably `SOL-{issue-id}-{seq}`
    pub id: String,

    #[serde(default)]
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approach: Option<String>,

    /// Ordered implementation tasks
    #[serde(default)]
    pub tasks: Vec<Task>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exploration_context: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<SolutionAnalysis>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    #[serde(default)]
    pub is_bound: bool,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound_at: Option<DateTime<Utc>>,
}

impl Solution {
    pub fn new(id: String, description: String) -> Self {
        Self {
            id,
            description,
            approach: None,
            tasks: Vec::new(),
            exploration_context: None,
            analysis: None,
            score: None,
            is_bound: false,
            created_at: Utc::now(),
            bound_at: None,
        }
    }

    /// Union of every task's `modification_points[].file`, sorted and deduplicated.
    pub fn files_touched(&self) -> Vec<String> {
        let files: BTreeSet<&str> = self
            .tasks
            .iter()
            .flat_map(|t| t.modification_points.iter())
            .map(|mp| mp.file.as_str())
            .filter(|f| !f.is_empty())
            .collect();
        files.into_iter().map(str::to_string).collect()
    }

    pub fn find_task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    /// Next free `T{n}` task id.
    pub fn next_task_id(&self) -> Result<String> {
        let used = self
            .tasks
            .iter()
            .filter_map(|t| t.id.strip_prefix('T'))
            .filter_map(|n| n.parse::<u32>().ok());
        Ok(format!("T{}", next_sequence(used, "task id")?))
    }
}

/// One past the highest of `used` (1 when empty).
///
/// Fails with `InvalidInput` when the highest value is already `u32::MAX`,
/// which only happens with hand-edited files.
pub(crate) fn next_sequence(used: impl Iterator<Item = u32>, what: &str) -> Result<u32> {
    used.max()
        .unwrap_or(0)
        .checked_add(1)
        .ok_or_else(|| Error::InvalidInput(format!("No {} left after {}", what, u32::MAX)))
}

/// Solution document as supplied by an agent in a `--solution` file.
///
/// Every field is optional so that partially filled plans still import.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SolutionImport {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, alias = "summary")]
    pub description: Option<String>,
    #[serde(default)]
    pub approach: Option<String>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub exploration_context: Option<serde_json::Value>,
    #[serde(default)]
    pub analysis: Option<SolutionAnalysis>,
    #[serde(default)]
    pub score: Option<f64>,
}

impl SolutionImport {
    /// Build an unbound solution with the given id.
    pub fn into_solution(self, id: String) -> Result<Solution> {
        let mut solution = Solution::new(id, self.description.unwrap_or_default());
        solution.approach = self.approach;
        solution.exploration_context = self.exploration_context;
        solution.analysis = self.analysis;
        solution.score = self.score;
        for task in self.tasks {
            let mut task = task;
            if task.id.trim().is_empty() {
                task.id = solution.next_task_id()?;
            }
            solution.tasks.push(task);
        }
        Ok(solution)
    }
}

/// A file location a task intends to change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModificationPoint {
    pub file: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub change: String,
}

/// Test plan for a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskTest {
    #[serde(default)]
    pub unit: Vec<String>,
    #[serde(default)]
    pub integration: Vec<String>,
    #[serde(default)]
    pub commands: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage_target: Option<u32>,
}

/// Acceptance criteria and how to verify them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Acceptance {
    #[serde(default)]
    pub criteria: Vec<String>,
    #[serde(default)]
    pub verification: Vec<String>,
}

/// Conventional-commit message parts for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitSpec {
    #[serde(rename = "type", default = "default_commit_type")]
    pub kind: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub message_template: String,
    #[serde(default)]
    pub breaking: bool,
}

fn default_commit_type() -> String {
    "feat".to_string()
}

impl Default for CommitSpec {
    fn default() -> Self {
        Self {
            kind: default_commit_type(),
            scope: String::new(),
            message_template: String::new(),
            breaking: false,
        }
    }
}

fn default_task_status() -> String {
    "pending".to_string()
}

/// One executable unit of implementation work inside a solution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub scope: String,

    #[serde(default)]
    pub action: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub modification_points: Vec<ModificationPoint>,

    /// Ordered implementation steps
    #[serde(default)]
    pub implementation: Vec<String>,

    #[serde(default)]
    pub test: TaskTest,

    #[serde(default)]
    pub regression: Vec<String>,

    #[serde(default)]
    pub acceptance: Acceptance,

    #[serde(default)]
    pub commit: CommitSpec,

    /// Task ids within the same solution
    #[serde(default)]
    pub depends_on: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_minutes: Option<u32>,

    #[serde(default = "default_task_status")]
    pub status: String,

    #[serde(default = "default_issue_priority")]
    pub priority: u8,
}

impl Task {
    /// Skeleton for a task created by hand rather than imported from a plan.
    pub fn manual(id: String, title: String, description: String) -> Self {
        let scope = "core".to_string();
        let commit = CommitSpec {
            kind: default_commit_type(),
            scope: scope.clone(),
            message_template: format!("feat({}): {}", scope, title),
            breaking: false,
        };
        Self {
            id,
            title,
            scope,
            action: "Implement".to_string(),
            description,
            modification_points: Vec::new(),
            implementation: Vec::new(),
            test: TaskTest {
                commands: vec!["npm test".to_string()],
                ..TaskTest::default()
            },
            regression: vec!["npm test".to_string()],
            acceptance: Acceptance {
                criteria: vec!["Task completed successfully".to_string()],
                verification: vec!["Manual verification".to_string()],
            },
            commit,
            depends_on: Vec::new(),
            estimated_minutes: None,
            status: default_task_status(),
            priority: default_issue_priority(),
        }
    }
}
