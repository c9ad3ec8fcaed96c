//! Manual task editing on an issue's bound solution.

use chrono::Utc;
use serde::Serialize;

use super::{Output, json_string};
use crate::models::{IssueStatus, Solution, Task};
use crate::storage::{Storage, generate_solution_id};
use crate::{Error, Result};

/// Description given to the solution auto-created for hand-written tasks.
pub const MANUAL_SOLUTION_DESCRIPTION: &str = "Manual tasks";

#[derive(Debug, Clone, Default)]
pub struct TaskOptions {
    pub title: Option<String>,
    pub status: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TaskResult {
    pub issue_id: String,
    pub solution_id: String,
    /// "created" or "updated"
    pub action: &'static str,
    /// True when the bound solution was created by this call
    pub solution_created: bool,
    pub task: Task,
}

impl Output for TaskResult {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        if self.solution_created {
            lines.push(format!(
                "Created and bound solution {} for {}",
                self.solution_id, self.issue_id
            ));
        }
        let verb = if self.action == "created" { "Added" } else { "Updated" };
        lines.push(format!(
            "{} task {} [{}] {} in {}",
            verb, self.task.id, self.task.status, self.task.title, self.solution_id
        ));
        lines.join("\n")
    }
}

/// Add a task to the bound solution, or update an existing one by id.
///
/// A task id that does not exist in the bound solution creates a task with
/// that id. When the issue has no bound solution, a "Manual tasks" solution is
/// created and bound first.
pub fn task(
    storage: &Storage,
    issue_id: &str,
    task_id: Option<&str>,
    opts: TaskOptions,
) -> Result<TaskResult> {
    if let Some(ref status) = opts.status {
        if status.trim().is_empty() {
            return Err(Error::InvalidInput("Task status must not be empty".to_string()));
        }
    }

    let _lock = storage.lock()?;
    let mut issue = storage.get_issue(issue_id)?;
    let mut solutions = storage.read_solutions(issue_id)?;
    let now = Utc::now();

    let bound_idx = solutions.iter().position(|s| s.is_bound);
    let existing_task = bound_idx.and_then(|idx| {
        task_id.and_then(|id| solutions[idx].tasks.iter().position(|t| t.id == id))
    });

    if let (Some(idx), Some(pos)) = (bound_idx, existing_task) {
        if opts.title.is_none() && opts.status.is_none() && opts.description.is_none() {
            return Err(Error::InvalidInput(
                "Nothing to update (use --title, --status or --description)".to_string(),
            ));
        }
        let solution_id = solutions[idx].id.clone();
        let task = &mut solutions[idx].tasks[pos];
        if let Some(title) = opts.title {
            task.title = title;
        }
        if let Some(status) = opts.status {
            task.status = status;
        }
        if let Some(description) = opts.description {
            task.description = description;
        }
        let task = task.clone();
        storage.write_solutions(issue_id, &solutions)?;
        tracing::info!(issue = %issue_id, task = %task.id, status = %task.status, "updated task");

        return Ok(TaskResult {
            issue_id: issue_id.to_string(),
            solution_id,
            action: "updated",
            solution_created: false,
            task,
        });
    }

    let title = opts
        .title
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| Error::InvalidInput("--title is required to add a task".to_string()))?;

    let (idx, solution_created) = match bound_idx {
        Some(idx) => (idx, false),
        None => {
            let mut solution = Solution::new(
                generate_solution_id(issue_id, &solutions),
                MANUAL_SOLUTION_DESCRIPTION.to_string(),
            );
            solution.is_bound = true;
            solution.bound_at = Some(now);
            solutions.push(solution);
            (solutions.len() - 1, true)
        }
    };

    let solution = &mut solutions[idx];
    let id = match task_id {
        Some(id) => id.to_string(),
        None => solution.next_task_id()?,
    };
    let mut task = Task::manual(id, title, opts.description.unwrap_or_default());
    if let Some(status) = opts.status {
        task.status = status;
    }
    solution.tasks.push(task.clone());
    let solution_id = solution.id.clone();

    storage.write_solutions(issue_id, &solutions)?;

    if solution_created {
        issue.bound_solution_id = Some(solution_id.clone());
        issue.solution_count = solutions.len();
        if matches!(issue.status, IssueStatus::Registered | IssueStatus::Planning) {
            issue.set_status(IssueStatus::Planned, now);
        } else {
            issue.updated_at = now;
        }
        storage.update_issues(std::slice::from_ref(&issue))?;
    }
    tracing::info!(issue = %issue_id, solution = %solution_id, task = %task.id, "added task");

    Ok(TaskResult {
        issue_id: issue_id.to_string(),
        solution_id,
        action: "created",
        solution_created,
        task,
    })
}
