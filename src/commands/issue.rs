//! Issue lifecycle: init, update, list, status and solution binding.

use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use super::{Output, json_string, read_json_file};
use crate::models::{Issue, IssueStatus, ItemStatus, QueueSummary, Solution, SolutionImport};
use crate::storage::{Storage, generate_solution_id, validate_issue_id};
use crate::{Error, Result};

const MIN_PRIORITY: u8 = 1;
const MAX_PRIORITY: u8 = 5;

fn validate_priority(priority: Option<u8>) -> Result<()> {
    match priority {
        Some(p) if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&p) => Err(Error::InvalidInput(
            format!(
                "Priority must be {}-{}, got {}",
                MIN_PRIORITY, MAX_PRIORITY, p
            ),
        )),
        _ => Ok(()),
    }
}

/// One-line summary of a solution for listings.
#[derive(Debug, Clone, Serialize)]
pub struct SolutionSummary {
    pub id: String,
    pub description: String,
    pub task_count: usize,
    pub is_bound: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl From<&Solution> for SolutionSummary {
    fn from(s: &Solution) -> Self {
        Self {
            id: s.id.clone(),
            description: s.description.clone(),
            task_count: s.tasks.len(),
            is_bound: s.is_bound,
            score: s.score,
        }
    }
}

impl SolutionSummary {
    fn human_line(&self) -> String {
        format!(
            "  {} {} ({} task{}){}",
            if self.is_bound { "*" } else { " " },
            self.id,
            self.task_count,
            if self.task_count == 1 { "" } else { "s" },
            if self.description.is_empty() {
                String::new()
            } else {
                format!(" - {}", self.description)
            }
        )
    }
}

fn issue_line(issue: &Issue) -> String {
    format!(
        "{} [{}] P{} {}",
        issue.id, issue.status, issue.priority, issue.title
    )
}

// === init ===

#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    pub title: Option<String>,
    pub priority: Option<u8>,
    pub description: Option<String>,
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct IssueResult {
    pub issue: Issue,
    /// What happened: "created", "replaced" or "updated"
    pub action: &'static str,
}

impl Output for IssueResult {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        let verb = match self.action {
            "created" => "Created",
            "replaced" => "Replaced",
            _ => "Updated",
        };
        format!("{} issue {}", verb, issue_line(&self.issue))
    }
}

/// Register a new issue.
///
/// With `force`, an existing record is replaced and reset to `registered`; its
/// solution binding is kept so it stays consistent with the solutions file.
pub fn init(storage: &Storage, issue_id: &str, opts: InitOptions) -> Result<IssueResult> {
    validate_issue_id(issue_id)?;
    validate_priority(opts.priority)?;

    let _lock = storage.lock()?;
    let existing = storage.find_issue(issue_id)?;
    if existing.is_some() && !opts.force {
        return Err(Error::AlreadyExists(format!(
            "Issue {} (use --force to overwrite)",
            issue_id
        )));
    }

    let title = opts
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| issue_id.to_string());
    let mut issue = Issue::new(issue_id.to_string(), title);
    if let Some(p) = opts.priority {
        issue.priority = p;
    }
    issue.context = opts.description.unwrap_or_default();

    let action = match existing {
        Some(old) => {
            issue.bound_solution_id = old.bound_solution_id;
            issue.solution_count = old.solution_count;
            "replaced"
        }
        None => "created",
    };
    storage.put_issue(&issue)?;
    tracing::info!(issue = %issue.id, action, "registered issue");

    Ok(IssueResult { issue, action })
}

// === update ===

#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    pub status: Option<String>,
    pub priority: Option<u8>,
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Update issue fields. Setting `planned`, `queued` or `completed` stamps the
/// matching timestamp.
pub fn update(storage: &Storage, issue_id: &str, opts: UpdateOptions) -> Result<IssueResult> {
    let status = opts.status.as_deref().map(IssueStatus::parse).transpose()?;
    validate_priority(opts.priority)?;
    if status.is_none() && opts.priority.is_none() && opts.title.is_none() && opts.description.is_none()
    {
        return Err(Error::InvalidInput(
            "Nothing to update (use --status, --priority, --title or --description)".to_string(),
        ));
    }

    let _lock = storage.lock()?;
    let mut issue = storage.get_issue(issue_id)?;
    let now = Utc::now();

    if let Some(title) = opts.title {
        issue.title = title;
    }
    if let Some(description) = opts.description {
        issue.context = description;
    }
    if let Some(priority) = opts.priority {
        issue.priority = priority;
    }
    match status {
        Some(status) => issue.set_status(status, now),
        None => issue.updated_at = now,
    }

    storage.update_issues(std::slice::from_ref(&issue))?;
    tracing::info!(issue = %issue.id, status = %issue.status, "updated issue");

    Ok(IssueResult {
        issue,
        action: "updated",
    })
}

// === list ===

#[derive(Debug, Serialize)]
pub struct IssueList {
    pub issues: Vec<Issue>,
    pub count: usize,
    #[serde(skip)]
    pub ids_only: bool,
}

impl Output for IssueList {
    fn to_json(&self) -> String {
        if self.ids_only {
            let ids: Vec<&str> = self.issues.iter().map(|i| i.id.as_str()).collect();
            return json_string(&ids);
        }
        json_string(self)
    }

    fn to_human(&self) -> String {
        if self.ids_only {
            return self
                .issues
                .iter()
                .map(|i| i.id.as_str())
                .collect::<Vec<_>>()
                .join("\n");
        }
        if self.issues.is_empty() {
            return "No issues found.".to_string();
        }
        let mut lines = vec![format!(
            "{} issue{}:",
            self.count,
            if self.count == 1 { "" } else { "s" }
        )];
        lines.extend(self.issues.iter().map(|i| format!("  {}", issue_line(i))));
        lines.join("\n")
    }
}

/// List issues, optionally one by id or filtered by comma-separated statuses.
pub fn list(
    storage: &Storage,
    issue_id: Option<&str>,
    statuses: Option<&str>,
    ids_only: bool,
) -> Result<IssueList> {
    let filter: Vec<IssueStatus> = match statuses {
        Some(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(IssueStatus::parse)
            .collect::<Result<_>>()?,
        None => Vec::new(),
    };

    let issues: Vec<Issue> = match issue_id {
        Some(id) => vec![storage.get_issue(id)?],
        None => storage.read_issues()?,
    };
    let issues: Vec<Issue> = issues
        .into_iter()
        .filter(|i| filter.is_empty() || filter.contains(&i.status))
        .collect();

    Ok(IssueList {
        count: issues.len(),
        issues,
        ids_only,
    })
}

// === status ===

/// A queue item that references an issue.
#[derive(Debug, Clone, Serialize)]
pub struct QueueItemRef {
    pub queue_id: String,
    pub item_id: String,
    pub solution_id: String,
    pub status: ItemStatus,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum StatusResult {
    Issue {
        issue: Issue,
        solutions: Vec<SolutionSummary>,
        queue_items: Vec<QueueItemRef>,
    },
    Overview {
        total: usize,
        by_status: BTreeMap<String, usize>,
        active_queue: Option<QueueSummary>,
    },
}

impl Output for StatusResult {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        match self {
            StatusResult::Issue {
                issue,
                solutions,
                queue_items,
            } => {
                let mut lines = vec![issue_line(issue)];
                if !issue.context.is_empty() {
                    lines.push(format!("  {}", issue.context));
                }
                lines.push(format!("Solutions ({}):", solutions.len()));
                lines.extend(solutions.iter().map(SolutionSummary::human_line));
                if !queue_items.is_empty() {
                    lines.push("Queue items:".to_string());
                    lines.extend(queue_items.iter().map(|r| {
                        format!("  {}/{} [{}] {}", r.queue_id, r.item_id, r.status, r.solution_id)
                    }));
                }
                lines.join("\n")
            }
            StatusResult::Overview {
                total,
                by_status,
                active_queue,
            } => {
                let mut lines = vec![format!("{} issue{}", total, if *total == 1 { "" } else { "s" })];
                for (status, count) in by_status {
                    lines.push(format!("  {:<11} {}", status, count));
                }
                match active_queue {
                    Some(q) => lines.push(format!(
                        "Active queue: {} [{}] {}/{} completed",
                        q.id, q.status, q.completed_items, q.total_items
                    )),
                    None => lines.push("Active queue: none".to_string()),
                }
                lines.join("\n")
            }
        }
    }
}

/// Detailed status of one issue, or an overview of all issues.
pub fn status(storage: &Storage, issue_id: Option<&str>) -> Result<StatusResult> {
    match issue_id {
        Some(id) => {
            let issue = storage.get_issue(id)?;
            let solutions = storage
                .read_solutions(id)?
                .iter()
                .map(SolutionSummary::from)
                .collect();

            let mut queue_items = Vec::new();
            for summary in storage.read_index()?.queues {
                if !summary.issue_ids.iter().any(|i| i == id) || !storage.queue_exists(&summary.id)
                {
                    continue;
                }
                let queue = storage.read_queue(&summary.id)?;
                queue_items.extend(queue.items.iter().filter(|i| i.issue_id == id).map(|i| {
                    QueueItemRef {
                        queue_id: queue.id.clone(),
                        item_id: i.item_id.clone(),
                        solution_id: i.solution_id.clone(),
                        status: i.status,
                    }
                }));
            }

            Ok(StatusResult::Issue {
                issue,
                solutions,
                queue_items,
            })
        }
        None => {
            let issues = storage.read_issues()?;
            let mut by_status = BTreeMap::new();
            for issue in &issues {
                *by_status.entry(issue.status.to_string()).or_insert(0) += 1;
            }
            let index = storage.read_index()?;
            let active_queue = index
                .active_queue_id
                .as_deref()
                .and_then(|id| index.get(id))
                .cloned();
            Ok(StatusResult::Overview {
                total: issues.len(),
                by_status,
                active_queue,
            })
        }
    }
}

// === bind ===

#[derive(Debug, Serialize)]
pub struct BindResult {
    pub issue_id: String,
    /// Id of a solution imported by this call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imported: Option<String>,
    /// Id of the solution bound by this call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bound: Option<String>,
    pub solutions: Vec<SolutionSummary>,
}

impl Output for BindResult {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        if let Some(ref id) = self.imported {
            lines.push(format!("Imported solution {} for {}", id, self.issue_id));
        }
        if let Some(ref id) = self.bound {
            lines.push(format!("Bound solution {} to {}", id, self.issue_id));
        }
        if self.imported.is_none() && self.bound.is_none() {
            if self.solutions.is_empty() {
                lines.push(format!("No solutions for {}", self.issue_id));
            } else {
                lines.push(format!("Solutions for {}:", self.issue_id));
                lines.extend(self.solutions.iter().map(SolutionSummary::human_line));
            }
        }
        lines.join("\n")
    }
}

/// Import and/or bind a solution.
///
/// - With `solution_file`, the file is imported as a new unbound solution. Its
///   id is taken from the file, else from `solution_id`, else generated. A
///   file id that differs from `solution_id` is rejected.
/// - With `solution_id` (and no file), that solution becomes the only bound one.
/// - With both, the imported solution is bound.
/// - With neither, the issue's solutions are listed.
pub fn bind(
    storage: &Storage,
    issue_id: &str,
    solution_id: Option<&str>,
    solution_file: Option<&Path>,
) -> Result<BindResult> {
    let import: Option<SolutionImport> = solution_file
        .map(|path| read_json_file(path, "solution"))
        .transpose()?;
    if let (Some(file_id), Some(cli_id)) = (
        import
            .as_ref()
            .and_then(|i| i.id.as_deref())
            .filter(|id| !id.trim().is_empty()),
        solution_id,
    ) {
        if file_id != cli_id {
            return Err(Error::InvalidInput(format!(
                "Solution file declares id {} but {} was given",
                file_id, cli_id
            )));
        }
    }

    let _lock = storage.lock()?;
    let mut issue = storage.get_issue(issue_id)?;
    let mut solutions = storage.read_solutions(issue_id)?;
    let now = Utc::now();

    let mut imported = None;
    if let Some(import) = import {
        let id = import
            .id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .or_else(|| solution_id.map(str::to_string))
            .unwrap_or_else(|| generate_solution_id(issue_id, &solutions));
        if solutions.iter().any(|s| s.id == id) {
            return Err(Error::AlreadyExists(format!(
                "Solution {} for issue {}",
                id, issue_id
            )));
        }
        let solution = import.into_solution(id.clone())?;
        tracing::info!(issue = %issue_id, solution = %id, tasks = solution.tasks.len(), "imported solution");
        solutions.push(solution);
        imported = Some(id);
    }

    let to_bind = match (&imported, solution_id) {
        (Some(id), Some(_)) => Some(id.clone()),
        (None, Some(id)) => Some(id.to_string()),
        _ => None,
    };

    if let Some(ref id) = to_bind {
        if !solutions.iter().any(|s| &s.id == id) {
            return Err(Error::NotFound(format!(
                "Solution {} for issue {}",
                id, issue_id
            )));
        }
        for solution in solutions.iter_mut() {
            if &solution.id == id {
                solution.is_bound = true;
                solution.bound_at = Some(now);
            } else {
                solution.is_bound = false;
                solution.bound_at = None;
            }
        }
        issue.bound_solution_id = Some(id.clone());
        issue.set_status(IssueStatus::Planned, now);
        tracing::info!(issue = %issue_id, solution = %id, "bound solution");
    }

    if imported.is_some() || to_bind.is_some() {
        storage.write_solutions(issue_id, &solutions)?;
        issue.solution_count = solutions.len();
        issue.updated_at = now;
        storage.update_issues(std::slice::from_ref(&issue))?;
    }

    Ok(BindResult {
        issue_id: issue_id.to_string(),
        imported,
        bound: to_bind,
        solutions: solutions.iter().map(SolutionSummary::from).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestEnv;
    use std::fs;

    fn init_issue(storage: &Storage, id: &str) -> Issue {
        init(storage, id, InitOptions::default()).unwrap().issue
    }

    fn write_solution_file(env: &TestEnv, name: &str, json: &str) -> std::path::PathBuf {
        let path = env.path().join(name);
        fs::write(&path, json).unwrap();
        path
    }

    const TWO_TASKS: &str = r#"{
        "description": "Rewrite the parser",
        "tasks": [
            {"title": "Tokenizer", "modification_points": [{"file": "src/lex.rs"}]},
            {"title": "Parser", "modification_points": [{"file": "src/parse.rs"}]}
        ]
    }"#;

    #[test]
    fn test_init_registers_issue() {
        let env = TestEnv::new();
        let storage = env.storage();
        let result = init(
            &storage,
            "ISSUE-1",
            InitOptions {
                title: Some("Crash on start".to_string()),
                priority: Some(2),
                description: Some("Segfault in main".to_string()),
                force: false,
            },
        )
        .unwrap();

        assert_eq!(result.action, "created");
        assert_eq!(result.issue.status, IssueStatus::Registered);
        let stored = storage.get_issue("ISSUE-1").unwrap();
        assert_eq!(stored.title, "Crash on start");
        assert_eq!(stored.priority, 2);
        assert_eq!(stored.context, "Segfault in main");
    }

    #[test]
    fn test_init_defaults_title_to_id() {
        let env = TestEnv::new();
        assert_eq!(init_issue(&env.storage(), "GH-12").title, "GH-12");
    }

    #[test]
    fn test_init_existing_requires_force() {
        let env = TestEnv::new();
        let storage = env.storage();
        init_issue(&storage, "ISSUE-1");

        let err = init(&storage, "ISSUE-1", InitOptions::default()).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));

        let forced = init(
            &storage,
            "ISSUE-1",
            InitOptions {
                title: Some("Again".to_string()),
                force: true,
                ..InitOptions::default()
            },
        )
        .unwrap();
        assert_eq!(forced.action, "replaced");
        assert_eq!(storage.read_issues().unwrap().len(), 1);
        assert_eq!(storage.get_issue("ISSUE-1").unwrap().title, "Again");
    }

    #[test]
    fn test_init_rejects_bad_input() {
        let env = TestEnv::new();
        let storage = env.storage();
        assert!(matches!(
            init(&storage, "../x", InitOptions::default()),
            Err(Error::InvalidInput(_))
        ));
        let bad_priority = InitOptions {
            priority: Some(9),
            ..InitOptions::default()
        };
        assert!(init(&storage, "ISSUE-1", bad_priority).is_err());
        assert!(storage.read_issues().unwrap().is_empty());
    }

    #[test]
    fn test_update_status_stamps_timestamp() {
        let env = TestEnv::new();
        let storage = env.storage();
        init_issue(&storage, "ISSUE-1");

        let result = update(
            &storage,
            "ISSUE-1",
            UpdateOptions {
                status: Some("queued".to_string()),
                title: Some("New title".to_string()),
                ..UpdateOptions::default()
            },
        )
        .unwrap();
        assert_eq!(result.issue.status, IssueStatus::Queued);
        assert!(result.issue.queued_at.is_some());
        assert_eq!(storage.get_issue("ISSUE-1").unwrap().title, "New title");
    }

    #[test]
    fn test_update_invalid_status_writes_nothing() {
        let env = TestEnv::new();
        let storage = env.storage();
        init_issue(&storage, "ISSUE-1");

        let err = update(
            &storage,
            "ISSUE-1",
            UpdateOptions {
                status: Some("done".to_string()),
                title: Some("Ignored".to_string()),
                ..UpdateOptions::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidStatus(_)));
        assert_eq!(storage.get_issue("ISSUE-1").unwrap().title, "ISSUE-1");

        assert!(matches!(
            update(&storage, "ISSUE-1", UpdateOptions::default()),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            update(
                &storage,
                "ISSUE-404",
                UpdateOptions {
                    priority: Some(1),
                    ..UpdateOptions::default()
                }
            ),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_list_filters_by_status() {
        let env = TestEnv::new();
        let storage = env.storage();
        init_issue(&storage, "ISSUE-1");
        init_issue(&storage, "ISSUE-2");
        init_issue(&storage, "ISSUE-3");
        update(
            &storage,
            "ISSUE-2",
            UpdateOptions {
                status: Some("planned".to_string()),
                ..UpdateOptions::default()
            },
        )
        .unwrap();
        update(
            &storage,
            "ISSUE-3",
            UpdateOptions {
                status: Some("failed".to_string()),
                ..UpdateOptions::default()
            },
        )
        .unwrap();

        let all = list(&storage, None, None, false).unwrap();
        assert_eq!(all.count, 3);

        let some = list(&storage, None, Some("planned, failed"), true).unwrap();
        let ids: Vec<&str> = some.issues.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["ISSUE-2", "ISSUE-3"]);
        assert_eq!(some.to_json(), r#"["ISSUE-2","ISSUE-3"]"#);

        assert!(list(&storage, None, Some("bogus"), false).is_err());
        assert_eq!(list(&storage, Some("ISSUE-1"), None, false).unwrap().count, 1);
    }

    #[test]
    fn test_bind_scenario_import_then_bind() {
        let env = TestEnv::new();
        let storage = env.storage();
        init_issue(&storage, "ISSUE-1");
        let file = write_solution_file(&env, "sol.json", TWO_TASKS);

        let imported = bind(&storage, "ISSUE-1", None, Some(&file)).unwrap();
        let sol_id = imported.imported.clone().unwrap();
        assert_eq!(sol_id, "SOL-ISSUE-1-1");
        assert!(imported.bound.is_none());

        let solution = storage.find_solution("ISSUE-1", &sol_id).unwrap().unwrap();
        assert!(!solution.is_bound);
        assert_eq!(solution.tasks.len(), 2);
        assert_eq!(solution.tasks[1].id, "T2");
        assert_eq!(storage.get_issue("ISSUE-1").unwrap().status, IssueStatus::Registered);

        let bound = bind(&storage, "ISSUE-1", Some(&sol_id), None).unwrap();
        assert_eq!(bound.bound.as_deref(), Some(sol_id.as_str()));
        let issue = storage.get_issue("ISSUE-1").unwrap();
        assert_eq!(issue.bound_solution_id.as_deref(), Some(sol_id.as_str()));
        assert_eq!(issue.status, IssueStatus::Planned);
        assert!(issue.planned_at.is_some());
        assert_eq!(issue.solution_count, 1);
    }

    #[test]
    fn test_bind_keeps_single_bound_solution() {
        let env = TestEnv::new();
        let storage = env.storage();
        init_issue(&storage, "ISSUE-1");
        let file = write_solution_file(&env, "sol.json", TWO_TASKS);
        bind(&storage, "ISSUE-1", None, Some(&file)).unwrap();
        bind(&storage, "ISSUE-1", None, Some(&file)).unwrap();

        bind(&storage, "ISSUE-1", Some("SOL-ISSUE-1-1"), None).unwrap();
        bind(&storage, "ISSUE-1", Some("SOL-ISSUE-1-2"), None).unwrap();
        bind(&storage, "ISSUE-1", Some("SOL-ISSUE-1-2"), None).unwrap();

        let solutions = storage.read_solutions("ISSUE-1").unwrap();
        let bound: Vec<&str> = solutions
            .iter()
            .filter(|s| s.is_bound)
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(bound, vec!["SOL-ISSUE-1-2"]);
        assert!(solutions[0].bound_at.is_none());
    }

    #[test]
    fn test_bind_id_precedence() {
        let env = TestEnv::new();
        let storage = env.storage();
        init_issue(&storage, "ISSUE-1");

        let with_id = write_solution_file(&env, "a.json", r#"{"id":"SOL-FROM-FILE","tasks":[]}"#);
        let err = bind(&storage, "ISSUE-1", Some("SOL-CLI"), Some(&with_id)).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(storage.read_solutions("ISSUE-1").unwrap().is_empty());

        let result = bind(&storage, "ISSUE-1", Some("SOL-FROM-FILE"), Some(&with_id)).unwrap();
        assert_eq!(result.imported.as_deref(), Some("SOL-FROM-FILE"));
        assert_eq!(result.bound.as_deref(), Some("SOL-FROM-FILE"));

        let without_id = write_solution_file(&env, "b.json", r#"{"tasks":[]}"#);
        let result = bind(&storage, "ISSUE-1", Some("SOL-CLI"), Some(&without_id)).unwrap();
        assert_eq!(result.imported.as_deref(), Some("SOL-CLI"));

        let err = bind(&storage, "ISSUE-1", None, Some(&with_id)).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[test]
    fn test_bind_errors_leave_state_untouched() {
        let env = TestEnv::new();
        let storage = env.storage();
        init_issue(&storage, "ISSUE-1");

        let bad = write_solution_file(&env, "bad.json", "{ not json");
        assert!(matches!(
            bind(&storage, "ISSUE-1", None, Some(&bad)),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            bind(&storage, "ISSUE-1", Some("SOL-NOPE"), None),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            bind(&storage, "ISSUE-2", None, None),
            Err(Error::NotFound(_))
        ));
        assert!(storage.read_solutions("ISSUE-1").unwrap().is_empty());
        assert_eq!(storage.get_issue("ISSUE-1").unwrap().status, IssueStatus::Registered);
    }

    #[test]
    fn test_bind_without_arguments_lists() {
        let env = TestEnv::new();
        let storage = env.storage();
        init_issue(&storage, "ISSUE-1");
        let file = write_solution_file(&env, "sol.json", TWO_TASKS);
        bind(&storage, "ISSUE-1", Some("SOL-A"), Some(&file)).unwrap();

        let listed = bind(&storage, "ISSUE-1", None, None).unwrap();
        assert!(listed.imported.is_none() && listed.bound.is_none());
        assert_eq!(listed.solutions.len(), 1);
        assert!(listed.solutions[0].is_bound);
        assert!(listed.to_human().contains("* SOL-A (2 tasks)"));
    }

    #[test]
    fn test_status_overview_counts() {
        let env = TestEnv::new();
        let storage = env.storage();
        init_issue(&storage, "ISSUE-1");
        init_issue(&storage, "ISSUE-2");

        match status(&storage, None).unwrap() {
            StatusResult::Overview {
                total,
                by_status,
                active_queue,
            } => {
                assert_eq!(total, 2);
                assert_eq!(by_status["registered"], 2);
                assert!(active_queue.is_none());
            }
            StatusResult::Issue { .. } => panic!("expected overview"),
        }

        match status(&storage, Some("ISSUE-1")).unwrap() {
            StatusResult::Issue {
                issue, queue_items, ..
            } => {
                assert_eq!(issue.id, "ISSUE-1");
                assert!(queue_items.is_empty());
            }
            StatusResult::Overview { .. } => panic!("expected issue detail"),
        }
    }
}
