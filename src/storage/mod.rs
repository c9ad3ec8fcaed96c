//! Storage layer for issue/queue data.
//!
//! Everything lives under `<project-root>/.workflow/issues/`:
//!
//! - `issues.jsonl` - one issue per line
//! - `solutions/{issue-id}.jsonl` - candidate solutions for one issue
//! - `queues/{queue-id}.json` - one pretty-printed queue document per queue
//! - `queues/index.json` - the queue index and active-queue pointer
//! - `.lock` - advisory lock held by mutating commands
//!
//! Every mutation reads the whole collection, modifies it in memory and
//! rewrites the file atomically. Queue writes additionally check the
//! `_metadata.updated_at` token so a lost update is reported instead of
//! silently overwritten.

pub mod jsonl;
pub mod lock;

pub use lock::StorageLock;

use crate::models::{Issue, Queue, QueueIndex, QueueStatus, Solution};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory names that mark a project root.
pub const ROOT_MARKERS: [&str; 2] = [".workflow", ".git"];

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(5000);

/// Walk up from `start` until a directory containing a root marker is found.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        if ROOT_MARKERS.iter().any(|m| current.join(m).exists()) {
            return Some(current);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Storage manager for a single project.
#[derive(Debug, Clone)]
pub struct Storage {
    project_root: PathBuf,
    dir: PathBuf,
    lock_timeout: Duration,
}

impl Storage {
    /// Storage rooted at an explicit project root.
    pub fn at(project_root: &Path) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            dir: project_root.join(".workflow").join("issues"),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Storage for the project containing `start` (falls back to `start`).
    pub fn discover(start: &Path) -> Self {
        let root = find_project_root(start).unwrap_or_else(|| start.to_path_buf());
        Self::at(&root)
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// The `.workflow/issues` directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join("config.kdl")
    }

    fn issues_path(&self) -> PathBuf {
        self.dir.join("issues.jsonl")
    }

    fn solutions_path(&self, issue_id: &str) -> PathBuf {
        self.dir.join("solutions").join(format!("{}.jsonl", issue_id))
    }

    fn queues_dir(&self) -> PathBuf {
        self.dir.join("queues")
    }

    pub fn queue_path(&self, queue_id: &str) -> PathBuf {
        self.queues_dir().join(format!("{}.json", queue_id))
    }

    fn index_path(&self) -> PathBuf {
        self.queues_dir().join("index.json")
    }

    /// Take the exclusive storage lock for a read-modify-write cycle.
    pub fn lock(&self) -> Result<StorageLock> {
        StorageLock::acquire(&self.dir.join(".lock"), self.lock_timeout)
    }

    // === Issues ===

    pub fn read_issues(&self) -> Result<Vec<Issue>> {
        jsonl::read_jsonl(&self.issues_path())
    }

    pub fn write_issues(&self, issues: &[Issue]) -> Result<()> {
        jsonl::write_jsonl(&self.issues_path(), issues)
    }

    pub fn find_issue(&self, issue_id: &str) -> Result<Option<Issue>> {
        Ok(self.read_issues()?.into_iter().find(|i| i.id == issue_id))
    }

    /// Get an issue or fail with `NotFound`.
    pub fn get_issue(&self, issue_id: &str) -> Result<Issue> {
        self.find_issue(issue_id)?
            .ok_or_else(|| Error::NotFound(format!("Issue {}", issue_id)))
    }

    /// Insert `issue`, replacing any existing record with the same id.
    pub fn put_issue(&self, issue: &Issue) -> Result<()> {
        let mut issues = self.read_issues()?;
        match issues.iter_mut().find(|i| i.id == issue.id) {
            Some(existing) => *existing = issue.clone(),
            None => issues.push(issue.clone()),
        }
        self.write_issues(&issues)
    }

    /// Replace several issues in one rewrite. Unknown ids are an error.
    pub fn update_issues(&self, updated: &[Issue]) -> Result<()> {
        if updated.is_empty() {
            return Ok(());
        }
        let mut issues = self.read_issues()?;
        for issue in updated {
            let slot = issues
                .iter_mut()
                .find(|i| i.id == issue.id)
                .ok_or_else(|| Error::NotFound(format!("Issue {}", issue.id)))?;
            *slot = issue.clone();
        }
        self.write_issues(&issues)
    }

    // === Solutions ===

    pub fn read_solutions(&self, issue_id: &str) -> Result<Vec<Solution>> {
        jsonl::read_jsonl(&self.solutions_path(issue_id))
    }

    pub fn write_solutions(&self, issue_id: &str, solutions: &[Solution]) -> Result<()> {
        jsonl::write_jsonl(&self.solutions_path(issue_id), solutions)
    }

    pub fn find_solution(&self, issue_id: &str, solution_id: &str) -> Result<Option<Solution>> {
        Ok(self
            .read_solutions(issue_id)?
            .into_iter()
            .find(|s| s.id == solution_id))
    }

    /// First solution marked bound for the issue.
    pub fn bound_solution(&self, issue_id: &str) -> Result<Option<Solution>> {
        Ok(self
            .read_solutions(issue_id)?
            .into_iter()
            .find(|s| s.is_bound))
    }

    // === Queues ===

    /// Read the queue index. A missing index is empty.
    pub fn read_index(&self) -> Result<QueueIndex> {
        Ok(jsonl::read_json(&self.index_path())?.unwrap_or_default())
    }

    pub fn write_index(&self, index: &QueueIndex) -> Result<()> {
        jsonl::write_json_pretty(&self.index_path(), index)
    }

    pub fn queue_exists(&self, queue_id: &str) -> bool {
        self.queue_path(queue_id).exists()
    }

    /// Load a queue, migrating the legacy `tasks` layout if present.
    pub fn read_queue(&self, queue_id: &str) -> Result<Queue> {
        let path = self.queue_path(queue_id);
        let mut queue: Queue = jsonl::read_json(&path)?
            .ok_or_else(|| Error::NotFound(format!("Queue {}", queue_id)))?;
        if queue.migrate_legacy() {
            tracing::info!(queue = %queue_id, "migrated legacy task-level queue items");
        }
        Ok(queue)
    }

    /// The queue named by the index's active pointer, if any.
    pub fn active_queue(&self) -> Result<Option<Queue>> {
        let index = self.read_index()?;
        match index.active_queue_id {
            Some(id) if self.queue_exists(&id) => self.read_queue(&id).map(Some),
            Some(id) => {
                tracing::warn!(queue = %id, "active queue file is missing");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Resolve an explicit queue id, or fall back to the active queue.
    pub fn resolve_queue(&self, queue_id: Option<&str>) -> Result<Queue> {
        match queue_id {
            Some(id) => self.read_queue(id),
            None => self
                .active_queue()?
                .ok_or_else(|| Error::NotFound("No active queue".to_string())),
        }
    }

    /// Persist `queue` and refresh its index entry.
    ///
    /// Fails with `ConcurrentModification` when the file on disk was written by
    /// someone else since `queue` was loaded.
    pub fn write_queue(&self, queue: &mut Queue) -> Result<()> {
        let path = self.queue_path(&queue.id);
        let on_disk = self.read_stamp(&path)?;
        match on_disk {
            Some(stamp) if stamp != queue.metadata.updated_at => {
                return Err(Error::ConcurrentModification(format!(
                    "Queue {} changed on disk since it was read",
                    queue.id
                )));
            }
            _ => {}
        }

        let mut now = Utc::now();
        if queue.metadata.updated_at == Some(now) {
            now += chrono::Duration::nanoseconds(1);
        }
        queue.refresh_metadata(now);
        jsonl::write_json_pretty(&path, queue)?;

        let mut index = self.read_index()?;
        index.upsert(queue.summary());
        self.write_index(&index)?;

        tracing::debug!(queue = %queue.id, status = %queue.status, items = queue.items.len(), "saved queue");
        Ok(())
    }

    /// `Some(token)` when the queue file exists; the token itself may be `None`
    /// for files written before tokens existed.
    fn read_stamp(&self, path: &Path) -> Result<Option<Option<DateTime<Utc>>>> {
        #[derive(Deserialize)]
        struct Stamp {
            #[serde(rename = "_metadata", default)]
            metadata: StampMetadata,
        }
        #[derive(Deserialize, Default)]
        struct StampMetadata {
            #[serde(default)]
            updated_at: Option<DateTime<Utc>>,
        }

        let stamp: Option<Stamp> = jsonl::read_json(path)?;
        Ok(stamp.map(|s| s.metadata.updated_at))
    }

    /// Remove a queue file. Returns false when it did not exist.
    pub fn delete_queue_file(&self, queue_id: &str) -> Result<bool> {
        match fs::remove_file(self.queue_path(queue_id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Create, persist and activate a new empty queue.
    pub fn create_queue(&self, now: DateTime<Utc>) -> Result<Queue> {
        let mut id = Queue::id_for(now);
        let mut n = 2;
        while self.queue_exists(&id) || self.read_index()?.get(&id).is_some() {
            id = format!("{}-{}", Queue::id_for(now), n);
            n += 1;
        }

        let mut queue = Queue::new(id, now);
        queue.status = QueueStatus::Active;
        self.write_queue(&mut queue)?;

        let mut index = self.read_index()?;
        index.active_queue_id = Some(queue.id.clone());
        self.write_index(&index)?;

        tracing::info!(queue = %queue.id, "created queue");
        Ok(queue)
    }
}

/// Validate an externally supplied issue id.
///
/// Ids name files on disk, so path separators and relative components are
/// rejected.
pub fn validate_issue_id(id: &str) -> Result<()> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput("Issue ID must not be empty".to_string()));
    }
    if trimmed != id {
        return Err(Error::InvalidInput(format!(
            "Issue ID must not have surrounding whitespace: '{}'",
            id
        )));
    }
    if id.contains('/') || id.contains('\\') || id == "." || id == ".." {
        return Err(Error::InvalidInput(format!(
            "Issue ID must not contain path separators: {}",
            id
        )));
    }
    Ok(())
}

/// Generate a solution id in the preferred `SOL-{issue-id}-{seq}` form.
pub fn generate_solution_id(issue_id: &str, existing: &[Solution]) -> String {
    let mut seq = existing.len() + 1;
    loop {
        let candidate = format!("SOL-{}-{}", issue_id, seq);
        if !existing.iter().any(|s| s.id == candidate) {
            return candidate;
        }
        seq += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemStatus, QueueItem};
    use crate::test_utils::TestEnv;

    #[test]
    fn test_find_project_root_prefers_nearest_marker() {
        let env = TestEnv::new();
        let nested = env.path().join("a/b/c");
        fs::create_dir_all(&nested).unwrap();
        fs::create_dir_all(env.path().join("a/.git")).unwrap();

        assert_eq!(find_project_root(&nested), Some(env.path().join("a")));

        fs::create_dir_all(env.path().join("a/b/.workflow")).unwrap();
        assert_eq!(find_project_root(&nested), Some(env.path().join("a/b")));
    }

    #[test]
    fn test_storage_layout() {
        let env = TestEnv::new();
        let storage = env.storage();
        assert_eq!(storage.dir(), env.path().join(".workflow/issues"));
        assert_eq!(
            storage.queue_path("QUE-1"),
            env.path().join(".workflow/issues/queues/QUE-1.json")
        );
    }

    #[test]
    fn test_issue_put_and_get() {
        let env = TestEnv::new();
        let storage = env.storage();

        assert!(storage.read_issues().unwrap().is_empty());
        storage
            .put_issue(&Issue::new("ISSUE-1".to_string(), "First".to_string()))
            .unwrap();
        storage
            .put_issue(&Issue::new("ISSUE-2".to_string(), "Second".to_string()))
            .unwrap();

        let mut issue = storage.get_issue("ISSUE-1").unwrap();
        issue.title = "Renamed".to_string();
        storage.update_issues(&[issue]).unwrap();

        let issues = storage.read_issues().unwrap();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].title, "Renamed");
        assert!(matches!(
            storage.get_issue("ISSUE-9"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_put_issue_keeps_unreadable_records() {
        let env = TestEnv::new();
        let storage = env.storage();
        let bad = r#"{"id":"OLD-1","title":"Legacy","priority":"high"}"#;
        fs::create_dir_all(storage.dir()).unwrap();
        fs::write(storage.dir().join("issues.jsonl"), format!("{}\n", bad)).unwrap();

        storage
            .put_issue(&Issue::new("NEW-1".to_string(), "New".to_string()))
            .unwrap();

        let content = fs::read_to_string(storage.dir().join("issues.jsonl")).unwrap();
        assert!(content.lines().any(|l| l == bad));
        let ids: Vec<String> = storage.read_issues().unwrap().into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec!["NEW-1"]);
    }

    #[test]
    fn test_bound_solution_lookup() {
        let env = TestEnv::new();
        let storage = env.storage();
        let mut a = Solution::new("SOL-A".to_string(), String::new());
        let mut b = Solution::new("SOL-B".to_string(), String::new());
        a.is_bound = false;
        b.is_bound = true;
        storage.write_solutions("ISSUE-1", &[a, b]).unwrap();

        assert_eq!(
            storage.bound_solution("ISSUE-1").unwrap().unwrap().id,
            "SOL-B"
        );
        assert!(storage.bound_solution("ISSUE-2").unwrap().is_none());
        assert!(storage.find_solution("ISSUE-1", "SOL-A").unwrap().is_some());
    }

    #[test]
    fn test_create_queue_activates_and_indexes() {
        let env = TestEnv::new();
        let storage = env.storage();
        let now = Utc::now();

        let first = storage.create_queue(now).unwrap();
        let second = storage.create_queue(now).unwrap();
        assert_ne!(first.id, second.id);
        assert!(second.id.starts_with(&first.id));

        let index = storage.read_index().unwrap();
        assert_eq!(index.queues.len(), 2);
        assert_eq!(index.active_queue_id.as_deref(), Some(second.id.as_str()));
        assert_eq!(storage.active_queue().unwrap().unwrap().id, second.id);
    }

    #[test]
    fn test_write_queue_updates_index_summary() {
        let env = TestEnv::new();
        let storage = env.storage();
        let mut queue = storage.create_queue(Utc::now()).unwrap();

        let mut item = QueueItem::new("S-1".to_string(), "ISSUE-1".to_string(), "SOL-1".to_string());
        item.status = ItemStatus::Completed;
        queue.items.push(item);
        storage.write_queue(&mut queue).unwrap();

        let index = storage.read_index().unwrap();
        let summary = index.get(&queue.id).unwrap();
        assert_eq!(summary.total_items, 1);
        assert_eq!(summary.completed_items, 1);
        assert_eq!(summary.issue_ids, vec!["ISSUE-1"]);

        let reread = storage.read_queue(&queue.id).unwrap();
        assert_eq!(reread.metadata.completed_count, 1);
    }

    #[test]
    fn test_stale_queue_write_is_rejected() {
        let env = TestEnv::new();
        let storage = env.storage();
        let queue = storage.create_queue(Utc::now()).unwrap();

        let mut first = storage.read_queue(&queue.id).unwrap();
        let mut second = storage.read_queue(&queue.id).unwrap();

        first
            .items
            .push(QueueItem::new("S-1".to_string(), "ISSUE-1".to_string(), "SOL-1".to_string()));
        storage.write_queue(&mut first).unwrap();

        second
            .items
            .push(QueueItem::new("S-1".to_string(), "ISSUE-2".to_string(), "SOL-2".to_string()));
        let err = storage.write_queue(&mut second).unwrap_err();
        assert!(matches!(err, Error::ConcurrentModification(_)));

        let on_disk = storage.read_queue(&queue.id).unwrap();
        assert_eq!(on_disk.items[0].issue_id, "ISSUE-1");
    }

    #[test]
    fn test_corrupt_queue_file_is_an_error() {
        let env = TestEnv::new();
        let storage = env.storage();
        let path = storage.queue_path("QUE-BAD");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            storage.read_queue("QUE-BAD"),
            Err(Error::Corrupt { .. })
        ));
        assert!(matches!(
            storage.read_queue("QUE-MISSING"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_queue_file() {
        let env = TestEnv::new();
        let storage = env.storage();
        let queue = storage.create_queue(Utc::now()).unwrap();
        assert!(storage.delete_queue_file(&queue.id).unwrap());
        assert!(!storage.delete_queue_file(&queue.id).unwrap());
    }

    #[test]
    fn test_validate_issue_id() {
        assert!(validate_issue_id("ISSUE-1").is_ok());
        assert!(validate_issue_id("GH-123.fix").is_ok());
        assert!(validate_issue_id("").is_err());
        assert!(validate_issue_id("../escape").is_err());
        assert!(validate_issue_id("a\\b").is_err());
        assert!(validate_issue_id(" padded").is_err());
    }

    #[test]
    fn test_generate_solution_id_avoids_collisions() {
        let existing = vec![
            Solution::new("SOL-ISSUE-1-1".to_string(), String::new()),
            Solution::new("SOL-ISSUE-1-2".to_string(), String::new()),
        ];
        assert_eq!(generate_solution_id("ISSUE-1", &[]), "SOL-ISSUE-1-1");
        assert_eq!(generate_solution_id("ISSUE-1", &existing), "SOL-ISSUE-1-3");

        let mut shifted = existing.clone();
        shifted[1].id = "SOL-ISSUE-1-3".to_string();
        assert_eq!(generate_solution_id("ISSUE-1", &shifted), "SOL-ISSUE-1-4");
    }
}
