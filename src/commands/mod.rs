//! Command implementations for the ccw-issue CLI.
//!
//! This module contains the business logic for each CLI command.
//! Commands are organized by entity type:
//! - `issue` - init, update, list, status, bind
//! - `solution` - manual task editing on the bound solution
//! - `queue` - queue lifecycle, planning and the dependency graph
//! - `dispatch` - next, detail, done, retry
//!
//! Every command takes a [`Storage`] and returns a result type implementing
//! [`Output`]. Mutating commands hold the storage lock for their whole
//! read-modify-write cycle and validate their input before the first write.

pub mod dispatch;
pub mod issue;
pub mod queue;
pub mod solution;

pub use dispatch::{
    DoneOptions, DoneResult, ExecutionPayload, NextResult, RetryResult, detail, done, next, retry,
};
pub use issue::{
    BindResult, InitOptions, IssueList, IssueResult, SolutionSummary, StatusResult,
    UpdateOptions, bind, init, list, status, update,
};
pub use queue::{
    AddOptions, QueueAddResult, QueueArchiveResult, QueueDefaults, QueueDeleteResult,
    QueueListResult, QueuePlanResult, QueueShowResult, QueueSwitchResult, queue_add,
    queue_archive, queue_dag, queue_delete, queue_history, queue_list, queue_plan, queue_show,
    queue_switch,
};
pub use solution::{TaskOptions, TaskResult, task};

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{self, ResolvedConfig};
use crate::storage::Storage;
use crate::{Error, Result};

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    fn to_json(&self) -> String;

    fn to_human(&self) -> String;
}

/// Serialize a command result, falling back to an error object.
pub(crate) fn json_string<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string())
}

/// Read and parse an agent-supplied JSON document.
pub(crate) fn read_json_file<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|e| {
        Error::InvalidInput(format!("Cannot read {} file {}: {}", what, path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::InvalidInput(format!("Invalid {} JSON in {}: {}", what, path.display(), e))
    })
}

// === Config ===

#[derive(Debug, Serialize)]
pub struct ConfigShowResult {
    pub project_root: PathBuf,
    pub project_config: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_config: Option<PathBuf>,
    pub config: ResolvedConfig,
}

impl Output for ConfigShowResult {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        let c = &self.config;
        let mut lines = vec![
            format!("Project root: {}", self.project_root.display()),
            format!("Project config: {}", self.project_config.display()),
        ];
        if let Some(ref path) = self.system_config {
            lines.push(format!("System config: {}", path.display()));
        }
        lines.push(String::new());
        let rows = [
            ("notify", c.notify.value.to_string(), &c.notify.source),
            ("notify-url", c.notify_url.value.clone(), &c.notify_url.source),
            (
                "notify-timeout-ms",
                c.notify_timeout_ms.value.to_string(),
                &c.notify_timeout_ms.source,
            ),
            (
                "default-executor",
                c.default_executor.value.to_string(),
                &c.default_executor.source,
            ),
            ("default-group", c.default_group.value.clone(), &c.default_group.source),
            (
                "default-semantic-priority",
                c.default_semantic_priority.value.to_string(),
                &c.default_semantic_priority.source,
            ),
            (
                "lock-timeout-ms",
                c.lock_timeout_ms.value.to_string(),
                &c.lock_timeout_ms.source,
            ),
        ];
        for (key, value, source) in rows {
            lines.push(format!("  {:<26} {} ({})", key, value, source));
        }
        lines.join("\n")
    }
}

/// Show the resolved configuration and where each value came from.
pub fn config_show(storage: &Storage, config: &ResolvedConfig) -> Result<ConfigShowResult> {
    Ok(ConfigShowResult {
        project_root: storage.project_root().to_path_buf(),
        project_config: storage.config_path(),
        system_config: config::system_config_path(),
        config: config.clone(),
    })
}
