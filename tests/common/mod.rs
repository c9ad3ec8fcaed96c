//! Common test utilities for ccw-issue integration tests.
//!
//! Provides `TestEnv`, an isolated project directory that every command runs
//! against via `CCW_PROJECT_ROOT`.

#![allow(dead_code)]

use assert_cmd::Command;
use serde_json::Value;
use std::path::{Path, PathBuf};
pub use tempfile::TempDir;

/// A test environment with its own project root.
///
/// The `ccw()` method returns a `Command` that sets the project root
/// per-invocation and disables dashboard notifications, making tests
/// parallel-safe.
pub struct TestEnv {
    pub project_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            project_dir: TempDir::new().unwrap(),
        }
    }

    /// Get a Command for the ccw-issue binary rooted at this project.
    pub fn ccw(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_ccw-issue"));
        cmd.current_dir(self.project_dir.path());
        cmd.env("CCW_PROJECT_ROOT", self.project_dir.path());
        cmd.env("CCW_NOTIFY", "0");
        cmd.env_remove("CCW_NOTIFY_URL");
        cmd.env_remove("CCW_LOG");
        cmd
    }

    pub fn path(&self) -> &Path {
        self.project_dir.path()
    }

    /// Directory holding issues, solutions and queues.
    pub fn issues_dir(&self) -> PathBuf {
        self.path().join(".workflow").join("issues")
    }

    /// Run a command with `--json` and parse its stdout, asserting success.
    pub fn json(&self, args: &[&str]) -> Value {
        let output = self.ccw().arg("--json").args(args).output().unwrap();
        assert!(
            output.status.success(),
            "command {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).unwrap()
    }

    /// Write `value` as a JSON file in the project directory and return its path.
    pub fn write_json(&self, name: &str, value: &Value) -> PathBuf {
        let path = self.path().join(name);
        std::fs::write(&path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
        path
    }

    /// Register an issue and import+bind a solution touching `files`.
    pub fn planned_issue(&self, issue_id: &str, files: &[&str]) -> String {
        self.ccw()
            .args(["init", issue_id, "--title", issue_id])
            .assert()
            .success();

        let points: Vec<Value> = files
            .iter()
            .map(|f| serde_json::json!({ "file": f, "target": "main", "change": "edit" }))
            .collect();
        let solution = serde_json::json!({
            "description": format!("Fix {}", issue_id),
            "tasks": [{ "id": "T1", "title": "Implement", "modification_points": points }]
        });
        let file = self.write_json(&format!("{}-solution.json", issue_id), &solution);

        let solution_id = format!("SOL-{}-1", issue_id);
        let bound = self.json(&[
            "bind",
            issue_id,
            &solution_id,
            "--solution",
            file.to_str().unwrap(),
        ]);
        assert_eq!(bound["bound"], solution_id.as_str());
        solution_id
    }

    /// Queue an issue's bound solution and return the new item id.
    pub fn enqueue(&self, issue_id: &str, extra: &[&str]) -> String {
        let mut args = vec!["queue", "add", issue_id];
        args.extend_from_slice(extra);
        let added = self.json(&args);
        added["item"]["item_id"].as_str().unwrap().to_string()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
