//! ccw-issue - Issue, solution and execution-queue tracking for agent workflows.
//!
//! This library provides the core functionality for the `ccw-issue` CLI tool:
//! durable issue/solution/queue storage under `.workflow/issues/`, the
//! dependency-aware batch scheduler, and the execution dispatch state machine.

pub mod cli;
pub mod commands;
pub mod config;
pub mod logging;
pub mod models;
pub mod notify;
pub mod scheduler;
pub mod storage;

use std::path::PathBuf;


/// Library-level error type for issue/queue operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Corrupt file {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    #[error("Timed out waiting for lock on {}", .0.display())]
    LockTimeout(PathBuf),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for issue/queue operations.
pub type Result<T> = std::result::Result<T, Error>;
