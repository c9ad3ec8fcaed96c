//! CLI argument definitions for ccw-issue.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ccw-issue - Issue, solution and execution-queue tracking for agent workflows.
///
/// Register an issue with `init`, attach a plan with `bind`, queue it with
/// `queue add`, then let executors pull work with `next` and report with `done`.
#[derive(Parser, Debug)]
#[command(name = "ccw-issue")]
#[command(author, version, about = "Issue, solution and execution-queue tracking", long_about = None)]
pub struct Cli {
    /// Output JSON instead of human-readable text
    #[arg(long, global = true)]
    pub json: bool,

    /// Use <path> as the project root instead of searching upward for
    /// `.workflow` or `.git`. The path must exist.
    #[arg(short = 'C', long = "root", global = true, env = "CCW_PROJECT_ROOT")]
    pub root: Option<PathBuf>,

    /// Enable debug logging on stderr (overrides CCW_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Register a new issue
    Init {
        /// Issue ID (e.g., ISSUE-42, GH-123)
        issue_id: String,

        /// Short title (defaults to the issue ID)
        #[arg(long)]
        title: Option<String>,

        /// Problem description
        #[arg(long)]
        description: Option<String>,

        /// Priority (1-5, 1 is most urgent)
        #[arg(long)]
        priority: Option<u8>,

        /// Replace an existing issue with the same ID
        #[arg(long)]
        force: bool,
    },

    /// List issues
    List {
        /// Show only this issue
        issue_id: Option<String>,

        /// Filter by status (comma-separated, e.g. planned,queued)
        #[arg(long)]
        status: Option<String>,

        /// Print only issue IDs
        #[arg(long)]
        ids: bool,
    },

    /// Show one issue in detail, or an overview of all issues
    Status {
        issue_id: Option<String>,
    },

    /// Add or update a task on the issue's bound solution
    ///
    /// Without a bound solution, a "Manual tasks" solution is created and bound.
    Task {
        issue_id: String,

        /// Task to update (or create with this ID)
        task_id: Option<String>,

        #[arg(long)]
        title: Option<String>,

        /// Task status (e.g., pending, completed)
        #[arg(long)]
        status: Option<String>,

        #[arg(long)]
        description: Option<String>,
    },

    /// Import a solution, bind one, or list an issue's solutions
    Bind {
        issue_id: String,

        /// Solution to bind
        solution_id: Option<String>,

        /// JSON file with a solution to import
        #[arg(long = "solution", value_name = "PATH")]
        solution_file: Option<PathBuf>,
    },

    /// Update issue fields
    Update {
        issue_id: String,

        /// New status (registered, planning, planned, queued, executing,
        /// completed, failed, paused)
        #[arg(long)]
        status: Option<String>,

        #[arg(long)]
        priority: Option<u8>,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        description: Option<String>,
    },

    /// Execution queue commands (shows the active queue without a subcommand)
    Queue {
        #[command(subcommand)]
        command: Option<QueueCommands>,
    },

    /// Claim the next ready item (or resume the executing one); prints JSON
    Next {
        /// Claim this item instead of selecting one
        item_id: Option<String>,
    },

    /// Show an item's execution payload without claiming it; prints JSON
    Detail {
        item_id: String,

        /// Queue to read (defaults to the active queue)
        #[arg(long)]
        queue: Option<String>,
    },

    /// Mark an item completed, or failed with --fail
    Done {
        item_id: String,

        #[arg(long)]
        fail: bool,

        /// Failure reason
        #[arg(long)]
        reason: Option<String>,

        /// Result document (JSON)
        #[arg(long)]
        result: Option<String>,
    },

    /// Reset failed items back to pending
    Retry {
        /// Only reset this issue's items
        issue_id: Option<String>,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Queue subcommands
#[derive(Subcommand, Debug)]
pub enum QueueCommands {
    /// List all queues
    List,

    /// List all queues, newest first
    History,

    /// Make another queue active
    Switch { queue_id: String },

    /// Queue an issue's bound solution
    Add {
        issue_id: String,

        /// Item IDs this item waits for (repeatable or comma-separated)
        #[arg(long = "depends-on", value_delimiter = ',')]
        depends_on: Vec<String>,

        /// Execution group label
        #[arg(long)]
        group: Option<String>,

        /// Executor (codex, gemini, agent)
        #[arg(long)]
        executor: Option<String>,

        /// Semantic priority between 0 and 1
        #[arg(long = "semantic-priority")]
        semantic_priority: Option<f64>,
    },

    /// Show the dependency graph and parallel batches
    Dag {
        /// Queue to analyze (defaults to the active queue)
        #[arg(long)]
        queue: Option<String>,
    },

    /// Import declared execution groups and conflicts from a plan file
    Plan {
        #[arg(long, value_name = "PATH")]
        file: PathBuf,

        #[arg(long)]
        queue: Option<String>,
    },

    /// Archive a queue (defaults to the active queue)
    Archive { queue_id: Option<String> },

    /// Delete a queue
    Delete { queue_id: String },
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the resolved configuration and where each value came from
    Show,
}
