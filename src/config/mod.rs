//! Configuration for ccw-issue.
//!
//! Settings live in `config.kdl` at two levels:
//!
//! - System: `~/.config/ccw/config.kdl`
//! - Project: `<root>/.workflow/issues/config.kdl`
//!
//! Contains:
//! - `notify`, `notify-url`, `notify-timeout-ms` - dashboard notifications
//! - `default-executor`, `default-group`, `default-semantic-priority` - `queue add` defaults
//! - `lock-timeout-ms` - how long a mutating command waits for the storage lock
//!
//! Use the [`resolver`] module for precedence resolution.

pub mod resolver;
pub mod schema;

pub use resolver::{
    DEFAULT_LOCK_TIMEOUT_MS, DEFAULT_NOTIFY_TIMEOUT_MS, DEFAULT_NOTIFY_URL, NOTIFY_ENV,
    NOTIFY_URL_ENV, Resolved, ResolvedConfig, ValueSource, resolve_config, resolve_config_with,
    system_config_path,
};
pub use schema::{CONFIG_FILE_NAME, IssueConfig};
