//! Precedence resolution for configuration.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Environment variables (`CCW_NOTIFY`, `CCW_NOTIFY_URL`)
//! 2. Project config (`<root>/.workflow/issues/config.kdl`)
//! 3. System config (`~/.config/ccw/config.kdl`)
//! 4. Built-in defaults

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::Result;
use crate::config::schema::{CONFIG_FILE_NAME, IssueConfig};
use crate::models::Executor;
use crate::models::queue::{DEFAULT_GROUP, DEFAULT_SEMANTIC_PRIORITY};
use crate::storage::Storage;

/// Disables notifications when set to `0`, `false`, `no` or `off`.
pub const NOTIFY_ENV: &str = "CCW_NOTIFY";

/// Overrides the notification endpoint.
pub const NOTIFY_URL_ENV: &str = "CCW_NOTIFY_URL";

pub const DEFAULT_NOTIFY_URL: &str = "http://localhost:3456/api/hook";
pub const DEFAULT_NOTIFY_TIMEOUT_MS: u64 = 500;
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    EnvVar(String),
    Project,
    System,
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::EnvVar(name) => write!(f, "env:{}", name),
            ValueSource::Project => write!(f, "project"),
            ValueSource::System => write!(f, "system"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

impl Serialize for ValueSource {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone, Serialize)]
pub struct Resolved<T> {
    pub value: T,
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// Fully resolved configuration with source tracking.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    pub notify: Resolved<bool>,
    pub notify_url: Resolved<String>,
    pub notify_timeout_ms: Resolved<u64>,
    pub default_executor: Resolved<Executor>,
    pub default_group: Resolved<String>,
    pub default_semantic_priority: Resolved<f64>,
    pub lock_timeout_ms: Resolved<u64>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            notify: Resolved::new(true, ValueSource::Default),
            notify_url: Resolved::new(DEFAULT_NOTIFY_URL.to_string(), ValueSource::Default),
            notify_timeout_ms: Resolved::new(DEFAULT_NOTIFY_TIMEOUT_MS, ValueSource::Default),
            default_executor: Resolved::new(Executor::default(), ValueSource::Default),
            default_group: Resolved::new(DEFAULT_GROUP.to_string(), ValueSource::Default),
            default_semantic_priority: Resolved::new(
                DEFAULT_SEMANTIC_PRIORITY,
                ValueSource::Default,
            ),
            lock_timeout_ms: Resolved::new(DEFAULT_LOCK_TIMEOUT_MS, ValueSource::Default),
        }
    }
}

impl ResolvedConfig {
    pub fn notify_enabled(&self) -> bool {
        self.notify.value
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.notify_timeout_ms.value)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms.value)
    }

    /// Layer one file's settings over what has been resolved so far.
    fn apply(&mut self, config: &IssueConfig, source: ValueSource) {
        if let Some(v) = config.notify {
            self.notify = Resolved::new(v, source.clone());
        }
        if let Some(ref v) = config.notify_url {
            self.notify_url = Resolved::new(v.clone(), source.clone());
        }
        if let Some(v) = config.notify_timeout_ms {
            self.notify_timeout_ms = Resolved::new(v, source.clone());
        }
        if let Some(v) = config.default_executor {
            self.default_executor = Resolved::new(v, source.clone());
        }
        if let Some(ref v) = config.default_group {
            self.default_group = Resolved::new(v.clone(), source.clone());
        }
        if let Some(v) = config.default_semantic_priority {
            self.default_semantic_priority = Resolved::new(v, source.clone());
        }
        if let Some(v) = config.lock_timeout_ms {
            self.lock_timeout_ms = Resolved::new(v, source);
        }
    }
}

/// Path of the system-level config file, if a config directory exists.
pub fn system_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("ccw").join(CONFIG_FILE_NAME))
}

/// Resolve configuration for `storage` from the real environment.
pub fn resolve_config(storage: &Storage) -> Result<ResolvedConfig> {
    resolve_config_with(
        system_config_path().as_deref(),
        &storage.config_path(),
        |name| std::env::var(name).ok(),
    )
}

/// Resolve configuration from explicit sources.
///
/// `env` looks up an environment variable by name.
pub fn resolve_config_with<F>(
    system_path: Option<&Path>,
    project_path: &Path,
    env: F,
) -> Result<ResolvedConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = ResolvedConfig::default();

    if let Some(path) = system_path {
        result.apply(&IssueConfig::load(path)?, ValueSource::System);
    }
    result.apply(&IssueConfig::load(project_path)?, ValueSource::Project);

    if let Some(raw) = env(NOTIFY_ENV) {
        match parse_flag(&raw) {
            Some(v) => result.notify = Resolved::new(v, ValueSource::EnvVar(NOTIFY_ENV.to_string())),
            None => tracing::warn!(value = %raw, "ignoring unrecognized {}", NOTIFY_ENV),
        }
    }
    if let Some(url) = env(NOTIFY_URL_ENV).filter(|u| !u.trim().is_empty()) {
        result.notify_url = Resolved::new(url, ValueSource::EnvVar(NOTIFY_URL_ENV.to_string()));
    }

    Ok(result)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
