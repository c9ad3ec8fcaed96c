//! KDL schema for `config.kdl`.
//!
//! # KDL Schema
//!
//! ```kdl
//! // Dashboard notifications
//! notify #true
//! notify-url "http://localhost:3456/api/hook"
//! notify-timeout-ms 500
//!
//! // Defaults for `queue add`
//! default-executor "codex"
//! default-group "P1"
//! default-semantic-priority 0.5
//!
//! lock-timeout-ms 5000
//! ```
//!
//! Unknown nodes are ignored. A value of the wrong type is a validation error.

use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::Path;

use crate::models::Executor;
use crate::{Error, Result};

/// File name used at both the project and system level.
pub const CONFIG_FILE_NAME: &str = "config.kdl";

/// Settings as written in one `config.kdl`. Every field is optional; unset
/// values fall through to the next source.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IssueConfig {
    pub notify: Option<bool>,
    pub notify_url: Option<String>,
    pub notify_timeout_ms: Option<u64>,
    pub default_executor: Option<Executor>,
    pub default_group: Option<String>,
    pub default_semantic_priority: Option<f64>,
    pub lock_timeout_ms: Option<u64>,
}

impl IssueConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `path`. A missing file is an empty config.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(Error::Io(e)),
        };
        let doc: KdlDocument = content.parse().map_err(|e: kdl::KdlError| Error::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let config = Self::from_kdl(&doc).map_err(|reason| Error::Corrupt {
            path: path.to_path_buf(),
            reason,
        })?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Parse from a KDL document.
    pub fn from_kdl(doc: &KdlDocument) -> std::result::Result<Self, String> {
        let mut config = Self::new();

        config.notify = first_value(doc, "notify")
            .map(|v| v.as_bool().ok_or("notify must be #true or #false"))
            .transpose()?;

        config.notify_url = string_value(doc, "notify-url")?;
        config.notify_timeout_ms = millis_value(doc, "notify-timeout-ms")?;
        config.lock_timeout_ms = millis_value(doc, "lock-timeout-ms")?;

        config.default_executor = string_value(doc, "default-executor")?
            .map(|s| Executor::parse(&s).map_err(|e| e.to_string()))
            .transpose()?;

        config.default_group = string_value(doc, "default-group")?;

        config.default_semantic_priority = first_value(doc, "default-semantic-priority")
            .map(|v| {
                v.as_float()
                    .or_else(|| v.as_integer().map(|i| i as f64))
                    .ok_or_else(|| "default-semantic-priority must be a number".to_string())
            })
            .transpose()?;

        config.validate()?;
        Ok(config)
    }

    /// Convert to a KDL document, emitting only the values that are set.
    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();
        let mut push = |name: &str, value: KdlValue| {
            let mut node = KdlNode::new(name);
            node.push(KdlEntry::new(value));
            doc.nodes_mut().push(node);
        };

        if let Some(notify) = self.notify {
            push("notify", KdlValue::Bool(notify));
        }
        if let Some(ref url) = self.notify_url {
            push("notify-url", KdlValue::String(url.clone()));
        }
        if let Some(ms) = self.notify_timeout_ms {
            push("notify-timeout-ms", KdlValue::Integer(ms as i128));
        }
        if let Some(executor) = self.default_executor {
            push("default-executor", KdlValue::String(executor.as_str().to_string()));
        }
        if let Some(ref group) = self.default_group {
            push("default-group", KdlValue::String(group.clone()));
        }
        if let Some(priority) = self.default_semantic_priority {
            push("default-semantic-priority", KdlValue::Float(priority));
        }
        if let Some(ms) = self.lock_timeout_ms {
            push("lock-timeout-ms", KdlValue::Integer(ms as i128));
        }

        doc
    }

    /// Write to `path` in KDL form.
    pub fn save(&self, path: &Path) -> Result<()> {
        crate::storage::jsonl::atomic_write(path, self.to_kdl().to_string().as_bytes())
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(p) = self.default_semantic_priority {
            if !(0.0..=1.0).contains(&p) {
                return Err(format!(
                    "default-semantic-priority must be between 0 and 1, got {}",
                    p
                ));
            }
        }
        if let Some(ref group) = self.default_group {
            if group.trim().is_empty() {
                return Err("default-group must not be empty".to_string());
            }
        }
        Ok(())
    }
}

fn first_value<'a>(doc: &'a KdlDocument, name: &str) -> Option<&'a KdlValue> {
    doc.get(name)
        .and_then(|node| node.entries().first())
        .map(|entry| entry.value())
}

fn string_value(doc: &KdlDocument, name: &str) -> std::result::Result<Option<String>, String> {
    first_value(doc, name)
        .map(|v| {
            v.as_string()
                .map(str::to_string)
                .ok_or_else(|| format!("{} must be a string", name))
        })
        .transpose()
}

fn millis_value(doc: &KdlDocument, name: &str) -> std::result::Result<Option<u64>, String> {
    first_value(doc, name)
        .map(|v| {
            v.as_integer()
                .and_then(|i| u64::try_from(i).ok())
                .ok_or_else(|| format!("{} must be a non-negative integer", name))
        })
        .transpose()
}
