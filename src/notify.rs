//! Best-effort dashboard notifications.
//!
//! Write-path commands post a small event to a local dashboard endpoint so
//! that a running UI can refresh. Delivery never affects the command outcome:
//! every failure is logged at `debug` and dropped.

use chrono::Utc;
use serde::Serialize;
use std::time::Duration;

use crate::config::ResolvedConfig;

const USER_AGENT: &str = concat!("ccw-issue/", env!("CARGO_PKG_VERSION"));

/// Event body posted to the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: serde_json::Value,
    pub timestamp: String,
}

impl Notification {
    /// Event for a finished issue command, e.g. `ISSUE_QUEUE_ADD`.
    pub fn for_command(command: &str, payload: serde_json::Value) -> Self {
        let kind = format!(
            "ISSUE_{}",
            command.to_uppercase().replace([' ', '-'], "_")
        );
        Self {
            kind,
            payload,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Notifier {
    url: String,
    timeout: Duration,
    enabled: bool,
}

impl Notifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
            enabled: true,
        }
    }

    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self {
            url: config.notify_url.value.clone(),
            timeout: config.notify_timeout(),
            enabled: config.notify_enabled(),
        }
    }

    pub fn disabled() -> Self {
        Self {
            url: String::new(),
            timeout: Duration::ZERO,
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Post `notification`. Returns whether the dashboard accepted it.
    pub fn send(&self, notification: &Notification) -> bool {
        if !self.enabled {
            return false;
        }
        let response = ureq::post(&self.url)
            .timeout(self.timeout)
            .set("User-Agent", USER_AGENT)
            .send_json(notification);

        match response {
            Ok(_) => {
                tracing::debug!(kind = %notification.kind, "dashboard notified");
                true
            }
            Err(ureq::Error::Status(code, _)) => {
                tracing::debug!(kind = %notification.kind, code, "dashboard rejected notification");
                false
            }
            Err(e) => {
                tracing::debug!(kind = %notification.kind, error = %e, "dashboard unreachable");
                false
            }
        }
    }
}
