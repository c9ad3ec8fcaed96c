//! Tracing subscriber setup.
//!
//! Logs go to stderr; stdout carries command output only.

use tracing_subscriber::{EnvFilter, fmt};

/// Filter directive source.
pub const LOG_ENV: &str = "CCW_LOG";

const DEFAULT_DIRECTIVE: &str = "warn";
const VERBOSE_DIRECTIVE: &str = "debug";

/// Pick the filter directive: `--verbose` wins, then `CCW_LOG`, then the default.
pub fn directive(verbose: bool, env_value: Option<&str>) -> String {
    if verbose {
        return VERBOSE_DIRECTIVE.to_string();
    }
    match env_value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => DEFAULT_DIRECTIVE.to_string(),
    }
}

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init(verbose: bool) {
    let env_value = std::env::var(LOG_ENV).ok();
    let filter = EnvFilter::try_new(directive(verbose, env_value.as_deref()))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive_precedence() {
        assert_eq!(directive(false, None), "warn");
        assert_eq!(directive(false, Some("  ")), "warn");
        assert_eq!(directive(false, Some("ccw_issue=trace")), "ccw_issue=trace");
        assert_eq!(directive(true, Some("error")), "debug");
    }
}
