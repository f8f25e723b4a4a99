//! Hook configuration loading.
//!
//! Reads `<project>/.claude/log-lightweight.config.json`. Every recognised key
//! is merged over its default only when it is present and has the expected
//! JSON type, so one bad value never discards the rest of the file. A missing
//! or unparsable file yields the defaults.

use fs_err as fs;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::env;
use std::path::Path;

/// Tools that produce timeline entries unless the config overrides the list.
/// Read-only exploration tools (Read, Grep, Glob, WebFetch, Bash) are left out.
pub const DEFAULT_TOOLS_TO_LOG: &[&str] = &[
    "Edit",
    "MultiEdit",
    "Write",
    "NotebookEdit",
    "Skill",
    "Task",
    "AskUserQuestion",
];

/// Context window size used for the context percentages.
pub const DEFAULT_CONTEXT_LIMIT: i64 = 200_000;

/// Setting this variable to any non-empty value enables performance tracking.
pub const PERF_ENV: &str = "HOOK_PERF";

/// Cost thresholds in USD. Zero disables a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CostAlert {
    pub warning: f64,
    pub critical: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Warning,
    Critical,
}

impl CostAlert {
    /// Highest threshold reached by `cost`, if any.
    pub fn level(&self, cost: f64) -> Option<AlertLevel> {
        if self.critical > 0.0 && cost >= self.critical {
            Some(AlertLevel::Critical)
        } else if self.warning > 0.0 && cost >= self.warning {
            Some(AlertLevel::Warning)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HookConfig {
    pub enabled: bool,
    pub cost_alert: CostAlert,
    /// Maximum captured response length in characters. Zero means unlimited.
    pub response_max_length: usize,
    pub context_limit: i64,
    pub tools_to_log: HashSet<String>,
    pub performance_tracking: bool,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cost_alert: CostAlert::default(),
            response_max_length: 0,
            context_limit: DEFAULT_CONTEXT_LIMIT,
            tools_to_log: DEFAULT_TOOLS_TO_LOG.iter().map(|t| t.to_string()).collect(),
            performance_tracking: false,
        }
    }
}

impl HookConfig {
    /// Loads the config file, returning defaults if it is missing or malformed.
    pub fn load(path: &Path) -> Self {
        let parsed = fs::read_to_string(path)
            .ok()
            .and_then(|content| serde_json::from_str::<Value>(&content).ok());

        match parsed {
            Some(Value::Object(user)) => Self::default().merged_with(&user),
            Some(_) => {
                tracing::debug!(path = %path.display(), "Config is not a JSON object, using defaults");
                Self::default()
            }
            None => Self::default(),
        }
    }

    fn merged_with(mut self, user: &Map<String, Value>) -> Self {
        if let Some(enabled) = user.get("enabled").and_then(Value::as_bool) {
            self.enabled = enabled;
        }
        if let Some(Value::Object(alert)) = user.get("cost_alert") {
            if let Some(warning) = alert.get("warning").and_then(Value::as_f64) {
                self.cost_alert.warning = warning;
            }
            if let Some(critical) = alert.get("critical").and_then(Value::as_f64) {
                self.cost_alert.critical = critical;
            }
        }
        if let Some(max_length) = user.get("response_max_length").and_then(Value::as_i64) {
            self.response_max_length = usize::try_from(max_length).unwrap_or(0);
        }
        if let Some(limit) = user.get("context_limit").and_then(Value::as_i64) {
            self.context_limit = limit;
        }
        if let Some(Value::Array(tools)) = user.get("tools_to_log") {
            self.tools_to_log = tools
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
        }
        if let Some(tracking) = user.get("performance_tracking").and_then(Value::as_bool) {
            self.performance_tracking = tracking;
        }
        self
    }

    pub fn logs_tool(&self, tool_name: &str) -> bool {
        self.tools_to_log.contains(tool_name)
    }

    /// Performance tracking is on via config or the `HOOK_PERF` variable.
    pub fn tracks_performance(&self) -> bool {
        self.performance_tracking || env::var(PERF_ENV).map(|v| !v.is_empty()).unwrap_or(false)
    }
}
