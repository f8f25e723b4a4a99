//! Session snapshot: the externally consumed log document.
//!
//! One pretty-printed JSON file per session, named from the session's local
//! start time and transcript id (`2026-01-20-1858-4f3bdd8d.log`). Every write
//! overwrites the same file; a resumed session has a new start time and so
//! gets a new file. A static `_schema.json` describing the fields is written
//! next to the snapshots the first time one is produced.

use chrono::NaiveDateTime;
use fs_err as fs;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;

use crate::config::{AlertLevel, HookConfig};
use crate::error::{LogError, Result};
use crate::paths::{session_fragment, LogPaths};
use crate::state::{SessionState, TimelineEntry, TokenUsage};
use crate::transcript::TranscriptReader;

/// USD per million tokens.
pub const PRICE_INPUT: f64 = 3.00;
pub const PRICE_OUTPUT: f64 = 15.00;
pub const PRICE_CACHE_READ: f64 = 0.30;
pub const PRICE_CACHE_CREATION: f64 = 3.75;

/// Where the snapshot's token figures come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotMode {
    /// Use the counts accumulated in state.
    Cached,
    /// Recount the transcript from session start and store the result in state.
    Rescan,
}

/// Estimated cost in USD, rounded to four decimal places.
pub fn calculate_cost(tokens: &TokenUsage) -> f64 {
    let cost = (tokens.input as f64 * PRICE_INPUT
        + tokens.output as f64 * PRICE_OUTPUT
        + tokens.cache_read as f64 * PRICE_CACHE_READ
        + tokens.cache_creation as f64 * PRICE_CACHE_CREATION)
        / 1_000_000.0;
    (cost * 10_000.0).round() / 10_000.0
}

/// Used/remaining context as percentages. A non-positive limit reports
/// `0%` used and `100%` remaining.
pub fn context_percentages(context_tokens: u64, context_limit: i64) -> (String, String) {
    if context_limit <= 0 {
        return ("0%".to_string(), "100%".to_string());
    }
    let limit = context_limit as f64;
    let used = context_tokens as f64 / limit * 100.0;
    let remaining = (limit - context_tokens as f64) / limit * 100.0;
    (format!("{:.1}%", used), format!("{:.1}%", remaining))
}

/// Whole seconds from `start` to `end`, truncated toward zero.
pub fn duration_secs(start: NaiveDateTime, end: NaiveDateTime) -> i64 {
    end.signed_duration_since(start).num_seconds()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub model: Option<String>,
    pub duration_sec: i64,
    pub cost_estimate: f64,
    pub tokens: TokenUsage,
    pub context_tokens: u64,
    pub context_limit: i64,
    pub context_used: String,
    pub context_remaining: String,
    pub files_modified: Vec<String>,
    pub error_count: u64,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub transcript_path: String,
    pub timeline: Vec<TimelineEntry>,
}

impl SessionSnapshot {
    pub fn from_state(state: &SessionState, config: &HookConfig, now: NaiveDateTime) -> Self {
        let (context_used, context_remaining) =
            context_percentages(state.context_tokens, config.context_limit);

        Self {
            model: state.model.clone(),
            duration_sec: duration_secs(state.start_time, now),
            cost_estimate: calculate_cost(&state.tokens),
            tokens: state.tokens,
            context_tokens: state.context_tokens,
            context_limit: config.context_limit,
            context_used,
            context_remaining,
            files_modified: state.files_modified.clone(),
            error_count: state.error_count,
            start_time: state.start_time,
            end_time: now,
            transcript_path: state.transcript_path.clone(),
            timeline: state.timeline.clone(),
        }
    }
}

pub struct SnapshotWriter {
    paths: LogPaths,
}

impl SnapshotWriter {
    pub fn new(paths: LogPaths) -> Self {
        Self { paths }
    }

    /// Snapshot file for `state`. Stable for the lifetime of a session.
    pub fn snapshot_path(&self, state: &SessionState) -> PathBuf {
        let date = state.start_time.format("%Y-%m-%d").to_string();
        let time = state.start_time.format("%H%M").to_string();
        self.paths
            .snapshot_file(&date, &time, &session_fragment(&state.transcript_path))
    }

    /// Materializes `state` as its session snapshot.
    ///
    /// In [`SnapshotMode::Rescan`] the transcript is recounted first and the
    /// fresh totals are stored back into `state`.
    pub fn write(
        &self,
        state: &mut SessionState,
        config: &HookConfig,
        mode: SnapshotMode,
        reader: &dyn TranscriptReader,
        now: NaiveDateTime,
    ) -> Result<PathBuf> {
        if mode == SnapshotMode::Rescan {
            let info = reader.session_info(&state.transcript_path, state.start_time);
            state.tokens = info.tokens;
            state.context_tokens = info.context_tokens;
            if let Some(model) = info.model {
                state.model = Some(model);
            }
        }

        let snapshot = SessionSnapshot::from_state(state, config, now);
        self.warn_on_cost(config, snapshot.cost_estimate);

        let log_dir = self.paths.log_dir();
        fs::create_dir_all(&log_dir).map_err(|e| LogError::io("create log directory", e))?;
        self.ensure_schema_file()?;

        let path = self.snapshot_path(state);
        let content = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| LogError::json("serialize snapshot", e))?;
        fs::write(&path, content).map_err(|e| LogError::io("write snapshot", e))?;

        tracing::debug!(path = %path.display(), mode = ?mode, "Snapshot written");
        Ok(path)
    }

    /// Writes `_schema.json` unless it already exists.
    pub fn ensure_schema_file(&self) -> Result<()> {
        let path = self.paths.schema_file();
        if path.exists() {
            return Ok(());
        }
        let content = serde_json::to_string_pretty(&schema())
            .map_err(|e| LogError::json("serialize schema", e))?;
        fs::write(&path, content).map_err(|e| LogError::io("write schema file", e))
    }

    fn warn_on_cost(&self, config: &HookConfig, cost: f64) {
        match config.cost_alert.level(cost) {
            Some(AlertLevel::Critical) => tracing::warn!(
                cost,
                threshold = config.cost_alert.critical,
                "Session cost reached critical threshold"
            ),
            Some(AlertLevel::Warning) => tracing::warn!(
                cost,
                threshold = config.cost_alert.warning,
                "Session cost reached warning threshold"
            ),
            None => {}
        }
    }
}

/// Field descriptions for snapshot consumers.
pub fn schema() -> Value {
    json!({
        "_type": "schema",
        "_description": "Lightweight log for Claude Code sessions",
        "fields": {
            "start_time": "Session start time (local ISO-8601)",
            "transcript_path": "Full transcript path, for looking up details",
            "timeline": "All events in chronological order, each with ts/type and type-specific data",
            "timeline_types": {
                "prompt": "User prompt (content)",
                "response": "Assistant reply (content, optionally truncated)",
                "tool": "Tool use (tool/input/output)",
                "subagent": "Subagent finished (subagent_type/duration_sec/success)",
                "permission_request": "Permission request (tool/input)"
            },
            "tokens": {
                "input": "Fresh input tokens (1x price)",
                "output": "Output tokens",
                "cache_read": "Tokens read from cache (0.1x price)",
                "cache_creation": "Tokens written to cache (1.25x price)"
            },
            "context_tokens": "Context size of the latest API call (input + cache_read)",
            "context_limit": "Context window limit (default 200K)",
            "context_used": "Percentage of context used",
            "context_remaining": "Percentage of context remaining",
            "model": "Model in use",
            "duration_sec": "Session duration in seconds",
            "cost_estimate": "Estimated cost (USD)",
            "files_modified": "Modified file names (from Edit/MultiEdit/Write)",
            "error_count": "Number of failed tool invocations",
            "end_time": "Time of this snapshot (local ISO-8601)"
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::{IncrementalUsage, SessionInfo};
    use chrono::NaiveDate;
    use std::cell::Cell;
    use tempfile::tempdir;

    struct FixedInfo {
        info: SessionInfo,
        calls: Cell<u32>,
    }

    impl TranscriptReader for FixedInfo {
        fn latest_response(&self, _: &str, _: usize) -> Option<String> {
            None
        }

        fn incremental_usage(&self, _: &str, watermark: &str) -> IncrementalUsage {
            IncrementalUsage {
                last_timestamp: watermark.to_string(),
                ..Default::default()
            }
        }

        fn session_info(&self, _: &str, _: NaiveDateTime) -> SessionInfo {
            self.calls.set(self.calls.get() + 1);
            self.info.clone()
        }
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 20)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn state() -> SessionState {
        SessionState::new(
            at(18, 58, 0),
            "s",
            "/t/4f3bdd8d-e816-490f.jsonl",
            "/p",
            "",
        )
    }

    #[test]
    fn test_cost_uses_per_million_pricing() {
        let tokens = TokenUsage {
            input: 1_000_000,
            output: 1_000_000,
            cache_read: 1_000_000,
            cache_creation: 1_000_000,
        };
        assert_eq!(calculate_cost(&tokens), 22.05);

        let small = TokenUsage {
            input: 1234,
            output: 567,
            cache_read: 89_000,
            cache_creation: 4_000,
        };
        // 0.003702 + 0.008505 + 0.0267 + 0.015 = 0.053907
        assert_eq!(calculate_cost(&small), 0.0539);
        assert_eq!(calculate_cost(&TokenUsage::default()), 0.0);
    }

    #[test]
    fn test_context_percentages() {
        assert_eq!(
            context_percentages(50_000, 200_000),
            ("25.0%".to_string(), "75.0%".to_string())
        );
        assert_eq!(
            context_percentages(50_000, 0),
            ("0%".to_string(), "100%".to_string())
        );
        assert_eq!(
            context_percentages(1, -5),
            ("0%".to_string(), "100%".to_string())
        );
    }

    #[test]
    fn test_duration_truncates() {
        assert_eq!(duration_secs(at(10, 0, 0), at(10, 1, 30)), 90);
    }

    #[test]
    fn test_snapshot_file_name_and_overwrite() {
        let temp = tempdir().unwrap();
        let writer = SnapshotWriter::new(LogPaths::new(temp.path()));
        let reader = FixedInfo {
            info: SessionInfo::default(),
            calls: Cell::new(0),
        };
        let mut state = state();
        let config = HookConfig::default();

        let first = writer
            .write(&mut state, &config, SnapshotMode::Cached, &reader, at(19, 0, 0))
            .unwrap();
        state.error_count = 3;
        let second = writer
            .write(&mut state, &config, SnapshotMode::Cached, &reader, at(19, 5, 0))
            .unwrap();

        assert_eq!(first, second);
        assert!(first.ends_with("2026-01-20-1858-4f3bdd8d.log"));
        let written: Value = serde_json::from_str(&std::fs::read_to_string(&first).unwrap()).unwrap();
        assert_eq!(written["error_count"], 3);
        assert_eq!(written["duration_sec"], 420);
        assert_eq!(written["start_time"], "2026-01-20T18:58:00");
        assert_eq!(reader.calls.get(), 0);
    }

    #[test]
    fn test_schema_written_once() {
        let temp = tempdir().unwrap();
        let paths = LogPaths::new(temp.path());
        let writer = SnapshotWriter::new(paths.clone());
        let reader = FixedInfo {
            info: SessionInfo::default(),
            calls: Cell::new(0),
        };

        writer
            .write(&mut state(), &HookConfig::default(), SnapshotMode::Cached, &reader, at(19, 0, 0))
            .unwrap();
        std::fs::write(paths.schema_file(), "custom").unwrap();
        writer
            .write(&mut state(), &HookConfig::default(), SnapshotMode::Cached, &reader, at(19, 0, 0))
            .unwrap();

        assert_eq!(std::fs::read_to_string(paths.schema_file()).unwrap(), "custom");
    }

    #[test]
    fn test_rescan_replaces_cached_tokens() {
        let temp = tempdir().unwrap();
        let writer = SnapshotWriter::new(LogPaths::new(temp.path()));
        let reader = FixedInfo {
            info: SessionInfo {
                tokens: TokenUsage {
                    input: 1_000,
                    output: 500,
                    cache_read: 0,
                    cache_creation: 0,
                },
                model: Some("claude-sonnet".to_string()),
                context_tokens: 50_000,
            },
            calls: Cell::new(0),
        };
        let mut state = state();
        state.model = Some("older".to_string());

        let path = writer
            .write(&mut state, &HookConfig::default(), SnapshotMode::Rescan, &reader, at(19, 0, 0))
            .unwrap();

        assert_eq!(reader.calls.get(), 1);
        assert_eq!(state.tokens.input, 1_000);
        assert_eq!(state.model.as_deref(), Some("claude-sonnet"));
        let written: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written["context_used"], "25.0%");
        assert_eq!(written["cost_estimate"], 0.0105);
    }

    #[test]
    fn test_snapshot_field_order() {
        let snapshot = SessionSnapshot::from_state(&state(), &HookConfig::default(), at(19, 0, 0));
        let text = serde_json::to_string(&snapshot).unwrap();
        let model_at = text.find("\"model\"").unwrap();
        let timeline_at = text.find("\"timeline\"").unwrap();
        assert!(model_at < timeline_at);
        assert!(text.starts_with("{\"model\""));
    }
}
