//! Serialized session state carried between hook invocations.
//!
//! Current on-disk format is v1. Any other version reads as "no state".

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub const STATE_VERSION: u32 = 1;

fn current_version() -> u32 {
    STATE_VERSION
}

/// Accumulated token counts. Each category only ever grows within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input: u64,
    #[serde(default)]
    pub output: u64,
    #[serde(default)]
    pub cache_read: u64,
    #[serde(default)]
    pub cache_creation: u64,
}

impl TokenUsage {
    /// Accumulates `other`, saturating at `u64::MAX` so totals never wrap.
    pub fn add(&mut self, other: &TokenUsage) {
        self.input = self.input.saturating_add(other.input);
        self.output = self.output.saturating_add(other.output);
        self.cache_read = self.cache_read.saturating_add(other.cache_read);
        self.cache_creation = self.cache_creation.saturating_add(other.cache_creation);
    }

    /// True once any input or output has been accounted for.
    pub fn has_activity(&self) -> bool {
        self.input > 0 || self.output > 0
    }
}

/// One timeline record. `type` selects the variant on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimelineEntry {
    Prompt {
        ts: String,
        content: String,
    },
    Response {
        ts: String,
        content: String,
    },
    Tool {
        ts: String,
        tool: String,
        input: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<String>,
    },
    Subagent {
        ts: String,
        subagent_type: String,
        duration_sec: i64,
        success: bool,
    },
    PermissionRequest {
        ts: String,
        tool: String,
        input: String,
    },
}

/// Tool invocation between its PreToolUse and PostToolUse events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTool {
    pub ts: NaiveDateTime,
    pub tool: String,
    #[serde(default)]
    pub input: String,
}

/// Delegated sub-task between its Task PostToolUse and SubagentStop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingSubagent {
    #[serde(rename = "type")]
    pub subagent_type: String,
    pub start_time: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default = "current_version")]
    pub version: u32,
    /// Local start time. Names the snapshot file and bounds full rescans.
    pub start_time: NaiveDateTime,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub transcript_path: String,
    #[serde(default)]
    pub project_root: String,
    #[serde(default)]
    pub timeline: Vec<TimelineEntry>,
    #[serde(default)]
    pub pending_tool: Option<PendingTool>,
    #[serde(default)]
    pub pending_subagent: Option<PendingSubagent>,
    #[serde(default)]
    pub files_modified: Vec<String>,
    #[serde(default)]
    pub error_count: u64,
    #[serde(default)]
    pub tokens: TokenUsage,
    /// Most recent (input + cache_read) size. Overwritten, not accumulated.
    #[serde(default)]
    pub context_tokens: u64,
    #[serde(default)]
    pub model: Option<String>,
    /// Transcript entries stamped at or before this value are already in `tokens`.
    #[serde(default)]
    pub last_processed_timestamp: String,
}

impl SessionState {
    pub fn new(
        start_time: NaiveDateTime,
        session_id: impl Into<String>,
        transcript_path: impl Into<String>,
        project_root: impl Into<String>,
        watermark: impl Into<String>,
    ) -> Self {
        Self {
            version: STATE_VERSION,
            start_time,
            session_id: session_id.into(),
            transcript_path: transcript_path.into(),
            project_root: project_root.into(),
            timeline: Vec::new(),
            pending_tool: None,
            pending_subagent: None,
            files_modified: Vec::new(),
            error_count: 0,
            tokens: TokenUsage::default(),
            context_tokens: 0,
            model: None,
            last_processed_timestamp: watermark.into(),
        }
    }

    /// Records a modified file name once, keeping first-seen order.
    pub fn record_file_modified(&mut self, file_name: &str) {
        if file_name.is_empty() || self.files_modified.iter().any(|f| f == file_name) {
            return;
        }
        self.files_modified.push(file_name.to_string());
    }
}
