//! Tool-specific summaries for timeline entries.
//!
//! Known tool names map to a closed [`ToolKind`] set through a lookup table;
//! anything unrecognised falls back to [`ToolKind::Other`]. Every free-text
//! field is capped so snapshots stay small and readable.

use once_cell::sync::Lazy;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Read,
    Grep,
    Glob,
    Edit,
    Write,
    Bash,
    Skill,
    Task,
    NotebookEdit,
    AskUserQuestion,
    Other,
}

static TOOL_KINDS: Lazy<HashMap<&'static str, ToolKind>> = Lazy::new(|| {
    HashMap::from([
        ("Read", ToolKind::Read),
        ("Grep", ToolKind::Grep),
        ("Glob", ToolKind::Glob),
        ("Edit", ToolKind::Edit),
        ("MultiEdit", ToolKind::Edit),
        ("Write", ToolKind::Write),
        ("Bash", ToolKind::Bash),
        ("Skill", ToolKind::Skill),
        ("Task", ToolKind::Task),
        ("NotebookEdit", ToolKind::NotebookEdit),
        ("AskUserQuestion", ToolKind::AskUserQuestion),
    ])
});

impl ToolKind {
    pub fn from_name(tool_name: &str) -> Self {
        TOOL_KINDS.get(tool_name).copied().unwrap_or(ToolKind::Other)
    }

    /// Tools whose `file_path` lands in `files_modified`.
    pub fn modifies_files(self) -> bool {
        matches!(self, ToolKind::Edit | ToolKind::Write)
    }

    /// Tools whose non-zero exit code counts as a failure.
    pub fn is_shell(self) -> bool {
        self == ToolKind::Bash
    }

    /// Tools that open a pending subagent.
    pub fn delegates(self) -> bool {
        self == ToolKind::Task
    }

    pub fn summarize_input(self, tool_input: &Value) -> String {
        let input = match tool_input.as_object() {
            Some(map) if !map.is_empty() => map,
            _ => return String::new(),
        };

        match self {
            ToolKind::Read | ToolKind::Edit | ToolKind::Write => file_name(str_field(input, "file_path")),
            ToolKind::Grep => {
                let path = file_name(input.get("path").and_then(Value::as_str).unwrap_or("."));
                format!(
                    "pattern=\"{}\", path={}",
                    truncate(str_field(input, "pattern"), 30),
                    if path.is_empty() { "." } else { path.as_str() }
                )
            }
            ToolKind::Glob => truncate(str_field(input, "pattern"), 50),
            ToolKind::Bash => truncate(str_field(input, "command"), 50),
            ToolKind::Skill => str_field(input, "skill").to_string(),
            ToolKind::Task => {
                let prompt = str_field(input, "prompt");
                match str_field(input, "subagent_type") {
                    "" => truncate(prompt, 50),
                    subagent => format!("{}: {}", subagent, truncate(prompt, 40)),
                }
            }
            ToolKind::NotebookEdit | ToolKind::AskUserQuestion | ToolKind::Other => {
                summarize_generic_input(input, tool_input)
            }
        }
    }

    pub fn summarize_output(self, tool_response: Option<&Value>) -> String {
        let response = match tool_response {
            Some(Value::Null) | None => return String::new(),
            Some(response) => response,
        };

        if let Some(error) = response.get("error").filter(|e| is_truthy(e)) {
            return format!("failed: {}", truncate(&display_value(error), 30));
        }

        let object = response.as_object();
        match self {
            ToolKind::Read => match object {
                Some(map) => {
                    let file = map.get("file");
                    let lines = file
                        .and_then(|f| f.get("numLines"))
                        .filter(|v| is_truthy(v))
                        .or_else(|| file.and_then(|f| f.get("totalLines")))
                        .map(display_value)
                        .unwrap_or_else(|| "?".to_string());
                    format!("{} lines", lines)
                }
                None => "ok".to_string(),
            },
            ToolKind::Grep => match object {
                Some(map) => format!("{} files matched", file_count(map)),
                None => "ok".to_string(),
            },
            ToolKind::Glob => match object {
                Some(map) => format!("{} files", file_count(map)),
                None => "ok".to_string(),
            },
            ToolKind::Edit => {
                let patch = object
                    .and_then(|map| map.get("structuredPatch"))
                    .and_then(Value::as_array)
                    .filter(|hunks| !hunks.is_empty());
                match patch {
                    Some(hunks) => {
                        let changed: u64 = hunks
                            .iter()
                            .filter_map(|hunk| hunk.get("newLines").and_then(Value::as_u64))
                            .sum();
                        format!("{} lines changed", changed)
                    }
                    None => String::new(),
                }
            }
            _ => String::new(),
        }
    }
}

/// Whether a tool response describes a failed invocation.
pub fn is_failure(kind: ToolKind, tool_response: Option<&Value>) -> bool {
    let response = match tool_response.and_then(Value::as_object) {
        Some(map) => map,
        None => return false,
    };

    if response.get("error").is_some_and(is_truthy) {
        return true;
    }

    if kind.is_shell() {
        let exit_code = response
            .get("exitCode")
            .or_else(|| response.get("exit_code"))
            .unwrap_or(&Value::Null);
        return match exit_code {
            Value::Null | Value::Bool(false) => false,
            Value::Number(n) => n.as_f64() != Some(0.0),
            _ => true,
        };
    }

    false
}

/// Truncates to `max_len` characters, appending `...` when anything was cut.
pub fn truncate(text: &str, max_len: usize) -> String {
    match text.char_indices().nth(max_len) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// Final path component, or empty for an empty path.
pub fn file_name(path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn summarize_generic_input(input: &Map<String, Value>, raw: &Value) -> String {
    if let Some(path) = input.get("file_path") {
        return file_name(&display_value(path));
    }
    if let Some(pattern) = input.get("pattern") {
        return truncate(&display_value(pattern), 50);
    }
    truncate(&raw.to_string(), 50)
}

fn str_field<'a>(input: &'a Map<String, Value>, key: &str) -> &'a str {
    input.get(key).and_then(Value::as_str).unwrap_or("")
}

fn file_count(map: &Map<String, Value>) -> String {
    match map.get("numFiles") {
        Some(count) => display_value(count),
        None => map
            .get("filenames")
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
            .to_string(),
    }
}

/// Strings render bare, everything else as compact JSON.
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_table_and_fallback() {
        assert_eq!(ToolKind::from_name("MultiEdit"), ToolKind::Edit);
        assert_eq!(ToolKind::from_name("Task"), ToolKind::Task);
        assert_eq!(ToolKind::from_name("WebFetch"), ToolKind::Other);
    }

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate("Hello world", 5), "Hello...");
        assert_eq!(truncate("short", 5), "short");
        assert_eq!(truncate("日本語テキスト", 3), "日本語...");
    }

    #[test]
    fn test_file_targeting_inputs_use_file_name() {
        let input = json!({"file_path": "/repo/src/main.rs", "old_string": "a"});
        assert_eq!(ToolKind::Edit.summarize_input(&input), "main.rs");
        assert_eq!(ToolKind::Write.summarize_input(&input), "main.rs");
        assert_eq!(ToolKind::Read.summarize_input(&input), "main.rs");
    }

    #[test]
    fn test_grep_input_summary() {
        let input = json!({"pattern": "fn main", "path": "/repo/src"});
        assert_eq!(
            ToolKind::Grep.summarize_input(&input),
            "pattern=\"fn main\", path=src"
        );
        let no_path = json!({"pattern": "x"});
        assert_eq!(ToolKind::Grep.summarize_input(&no_path), "pattern=\"x\", path=.");
    }

    #[test]
    fn test_task_input_summary() {
        let typed = json!({"subagent_type": "reviewer", "prompt": "Review the change set for obvious regressions please"});
        assert_eq!(
            ToolKind::Task.summarize_input(&typed),
            "reviewer: Review the change set for obvious regres..."
        );
        let untyped = json!({"prompt": "short"});
        assert_eq!(ToolKind::Task.summarize_input(&untyped), "short");
    }

    #[test]
    fn test_generic_input_fallbacks() {
        assert_eq!(
            ToolKind::Other.summarize_input(&json!({"file_path": "/a/b.ipynb"})),
            "b.ipynb"
        );
        assert_eq!(
            ToolKind::Other.summarize_input(&json!({"pattern": "**/*.rs"})),
            "**/*.rs"
        );
        assert_eq!(
            ToolKind::AskUserQuestion.summarize_input(&json!({"q": 1})),
            r#"{"q":1}"#
        );
        assert_eq!(ToolKind::Other.summarize_input(&json!({})), "");
        assert_eq!(ToolKind::Other.summarize_input(&Value::Null), "");
    }

    #[test]
    fn test_output_summaries() {
        assert_eq!(
            ToolKind::Read.summarize_output(Some(&json!({"file": {"numLines": 42}}))),
            "42 lines"
        );
        assert_eq!(ToolKind::Read.summarize_output(Some(&json!({}))), "? lines");
        assert_eq!(ToolKind::Read.summarize_output(Some(&json!("text"))), "ok");
        assert_eq!(
            ToolKind::Grep.summarize_output(Some(&json!({"filenames": ["a", "b"]}))),
            "2 files matched"
        );
        assert_eq!(
            ToolKind::Glob.summarize_output(Some(&json!({"numFiles": 7}))),
            "7 files"
        );
        assert_eq!(
            ToolKind::Edit.summarize_output(Some(&json!({
                "structuredPatch": [{"newLines": 3}, {"newLines": 4}]
            }))),
            "7 lines changed"
        );
        assert_eq!(ToolKind::Edit.summarize_output(Some(&json!({"structuredPatch": []}))), "");
        assert_eq!(ToolKind::Write.summarize_output(Some(&json!({"ok": true}))), "");
        assert_eq!(ToolKind::Task.summarize_output(None), "");
    }

    #[test]
    fn test_error_output_wins_for_any_tool() {
        assert_eq!(
            ToolKind::Write.summarize_output(Some(&json!({"error": "permission denied"}))),
            "failed: permission denied"
        );
        assert_eq!(
            ToolKind::Edit.summarize_output(Some(&json!({"error": "x".repeat(40)}))),
            format!("failed: {}...", "x".repeat(30))
        );
    }

    #[test]
    fn test_failure_detection() {
        assert!(is_failure(ToolKind::Edit, Some(&json!({"error": "boom"}))));
        assert!(!is_failure(ToolKind::Edit, Some(&json!({"error": ""}))));
        assert!(is_failure(ToolKind::Bash, Some(&json!({"exitCode": 2}))));
        assert!(is_failure(ToolKind::Bash, Some(&json!({"exit_code": 1}))));
        assert!(!is_failure(ToolKind::Bash, Some(&json!({"exitCode": 0}))));
        assert!(!is_failure(ToolKind::Bash, Some(&json!({"exitCode": null}))));
        assert!(!is_failure(ToolKind::Write, Some(&json!({"exitCode": 1}))));
        assert!(!is_failure(ToolKind::Bash, None));
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("/a/b/c.txt"), "c.txt");
        assert_eq!(file_name(""), "");
        assert_eq!(file_name("."), "");
    }
}
