//! Reading the host's append-only JSONL transcript.
//!
//! Three access modes with different cost/accuracy tradeoffs:
//!
//! - **Tail read** ([`TranscriptReader::latest_response`]): last 50 KiB only,
//!   newest assistant text. Cheap enough for every Stop.
//! - **Incremental scan** ([`TranscriptReader::incremental_usage`]): whole
//!   file, but only entries stamped after the watermark are accumulated.
//! - **Full scan** ([`TranscriptReader::session_info`]): whole file, every
//!   entry since the session started. Used when no incremental baseline exists.
//!
//! Malformed lines are skipped and a missing file reads as empty. Nothing in
//! here returns an error.

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, Offset};
use fs_err as fs;
use serde::Deserialize;
use serde_json::Value;
use std::io::{Read, Seek, SeekFrom};

use crate::state::TokenUsage;
use crate::tools::truncate;

/// How much of the transcript tail is searched for the latest response.
pub const TAIL_BYTES: u64 = 50 * 1024;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncrementalUsage {
    pub usage: TokenUsage,
    pub model: Option<String>,
    pub context_tokens: u64,
    /// New watermark: the newest timestamp seen, or the old one if nothing matched.
    pub last_timestamp: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionInfo {
    pub tokens: TokenUsage,
    /// First model seen since the session started.
    pub model: Option<String>,
    pub context_tokens: u64,
}

/// Transcript access used by the dispatcher and the snapshot writer.
pub trait TranscriptReader {
    fn latest_response(&self, transcript_path: &str, max_length: usize) -> Option<String>;

    fn incremental_usage(&self, transcript_path: &str, watermark: &str) -> IncrementalUsage;

    fn session_info(&self, transcript_path: &str, session_start: NaiveDateTime) -> SessionInfo;
}

/// Reads transcripts straight from disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonlTranscript;

impl TranscriptReader for JsonlTranscript {
    fn latest_response(&self, transcript_path: &str, max_length: usize) -> Option<String> {
        if transcript_path.is_empty() {
            return None;
        }
        let tail = read_tail(transcript_path).ok()?;
        find_latest_response(&tail, max_length)
    }

    fn incremental_usage(&self, transcript_path: &str, watermark: &str) -> IncrementalUsage {
        match read_all(transcript_path) {
            Some(content) => scan_incremental(&content, watermark),
            None => IncrementalUsage {
                last_timestamp: watermark.to_string(),
                ..Default::default()
            },
        }
    }

    fn session_info(&self, transcript_path: &str, session_start: NaiveDateTime) -> SessionInfo {
        let local_offset = Local::now().offset().fix();
        read_all(transcript_path)
            .map(|content| scan_session(&content, session_start, local_offset))
            .unwrap_or_default()
    }
}

// MARK: - Entry shape

#[derive(Debug, Default, Deserialize)]
struct RawUsage {
    #[serde(default)]
    input_tokens: Option<u64>,
    #[serde(default)]
    output_tokens: Option<u64>,
    #[serde(default)]
    cache_read_input_tokens: Option<u64>,
    #[serde(default)]
    cache_creation_input_tokens: Option<u64>,
}

impl RawUsage {
    fn is_empty(&self) -> bool {
        self.input_tokens.is_none()
            && self.output_tokens.is_none()
            && self.cache_read_input_tokens.is_none()
            && self.cache_creation_input_tokens.is_none()
    }

    fn to_tokens(&self) -> TokenUsage {
        TokenUsage {
            input: self.input_tokens.unwrap_or(0),
            output: self.output_tokens.unwrap_or(0),
            cache_read: self.cache_read_input_tokens.unwrap_or(0),
            cache_creation: self.cache_creation_input_tokens.unwrap_or(0),
        }
    }

    /// Context window occupied by the request: fresh input plus cached input.
    fn context_tokens(&self) -> u64 {
        self.input_tokens
            .unwrap_or(0)
            .saturating_add(self.cache_read_input_tokens.unwrap_or(0))
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawMessage {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Option<Value>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<RawUsage>,
}

#[derive(Debug, Default, Deserialize)]
struct RawEntry {
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    message: Option<RawMessage>,
    #[serde(default)]
    usage: Option<RawUsage>,
}

impl RawEntry {
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        serde_json::from_str(line).ok()
    }

    fn timestamp(&self) -> &str {
        self.timestamp.as_deref().unwrap_or("")
    }

    /// Entry-level usage when present, otherwise the message's.
    fn usage(&self) -> Option<&RawUsage> {
        self.usage
            .as_ref()
            .filter(|usage| !usage.is_empty())
            .or_else(|| self.message.as_ref().and_then(|m| m.usage.as_ref()))
            .filter(|usage| !usage.is_empty())
    }

    fn model(&self) -> Option<&str> {
        self.message
            .as_ref()
            .and_then(|m| m.model.as_deref())
            .filter(|model| !model.is_empty())
    }

    /// Text blocks of an assistant message, joined and trimmed.
    fn assistant_text(&self) -> Option<String> {
        let message = self.message.as_ref()?;
        if message.role.as_deref() != Some("assistant") {
            return None;
        }
        let blocks = message.content.as_ref()?.as_array()?;
        let text: String = blocks
            .iter()
            .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .collect();
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

// MARK: - Scans

/// Newest assistant text in `content`, searching from the end.
pub fn find_latest_response(content: &str, max_length: usize) -> Option<String> {
    content
        .trim()
        .lines()
        .rev()
        .filter_map(RawEntry::parse)
        .find_map(|entry| entry.assistant_text())
        .map(|response| {
            if max_length > 0 {
                truncate(&response, max_length)
            } else {
                response
            }
        })
}

/// Accumulates usage from entries stamped strictly after `watermark`.
pub fn scan_incremental(content: &str, watermark: &str) -> IncrementalUsage {
    let mut result = IncrementalUsage {
        last_timestamp: watermark.to_string(),
        ..Default::default()
    };

    for entry in content.lines().filter_map(RawEntry::parse) {
        let ts = entry.timestamp();
        if ts.is_empty() {
            continue;
        }
        if !watermark.is_empty() && ts <= watermark {
            continue;
        }
        if ts > result.last_timestamp.as_str() {
            result.last_timestamp = ts.to_string();
        }

        if let Some(usage) = entry.usage().filter(|u| u.input_tokens.unwrap_or(0) > 0) {
            result.usage.add(&usage.to_tokens());
            result.context_tokens = usage.context_tokens();
        }

        if let Some(model) = entry.model() {
            result.model = Some(model.to_string());
        }
    }

    result
}

/// Accumulates usage from every entry at or after `session_start`.
///
/// `session_start` is local naive time. When an entry carries an offset, the
/// start is pinned to `local_offset` (the offset in force now) and both are
/// compared in UTC.
pub fn scan_session(
    content: &str,
    session_start: NaiveDateTime,
    local_offset: FixedOffset,
) -> SessionInfo {
    let start_utc = session_start - chrono::Duration::seconds(i64::from(local_offset.local_minus_utc()));
    let mut result = SessionInfo::default();

    for entry in content.lines().filter_map(RawEntry::parse) {
        let ts = entry.timestamp();
        if !ts.is_empty() {
            let before_start = match parse_entry_time(ts) {
                Some(EntryTime::Aware(at)) => at.naive_utc() < start_utc,
                Some(EntryTime::Naive(at)) => at < session_start,
                None => continue,
            };
            if before_start {
                continue;
            }
        }

        if result.model.is_none() {
            result.model = entry.model().map(str::to_string);
        }

        if let Some(usage) = entry.usage() {
            result.tokens.add(&usage.to_tokens());
            result.context_tokens = usage.context_tokens();
        }
    }

    result
}

enum EntryTime {
    Aware(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

/// Parses an ISO-8601 transcript timestamp. A trailing `Z` means UTC.
fn parse_entry_time(ts: &str) -> Option<EntryTime> {
    let normalized = match ts.strip_suffix('Z') {
        Some(stripped) => format!("{}+00:00", stripped),
        None => ts.to_string(),
    };
    if let Ok(at) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(EntryTime::Aware(at));
    }
    NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(EntryTime::Naive)
}

// MARK: - File access

fn read_tail(path: &str) -> std::io::Result<String> {
    let mut file = fs::File::open(path)?;
    let size = file.metadata()?.len();
    file.seek(SeekFrom::Start(size.saturating_sub(TAIL_BYTES)))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(decode_lenient(&bytes))
}

fn read_all(path: &str) -> Option<String> {
    if path.is_empty() {
        return None;
    }
    fs::read(path).ok().map(|bytes| decode_lenient(&bytes))
}

/// UTF-8 decode that drops invalid byte sequences instead of replacing them.
fn decode_lenient(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    let mut rest = bytes;
    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                out.push_str(valid);
                return out;
            }
            Err(e) => {
                let (valid, after) = rest.split_at(e.valid_up_to());
                out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                let skip = e.error_len().unwrap_or(after.len());
                rest = &after[skip..];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn usage_line(ts: &str, input: u64, output: u64, cache_read: u64, model: &str) -> String {
        format!(
            r#"{{"timestamp":"{}","message":{{"role":"assistant","model":"{}","usage":{{"input_tokens":{},"output_tokens":{},"cache_read_input_tokens":{},"cache_creation_input_tokens":1}}}}}}"#,
            ts, model, input, output, cache_read
        )
    }

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn start_at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 20)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_latest_response_concatenates_text_blocks() {
        let content = [
            r#"{"message":{"role":"assistant","content":[{"type":"text","text":"older"}]}}"#,
            r#"{"message":{"role":"user","content":[{"type":"text","text":"question"}]}}"#,
            r#"{"message":{"role":"assistant","content":[{"type":"text","text":"Hello "},{"type":"tool_use","name":"Edit"},{"type":"text","text":"world"}]}}"#,
        ]
        .join("\n");

        assert_eq!(find_latest_response(&content, 0).as_deref(), Some("Hello world"));
        assert_eq!(find_latest_response(&content, 5).as_deref(), Some("Hello..."));
    }

    #[test]
    fn test_latest_response_skips_textless_assistant_messages() {
        let content = [
            r#"{"message":{"role":"assistant","content":[{"type":"text","text":"  answer  "}]}}"#,
            r#"{"message":{"role":"assistant","content":[{"type":"tool_use","name":"Bash"}]}}"#,
            "not json at all",
        ]
        .join("\n");

        assert_eq!(find_latest_response(&content, 0).as_deref(), Some("answer"));
    }

    #[test]
    fn test_latest_response_missing_file() {
        assert_eq!(JsonlTranscript.latest_response("/definitely/not/here.jsonl", 0), None);
        assert_eq!(JsonlTranscript.latest_response("", 0), None);
    }

    #[test]
    fn test_tail_read_only_sees_last_window() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("t.jsonl");
        let early = r#"{"message":{"role":"assistant","content":[{"type":"text","text":"early"}]}}"#;
        let filler = format!(r#"{{"message":{{"role":"user","content":"{}"}}}}"#, "x".repeat(1024));
        let mut content = String::from(early);
        for _ in 0..60 {
            content.push('\n');
            content.push_str(&filler);
        }
        std::fs::write(&path, content).unwrap();

        assert_eq!(JsonlTranscript.latest_response(path.to_str().unwrap(), 0), None);
    }

    #[test]
    fn test_tail_read_ignores_invalid_utf8() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("t.jsonl");
        let mut bytes = vec![0xff, 0xfe, b'\n'];
        bytes.extend_from_slice(
            br#"{"message":{"role":"assistant","content":[{"type":"text","text":"fine"}]}}"#,
        );
        std::fs::write(&path, bytes).unwrap();

        assert_eq!(
            JsonlTranscript.latest_response(path.to_str().unwrap(), 0).as_deref(),
            Some("fine")
        );
    }

    #[test]
    fn test_incremental_excludes_watermark_and_advances() {
        let content = [
            usage_line("2026-01-20T10:00:00.000Z", 100, 10, 5, "m1"),
            usage_line("2026-01-20T10:00:01.000Z", 200, 20, 50, "m2"),
        ]
        .join("\n");

        let first = scan_incremental(&content, "2026-01-20T10:00:00.000Z");
        assert_eq!(first.usage.input, 200);
        assert_eq!(first.usage.output, 20);
        assert_eq!(first.context_tokens, 250);
        assert_eq!(first.model.as_deref(), Some("m2"));
        assert_eq!(first.last_timestamp, "2026-01-20T10:00:01.000Z");

        let second = scan_incremental(&content, &first.last_timestamp);
        assert_eq!(second.usage, TokenUsage::default());
        assert_eq!(second.last_timestamp, first.last_timestamp);
    }

    #[test]
    fn test_incremental_empty_watermark_counts_everything() {
        let content = [
            usage_line("2026-01-20T10:00:00.000Z", 100, 10, 0, "m"),
            r#"{"message":{"role":"user"}}"#.to_string(),
            usage_line("2026-01-20T10:00:02.000Z", 1, 1, 0, "m"),
        ]
        .join("\n");

        let result = scan_incremental(&content, "");
        assert_eq!(result.usage.input, 101);
        assert_eq!(result.usage.cache_creation, 2);
        assert_eq!(result.last_timestamp, "2026-01-20T10:00:02.000Z");
    }

    #[test]
    fn test_incremental_skips_zero_input_usage() {
        let content = usage_line("2026-01-20T10:00:00.000Z", 0, 99, 0, "m");
        let result = scan_incremental(&content, "");
        assert_eq!(result.usage, TokenUsage::default());
        assert_eq!(result.last_timestamp, "2026-01-20T10:00:00.000Z");
    }

    #[test]
    fn test_incremental_saturates_on_huge_counts() {
        let content = [
            usage_line("2026-01-20T10:00:00.000Z", u64::MAX, 1, u64::MAX, "m"),
            usage_line("2026-01-20T10:01:00.000Z", 5, 1, 5, "m"),
        ]
        .join("\n");

        let result = scan_incremental(&content, "");

        assert_eq!(result.usage.input, u64::MAX);
        assert_eq!(result.usage.cache_read, u64::MAX);
        assert_eq!(result.usage.output, 2);
        assert_eq!(result.context_tokens, 10);
        assert_eq!(result.last_timestamp, "2026-01-20T10:01:00.000Z");
    }

    #[test]
    fn test_malformed_line_does_not_change_totals() {
        let a = usage_line("2026-01-20T10:00:00.000Z", 100, 10, 5, "m");
        let b = usage_line("2026-01-20T10:00:01.000Z", 200, 20, 50, "m");
        let clean = [a.clone(), b.clone()].join("\n");
        let dirty = [a, "{\"timestamp\": broken".to_string(), b].join("\n");

        assert_eq!(scan_incremental(&clean, ""), scan_incremental(&dirty, ""));
        let start = start_at(9, 0);
        assert_eq!(
            scan_session(&clean, start, utc()),
            scan_session(&dirty, start, utc())
        );
    }

    #[test]
    fn test_incremental_missing_file_keeps_watermark() {
        let result = JsonlTranscript.incremental_usage("/nope/t.jsonl", "2026-01-20T10:00:00.000Z");
        assert_eq!(result.usage, TokenUsage::default());
        assert_eq!(result.last_timestamp, "2026-01-20T10:00:00.000Z");
    }

    #[test]
    fn test_usage_prefers_entry_level_object() {
        let content = r#"{"timestamp":"2026-01-20T10:00:00Z","usage":{"input_tokens":7,"output_tokens":3},"message":{"usage":{"input_tokens":1000}}}"#;
        let result = scan_incremental(content, "");
        assert_eq!(result.usage.input, 7);
        assert_eq!(result.usage.output, 3);
    }

    #[test]
    fn test_session_scan_filters_by_start_in_utc() {
        let content = [
            usage_line("2026-01-20T08:59:59.000Z", 1000, 1000, 0, "before"),
            usage_line("2026-01-20T09:00:00.000Z", 100, 10, 5, "first"),
            usage_line("2026-01-20T09:30:00.000Z", 200, 20, 50, "second"),
        ]
        .join("\n");

        let info = scan_session(&content, start_at(9, 0), utc());
        assert_eq!(info.tokens.input, 300);
        assert_eq!(info.tokens.output, 30);
        assert_eq!(info.model.as_deref(), Some("first"));
        assert_eq!(info.context_tokens, 250);
    }

    #[test]
    fn test_session_scan_applies_local_offset_to_start() {
        // Session started 18:00 local at UTC+9, i.e. 09:00 UTC.
        let content = [
            usage_line("2026-01-20T08:30:00.000Z", 1000, 0, 0, "m"),
            usage_line("2026-01-20T09:15:00.000Z", 5, 0, 0, "m"),
        ]
        .join("\n");

        let info = scan_session(&content, start_at(18, 0), FixedOffset::east_opt(9 * 3600).unwrap());
        assert_eq!(info.tokens.input, 5);
    }

    #[test]
    fn test_session_scan_includes_untimestamped_and_compares_naive() {
        let content = [
            r#"{"message":{"model":"m","usage":{"input_tokens":3}}}"#,
            r#"{"timestamp":"2026-01-20T08:00:00","usage":{"input_tokens":50}}"#,
            r#"{"timestamp":"2026-01-20T09:05:00","usage":{"input_tokens":4}}"#,
            r#"{"timestamp":"yesterday","usage":{"input_tokens":900}}"#,
        ]
        .join("\n");

        let info = scan_session(&content, start_at(9, 0), utc());
        assert_eq!(info.tokens.input, 7);
    }

    #[test]
    fn test_session_info_reads_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("t.jsonl");
        std::fs::write(&path, usage_line("2099-01-01T00:00:00.000Z", 10, 1, 0, "m")).unwrap();

        let info = JsonlTranscript.session_info(path.to_str().unwrap(), start_at(9, 0));
        assert_eq!(info.tokens.input, 10);
        assert_eq!(JsonlTranscript.session_info("", start_at(9, 0)), SessionInfo::default());
    }

    #[test]
    fn test_decode_lenient_drops_invalid_bytes() {
        assert_eq!(decode_lenient(b"ab\xffcd"), "abcd");
        assert_eq!(decode_lenient(b"ok\xe2\x82"), "ok");
    }
}
