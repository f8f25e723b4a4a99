//! Hook payload delivered on stdin for every lifecycle event.
//!
//! The payload is loosely typed: every field except `hook_event_name` is
//! event-specific, so all of them are optional and [`HookInput::to_event`]
//! turns the flat record into a typed [`HookEvent`].

use serde::{Deserialize, Deserializer};
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookInput {
    #[serde(default, deserialize_with = "lenient_string")]
    pub hook_event_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub cwd: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub session_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub transcript_path: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub trigger: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub source: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub prompt: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_input: Option<Value>,
    #[serde(default)]
    pub tool_response: Option<Value>,
}

/// Reads a string field without rejecting the payload over its type.
///
/// Null maps to `None`. Any other non-string value keeps its JSON rendering.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text),
        Some(other) => Some(other.to_string()),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum HookEvent {
    SessionStart {
        trigger: String,
    },
    UserPromptSubmit {
        prompt: String,
    },
    PreToolUse {
        tool_name: String,
        tool_input: Value,
    },
    PostToolUse {
        tool_name: String,
        tool_input: Value,
        tool_response: Option<Value>,
    },
    SubagentStop,
    PermissionRequest {
        tool_name: String,
        tool_input: Value,
    },
    Stop,
    SessionEnd,
    Unknown {
        event_name: String,
    },
}

impl HookEvent {
    pub fn name(&self) -> &str {
        match self {
            HookEvent::SessionStart { .. } => "SessionStart",
            HookEvent::UserPromptSubmit { .. } => "UserPromptSubmit",
            HookEvent::PreToolUse { .. } => "PreToolUse",
            HookEvent::PostToolUse { .. } => "PostToolUse",
            HookEvent::SubagentStop => "SubagentStop",
            HookEvent::PermissionRequest { .. } => "PermissionRequest",
            HookEvent::Stop => "Stop",
            HookEvent::SessionEnd => "SessionEnd",
            HookEvent::Unknown { event_name } => event_name,
        }
    }
}

impl HookInput {
    pub fn from_json(raw: &str) -> crate::Result<Self> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| crate::LogError::json("hook input", e))?;
        if !value.is_object() {
            return Err(crate::LogError::InvalidInput(
                "payload is not a JSON object".to_string(),
            ));
        }
        serde_json::from_value(value).map_err(|e| crate::LogError::json("hook input", e))
    }

    pub fn to_event(&self) -> Option<HookEvent> {
        let name = self.hook_event_name.as_deref()?;
        let tool_name = || self.tool_name.clone().unwrap_or_default();
        let tool_input = || self.tool_input.clone().unwrap_or(Value::Null);

        let event = match name {
            "SessionStart" => HookEvent::SessionStart {
                trigger: self.start_trigger().to_string(),
            },
            "UserPromptSubmit" => HookEvent::UserPromptSubmit {
                prompt: self.prompt.clone().unwrap_or_default(),
            },
            "PreToolUse" => HookEvent::PreToolUse {
                tool_name: tool_name(),
                tool_input: tool_input(),
            },
            "PostToolUse" => HookEvent::PostToolUse {
                tool_name: tool_name(),
                tool_input: tool_input(),
                tool_response: self.tool_response.clone().filter(|r| !r.is_null()),
            },
            "SubagentStop" => HookEvent::SubagentStop,
            "PermissionRequest" => HookEvent::PermissionRequest {
                tool_name: tool_name(),
                tool_input: tool_input(),
            },
            "Stop" => HookEvent::Stop,
            "SessionEnd" => HookEvent::SessionEnd,
            other => HookEvent::Unknown {
                event_name: other.to_string(),
            },
        };
        Some(event)
    }

    /// Why the session started: `trigger`, or `source` as sent by newer hosts.
    pub fn start_trigger(&self) -> &str {
        self.trigger
            .as_deref()
            .or(self.source.as_deref())
            .unwrap_or("")
    }

    pub fn transcript_path_or_empty(&self) -> &str {
        self.transcript_path.as_deref().unwrap_or("")
    }
}
