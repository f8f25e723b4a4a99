//! Lifecycle event handling.
//!
//! ## State Machine
//!
//! ```text
//! SessionStart       → fresh state (keeps timeline only for a same-transcript "startup")
//! UserPromptSubmit   → prompt entry (fresh state if none matches)      + snapshot
//! PreToolUse         → pending tool marker (watched tools only)
//! PostToolUse        → tool entry, files/errors/subagent bookkeeping   + snapshot
//! SubagentStop       → subagent entry from the pending marker          + snapshot
//! PermissionRequest  → permission_request entry                        + snapshot
//! Stop               → response entry, incremental token update        + snapshot
//! SessionEnd         → final snapshot (rescan if no tokens yet), then clear
//! ```
//!
//! [`apply_event`] is a pure function of the prior state, the payload, the
//! config and the current time. Transcript reads go through the
//! [`TranscriptReader`] seam. [`commit`] performs the resulting writes.

use chrono::{DateTime, Local, NaiveDateTime};
use serde_json::Value;

use crate::clock;
use crate::config::HookConfig;
use crate::hook::{HookEvent, HookInput};
use crate::snapshot::{duration_secs, SnapshotMode, SnapshotWriter};
use crate::state::{PendingSubagent, PendingTool, SessionState, StateStore, TimelineEntry};
use crate::tools::{self, ToolKind};
use crate::transcript::TranscriptReader;

/// What to do with the state file after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persist {
    /// Leave the file untouched.
    Skip,
    /// Write `Transition::state`.
    Save,
    /// Reset the file to `{}`.
    Clear,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Session state after the event. For [`Persist::Clear`] this is the final
    /// state the closing snapshot is built from.
    pub state: Option<SessionState>,
    pub persist: Persist,
    pub snapshot: Option<SnapshotMode>,
}

impl Transition {
    fn unchanged(state: Option<SessionState>) -> Self {
        Self {
            state,
            persist: Persist::Skip,
            snapshot: None,
        }
    }

    fn save(state: SessionState) -> Self {
        Self {
            state: Some(state),
            persist: Persist::Save,
            snapshot: None,
        }
    }

    fn save_and_snapshot(state: SessionState) -> Self {
        Self {
            state: Some(state),
            persist: Persist::Save,
            snapshot: Some(SnapshotMode::Cached),
        }
    }
}

pub fn apply_event(
    prior: Option<SessionState>,
    input: &HookInput,
    config: &HookConfig,
    now: DateTime<Local>,
    reader: &dyn TranscriptReader,
) -> Transition {
    let event = match input.to_event() {
        Some(event) => event,
        None => return Transition::unchanged(prior),
    };
    tracing::debug!(event = event.name(), has_state = prior.is_some(), "Applying hook event");
    let local_now = now.naive_local();

    match event {
        HookEvent::SessionStart { trigger } => {
            let mut next = fresh_state(input, now);
            if trigger == "startup" {
                if let Some(prior) = prior.filter(|p| p.transcript_path == next.transcript_path) {
                    next.timeline = prior.timeline;
                }
            }
            Transition::save(next)
        }

        HookEvent::UserPromptSubmit { prompt } => {
            let entry = TimelineEntry::Prompt {
                ts: clock::timeline_ts(&local_now),
                content: prompt,
            };
            let mut state = match prior {
                Some(state) if state.transcript_path == input.transcript_path_or_empty() => state,
                _ => fresh_state(input, now),
            };
            state.timeline.push(entry);
            Transition::save_and_snapshot(state)
        }

        HookEvent::PreToolUse {
            tool_name,
            tool_input,
        } => match prior {
            Some(mut state) if config.logs_tool(&tool_name) => {
                state.pending_tool = Some(PendingTool {
                    ts: local_now,
                    input: ToolKind::from_name(&tool_name).summarize_input(&tool_input),
                    tool: tool_name,
                });
                Transition::save(state)
            }
            other => Transition::unchanged(other),
        },

        HookEvent::PostToolUse {
            tool_name,
            tool_input,
            tool_response,
        } => match prior {
            Some(mut state) if config.logs_tool(&tool_name) => {
                record_tool_use(
                    &mut state,
                    &tool_name,
                    &tool_input,
                    tool_response.as_ref(),
                    local_now,
                );
                Transition::save_and_snapshot(state)
            }
            other => Transition::unchanged(other),
        },

        HookEvent::SubagentStop => match prior {
            Some(mut state) => match state.pending_subagent.take() {
                Some(pending) => {
                    state.timeline.push(TimelineEntry::Subagent {
                        ts: clock::timeline_ts(&local_now),
                        subagent_type: pending.subagent_type,
                        duration_sec: duration_secs(pending.start_time, local_now),
                        success: true,
                    });
                    Transition::save_and_snapshot(state)
                }
                None => Transition::unchanged(Some(state)),
            },
            None => Transition::unchanged(None),
        },

        HookEvent::PermissionRequest {
            tool_name,
            tool_input,
        } => match prior {
            Some(mut state) => {
                state.timeline.push(TimelineEntry::PermissionRequest {
                    ts: clock::timeline_ts(&local_now),
                    input: ToolKind::from_name(&tool_name).summarize_input(&tool_input),
                    tool: tool_name,
                });
                Transition::save_and_snapshot(state)
            }
            None => Transition::unchanged(None),
        },

        HookEvent::Stop => match prior {
            Some(mut state) => {
                record_stop(&mut state, config, local_now, reader);
                Transition::save_and_snapshot(state)
            }
            None => Transition::unchanged(None),
        },

        HookEvent::SessionEnd => {
            let snapshot = prior.as_ref().map(|state| {
                if state.tokens.has_activity() {
                    SnapshotMode::Cached
                } else {
                    SnapshotMode::Rescan
                }
            });
            Transition {
                state: prior,
                persist: Persist::Clear,
                snapshot,
            }
        }

        HookEvent::Unknown { .. } => Transition::unchanged(prior),
    }
}

/// Applies `transition` to disk: state file and, when requested, the snapshot.
///
/// Saved state is written before the snapshot. A clearing transition writes
/// its closing snapshot first and clears the state file whatever happens.
/// Failures are reported, never returned.
pub fn commit(
    transition: Transition,
    store: &StateStore,
    writer: &SnapshotWriter,
    config: &HookConfig,
    reader: &dyn TranscriptReader,
    now: NaiveDateTime,
) {
    let Transition {
        state,
        persist,
        snapshot,
    } = transition;

    if persist == Persist::Save {
        if let Some(state) = &state {
            store.write(state);
        }
    }

    if let (Some(mode), Some(mut state)) = (snapshot, state) {
        if let Err(e) = writer.write(&mut state, config, mode, reader, now) {
            tracing::error!(error = %e, "Failed to write session snapshot");
        }
    }

    if persist == Persist::Clear {
        store.clear();
    }
}

fn fresh_state(input: &HookInput, now: DateTime<Local>) -> SessionState {
    SessionState::new(
        now.naive_local(),
        input.session_id.clone().unwrap_or_default(),
        input.transcript_path_or_empty(),
        input.cwd.clone().unwrap_or_default(),
        clock::watermark(&now),
    )
}

fn record_tool_use(
    state: &mut SessionState,
    tool_name: &str,
    tool_input: &Value,
    tool_response: Option<&Value>,
    now: NaiveDateTime,
) {
    let kind = ToolKind::from_name(tool_name);

    let (ts, input) = match state.pending_tool.take() {
        Some(pending) if pending.tool == tool_name => (pending.ts, pending.input),
        _ => (now, kind.summarize_input(tool_input)),
    };
    let output = kind.summarize_output(tool_response);

    state.timeline.push(TimelineEntry::Tool {
        ts: clock::timeline_ts(&ts),
        tool: tool_name.to_string(),
        input,
        output: (!output.is_empty()).then_some(output),
    });

    if kind.modifies_files() {
        let path = tool_input
            .get("file_path")
            .and_then(Value::as_str)
            .unwrap_or("");
        state.record_file_modified(&tools::file_name(path));
    }

    if tools::is_failure(kind, tool_response) {
        state.error_count += 1;
    }

    if kind.delegates() {
        let subagent_type = tool_input
            .get("subagent_type")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        state.pending_subagent = Some(PendingSubagent {
            subagent_type: subagent_type.to_string(),
            start_time: now,
        });
    }
}

fn record_stop(
    state: &mut SessionState,
    config: &HookConfig,
    now: NaiveDateTime,
    reader: &dyn TranscriptReader,
) {
    if let Some(response) = reader.latest_response(&state.transcript_path, config.response_max_length) {
        state.timeline.push(TimelineEntry::Response {
            ts: clock::timeline_ts(&now),
            content: response,
        });
    }

    let incremental = reader.incremental_usage(&state.transcript_path, &state.last_processed_timestamp);
    state.tokens.add(&incremental.usage);
    if incremental.context_tokens > 0 {
        state.context_tokens = incremental.context_tokens;
    }
    if let Some(model) = incremental.model {
        state.model = Some(model);
    }
    if !incremental.last_timestamp.is_empty() {
        state.last_processed_timestamp = incremental.last_timestamp;
    }
}
