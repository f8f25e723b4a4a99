//! # lightlog-core
//!
//! Shared logic for the lightweight session log hook. Each Claude Code
//! lifecycle event runs in its own short-lived process, so everything the
//! hook knows about a session lives in a small JSON state file that is read
//! at the start of an invocation and written back at the end.
//!
//! ## Design Principles
//!
//! - **Synchronous**: plain blocking I/O, no async runtime.
//! - **Graceful degradation**: missing or corrupt files read as empty/default
//!   values. Write failures are returned to the caller, which reports them
//!   and carries on.
//! - **Pure transitions**: [`dispatch::apply_event`] maps
//!   (prior state, payload, config, now) to the next state plus the snapshot
//!   to write. Transcript access goes through [`transcript::TranscriptReader`].
//!
//! ## Flow
//!
//! ```text
//! stdin payload → HookInput → apply_event → StateStore (.state.json)
//!                                       └─→ SnapshotWriter (<date>-<time>-<id>.log)
//! ```

pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod hook;
pub mod paths;
pub mod snapshot;
pub mod state;
pub mod tools;
pub mod transcript;

pub use config::{CostAlert, HookConfig};
pub use dispatch::{apply_event, Persist, Transition};
pub use error::{LogError, Result};
pub use hook::{HookEvent, HookInput};
pub use paths::LogPaths;
pub use snapshot::{SessionSnapshot, SnapshotMode, SnapshotWriter};
pub use state::{SessionState, StateStore, TimelineEntry, TokenUsage};
pub use transcript::{JsonlTranscript, TranscriptReader};
