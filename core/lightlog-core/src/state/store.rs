//! File-backed session state persistence.
//!
//! One state file per project (`.state.json` in the log directory), holding
//! the single in-progress session or `{}` between sessions.
//!
//! # Defensive Reads
//!
//! Every invocation starts by reading this file, so reading never fails:
//! - Missing file → no state
//! - Empty file or `{}` → no state
//! - Corrupt JSON → no state (logged at debug)
//! - Version mismatch → no state
//!
//! # Atomic Writes
//!
//! Uses temp file + rename so a crashed invocation never leaves half a file.

use fs_err as fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::NamedTempFile;

use crate::error::{LogError, Result};

use super::types::{SessionState, STATE_VERSION};

pub struct StateStore {
    file_path: PathBuf,
}

impl StateStore {
    pub fn new(file_path: &Path) -> Self {
        StateStore {
            file_path: file_path.to_path_buf(),
        }
    }

    /// Returns the persisted session, or `None` when there is nothing usable.
    pub fn read(&self) -> Option<SessionState> {
        let content = fs::read_to_string(&self.file_path).ok()?;
        if content.trim().is_empty() {
            return None;
        }

        let value: Value = match serde_json::from_str(&content) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(error = %e, "Corrupt state file, starting without state");
                return None;
            }
        };

        if value.as_object().is_some_and(|map| map.is_empty()) {
            return None;
        }

        match serde_json::from_value::<SessionState>(value) {
            Ok(state) if state.version == STATE_VERSION => Some(state),
            Ok(state) => {
                tracing::debug!(
                    version = state.version,
                    expected = STATE_VERSION,
                    "Unsupported state file version, starting without state"
                );
                None
            }
            Err(e) => {
                tracing::debug!(error = %e, "Unreadable state record, starting without state");
                None
            }
        }
    }

    /// Persists `state`, reporting failures instead of returning them.
    pub fn write(&self, state: &SessionState) {
        if let Err(e) = self.try_write(state) {
            tracing::error!(error = %e, path = %self.file_path.display(), "Failed to write session state");
        }
    }

    pub fn try_write(&self, state: &SessionState) -> Result<()> {
        let content = serde_json::to_string(state)
            .map_err(|e| LogError::json("serialize session state", e))?;
        self.replace_with(&content)
    }

    /// Resets the file to `{}`, reporting failures instead of returning them.
    pub fn clear(&self) {
        if let Err(e) = self.replace_with("{}") {
            tracing::error!(error = %e, path = %self.file_path.display(), "Failed to clear session state");
        }
    }

    fn replace_with(&self, content: &str) -> Result<()> {
        let parent_dir = self.file_path.parent().ok_or_else(|| {
            LogError::io(
                "state file path has no parent directory",
                std::io::Error::from(std::io::ErrorKind::NotFound),
            )
        })?;
        fs::create_dir_all(parent_dir).map_err(|e| LogError::io("create log directory", e))?;

        let mut temp_file = NamedTempFile::new_in(parent_dir)
            .map_err(|e| LogError::io("create temp state file", e))?;
        temp_file
            .write_all(content.as_bytes())
            .map_err(|e| LogError::io("write temp state file", e))?;
        temp_file
            .flush()
            .map_err(|e| LogError::io("flush temp state file", e))?;
        temp_file
            .persist(&self.file_path)
            .map_err(|e| LogError::Persist {
                path: self.file_path.clone(),
                source: e.error,
            })?;

        Ok(())
    }
}
