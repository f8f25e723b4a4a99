//! Path management for per-project log data.
//!
//! All file locations are derived from a single project root so the hook and
//! tests agree on layout:
//!
//! ```text
//! <project>/.claude/log-lightweight.config.json
//! <project>/.claude/logs/lightweight/.state.json
//! <project>/.claude/logs/lightweight/_schema.json
//! <project>/.claude/logs/lightweight/<date>-<time>-<id>.log
//! <project>/.claude/logs/lightweight/errors.log
//! <project>/.claude/logs/lightweight/performance.log
//! ```

use std::path::{Path, PathBuf};

const CLAUDE_DIR: &str = ".claude";
const CONFIG_FILE: &str = "log-lightweight.config.json";

pub const STATE_FILE: &str = ".state.json";
pub const SCHEMA_FILE: &str = "_schema.json";
pub const ERRORS_LOG: &str = "errors.log";
pub const PERFORMANCE_LOG: &str = "performance.log";

#[derive(Debug, Clone)]
pub struct LogPaths {
    project_root: PathBuf,
}

impl LogPaths {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
        }
    }

    /// Resolves the project root from the payload's `cwd`, falling back to the
    /// process working directory.
    pub fn resolve(cwd: Option<&str>) -> Self {
        match cwd.filter(|c| !c.is_empty()) {
            Some(cwd) => Self::new(cwd),
            None => Self::new(std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))),
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn config_file(&self) -> PathBuf {
        self.project_root.join(CLAUDE_DIR).join(CONFIG_FILE)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.project_root
            .join(CLAUDE_DIR)
            .join("logs")
            .join("lightweight")
    }

    pub fn state_file(&self) -> PathBuf {
        self.log_dir().join(STATE_FILE)
    }

    pub fn schema_file(&self) -> PathBuf {
        self.log_dir().join(SCHEMA_FILE)
    }

    pub fn errors_log(&self) -> PathBuf {
        self.log_dir().join(ERRORS_LOG)
    }

    pub fn performance_log(&self) -> PathBuf {
        self.log_dir().join(PERFORMANCE_LOG)
    }

    /// Snapshot file for a session, e.g. `2026-01-20-1858-4f3bdd8d.log`.
    pub fn snapshot_file(&self, date: &str, time: &str, session_fragment: &str) -> PathBuf {
        self.log_dir()
            .join(format!("{}-{}-{}.log", date, time, session_fragment))
    }
}

/// Short session identifier taken from the transcript file name.
///
/// `/…/4f3bdd8d-e816-490f-8f98-9270c3a22c64.jsonl` → `4f3bdd8d`.
pub fn session_fragment(transcript_path: &str) -> String {
    if transcript_path.is_empty() {
        return "unknown".to_string();
    }
    Path::new(transcript_path)
        .file_stem()
        .map(|stem| stem.to_string_lossy())
        .and_then(|stem| stem.split('-').next().map(str::to_string))
        .filter(|fragment| !fragment.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
