//! Logging for the hook binary.
//!
//! Diagnostics go to stderr, filtered by `LIGHTLOG_LOG` (default `warn`).
//! `LIGHTLOG_DEBUG_LOG=1` forces debug output. Errors are also appended to
//! `errors.log` in the log directory so failures survive the host discarding
//! stderr. The file and its directory are only created once an error is
//! actually written.

use std::env;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs_err as fs;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const LOG_ENV: &str = "LIGHTLOG_LOG";
const DEBUG_ENV: &str = "LIGHTLOG_DEBUG_LOG";

/// Installs the global subscriber.
///
/// The returned guard flushes `errors.log` on drop and must be held until exit.
/// Without an `errors_log` path only the stderr layer is installed.
pub fn init(errors_log: Option<&Path>) -> Option<WorkerGuard> {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(stderr_filter());

    match errors_log {
        Some(path) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(LazyAppendFile::new(path));
            let file_layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_filter(LevelFilter::ERROR);
            let _ = tracing_subscriber::registry()
                .with(stderr_layer)
                .with(file_layer)
                .try_init();
            Some(guard)
        }
        None => {
            let _ = tracing_subscriber::registry().with(stderr_layer).try_init();
            None
        }
    }
}

fn stderr_filter() -> EnvFilter {
    if debug_enabled() {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
}

fn debug_enabled() -> bool {
    env::var(DEBUG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false)
}

/// Append-mode file that is opened, parent directories included, on first write.
struct LazyAppendFile {
    path: PathBuf,
    file: Option<fs::File>,
}

impl LazyAppendFile {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            file: None,
        }
    }

    fn open(&mut self) -> io::Result<&mut fs::File> {
        if self.file.is_none() {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            self.file = Some(file);
        }
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "error log not open"))
    }
}

impl Write for LazyAppendFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.open()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}
