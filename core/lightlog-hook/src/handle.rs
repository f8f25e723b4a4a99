//! Event handler for Claude Code hooks.
//!
//! Reads the JSON payload from stdin, applies it to the session state of the
//! project it names and writes the session snapshot. Never fails the host:
//! every error is logged and the process exits 0.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::io::{self, Read, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use fs_err as fs;
use lightlog_core::{
    clock, dispatch, HookConfig, HookInput, JsonlTranscript, LogPaths, SnapshotWriter,
    StateStore, TranscriptReader,
};

use crate::logging;

pub fn run() {
    let started = Instant::now();

    let mut raw = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut raw) {
        let _guard = init_logging(&LogPaths::resolve(None));
        report_failure(&format!("Failed to read stdin: {}", e));
        return;
    }

    if raw.trim().is_empty() {
        return;
    }

    let input = match HookInput::from_json(&raw) {
        Ok(input) => input,
        Err(e) => {
            let _guard = init_logging(&LogPaths::resolve(None));
            report_failure(&e.to_string());
            return;
        }
    };

    let paths = LogPaths::resolve(input.cwd.as_deref());
    let config = HookConfig::load(&paths.config_file());
    if !config.enabled {
        return;
    }

    let _guard = init_logging(&paths);

    let outcome = capture_panics(|| {
        handle_input(&input, &paths, &config, &JsonlTranscript, clock::now())
    });
    if let Err(report) = outcome {
        tracing::error!(
            error = %report.message,
            location = report.location.as_deref().unwrap_or("unknown"),
            backtrace = %report.backtrace,
            "Hook panicked"
        );
    }

    if config.tracks_performance() {
        let event_name = input.hook_event_name.as_deref().unwrap_or("unknown");
        if let Err(e) = record_performance(&paths.performance_log(), event_name, started.elapsed(), clock::now()) {
            tracing::warn!(error = %e, "Failed to record hook performance");
        }
    }
}

/// Applies one parsed payload to the project rooted at `paths`.
pub(crate) fn handle_input(
    input: &HookInput,
    paths: &LogPaths,
    config: &HookConfig,
    reader: &dyn TranscriptReader,
    now: DateTime<Local>,
) {
    let store = StateStore::new(&paths.state_file());
    let writer = SnapshotWriter::new(paths.clone());

    let prior = store.read();
    let transition = dispatch::apply_event(prior, input, config, now, reader);

    tracing::debug!(
        event = ?input.hook_event_name,
        persist = ?transition.persist,
        snapshot = ?transition.snapshot,
        "Handled hook event"
    );

    dispatch::commit(transition, &store, &writer, config, reader, now.naive_local());
}

fn init_logging(paths: &LogPaths) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    logging::init(Some(&paths.errors_log()))
}

fn report_failure(message: &str) {
    let backtrace = Backtrace::force_capture();
    tracing::error!(error = %message, backtrace = %backtrace, "Hook error");
}

/// A caught panic, with the site recorded by the panic hook before unwinding.
#[derive(Debug)]
struct PanicReport {
    message: String,
    location: Option<String>,
    backtrace: String,
}

struct PanicSite {
    location: Option<String>,
    backtrace: String,
}

thread_local! {
    static LAST_PANIC: RefCell<Option<PanicSite>> = const { RefCell::new(None) };
}

/// Runs `f`, turning a panic into a [`PanicReport`] that carries the panic
/// site's location and backtrace. The previous panic hook is restored after.
fn capture_panics<T>(f: impl FnOnce() -> T) -> Result<T, PanicReport> {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()));
        let backtrace = Backtrace::force_capture().to_string();
        LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(PanicSite { location, backtrace }));
    }));
    let outcome = panic::catch_unwind(AssertUnwindSafe(f));
    panic::set_hook(previous);

    outcome.map_err(|payload| {
        let site = LAST_PANIC.with(|slot| slot.borrow_mut().take());
        let (location, backtrace) = match site {
            Some(site) => (site.location, site.backtrace),
            None => (None, String::new()),
        };
        PanicReport {
            message: panic_message(payload.as_ref()),
            location,
            backtrace,
        }
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panic: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panic: {}", message)
    } else {
        "panic: unknown payload".to_string()
    }
}

fn record_performance(
    perf_log: &Path,
    event_name: &str,
    elapsed: Duration,
    now: DateTime<Local>,
) -> io::Result<()> {
    if let Some(parent) = perf_log.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(perf_log)?;
    writeln!(
        file,
        "{} {}: {:.3}ms",
        clock::iso_local(&now.naive_local()),
        event_name,
        elapsed.as_secs_f64() * 1000.0
    )
}
