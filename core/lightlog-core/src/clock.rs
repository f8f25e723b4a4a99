//! Timestamp capture and the string formats written to state and snapshots.
//!
//! Three formats are in play:
//! - local naive timestamps (`2026-01-20T18:58:12.123456`) for session start,
//!   pending markers and snapshot start/end times
//! - `MM-DD HH:MM` for timeline entries
//! - UTC with millisecond precision and a `Z` suffix for the transcript
//!   watermark, matching how the host writes transcript timestamps

use chrono::{DateTime, Local, NaiveDateTime, SubsecRound, Utc};

/// Current local time truncated to microseconds.
pub fn now() -> DateTime<Local> {
    Local::now().trunc_subsecs(6)
}

/// `MM-DD HH:MM` rendering used for timeline `ts` fields.
pub fn timeline_ts(at: &NaiveDateTime) -> String {
    at.format("%m-%d %H:%M").to_string()
}

/// Initial transcript watermark for a session starting at `at`.
pub fn watermark(at: &DateTime<Local>) -> String {
    at.with_timezone(&Utc)
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

/// ISO rendering of a local naive timestamp (performance log lines).
pub fn iso_local(at: &NaiveDateTime) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}
