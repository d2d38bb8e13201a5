//! Minute-granularity timestamp helpers shared across the enlog crates.
//!
//! The logger has no notion of seconds or timezones: everything is a naive
//! local timestamp truncated to the minute, rendered as `YYYY-MM-DD HH:MM`.

use chrono::NaiveDateTime;

use crate::error::{EnlogError, Result};

/// Canonical textual form of logger timestamps.
pub const MINUTE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Render a timestamp at minute granularity: `YYYY-MM-DD HH:MM`.
pub fn format_minute(ts: NaiveDateTime) -> String {
    ts.format(MINUTE_FORMAT).to_string()
}

/// Parse a `YYYY-MM-DD HH:MM` timestamp.
pub fn parse_minute(text: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text.trim(), MINUTE_FORMAT)
        .map_err(|_| EnlogError::Timestamp(text.to_string()))
}

/// Signed duration from `start` to `end` in minutes, fractional allowed.
pub fn minutes_between(start: NaiveDateTime, end: NaiveDateTime) -> f64 {
    (end - start).num_seconds() as f64 / 60.0
}

// ── Tests ─────────────────────────────────────────────────────────────────────
