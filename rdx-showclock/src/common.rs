//! Contains common, primitive types shared by every part of the engine.
//!
//! This module defines the identifier types used for rundown entries and
//! integration listeners, and the millisecond type all timing is expressed in.
//! Using distinct types improves type safety and code clarity.

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use std::fmt;

/// Signed milliseconds. Offsets are relative to a nominal show-day start,
/// durations and remaining time may legitimately go negative.
pub type Millis = i64;

/// Number of milliseconds in a day.
pub const DAY_MS: Millis = 24 * 60 * 60 * 1000;

new_key_type! {
    /// Uniquely and safely identifies a registered integration listener.
    ///
    /// Returned by `ShowclockEngine::on_lifecycle` and used to remove the
    /// listener later. Keys are never reused, preventing stale ID bugs.
    pub struct ListenerId;
}

/// Identifies an entry (event, delay or block) within a rundown.
///
/// Identifiers are stable for the lifetime of the entry and unique within
/// a rundown. Ordering in the show is positional, never derived from the id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub String);

impl EntryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntryId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntryId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Formats a signed millisecond value as `[-]HH:MM:SS`.
///
/// Used by the shell and the demo binary when printing clock values.
pub fn format_millis(ms: Millis) -> String {
    let sign = if ms < 0 { "-" } else { "" };
    let total_secs = ms.unsigned_abs() / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{sign}{hours:02}:{minutes:02}:{seconds:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_positive_and_negative_clock_values() {
        assert_eq!(format_millis(0), "00:00:00");
        assert_eq!(format_millis(3_723_000), "01:02:03");
        assert_eq!(format_millis(-61_500), "-00:01:01");
    }
}
