//! Time utilities for guardian
//!
//! Provides the wall clock used for record timestamps, HH:MM parsing for
//! bedtime settings, and calendar-day helpers for screen-time keys.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `GUARDIAN_MOCK_TIME` environment variable can be set
//! to override the system time for all time-sensitive operations.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-12-25 14:30:00`)

use chrono::{DateTime, Days, Local, NaiveDate, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "GUARDIAN_MOCK_TIME";

/// Calendar date format used for screen-time keys
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Cached mock time offset from the real time when the process started.
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

#[allow(clippy::disallowed_methods)] // Wraps Local::now()
fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                match NaiveDateTime::parse_from_str(&mock_time_str, "%Y-%m-%d %H:%M:%S")
                    .ok()
                    .and_then(|naive| Local.from_local_datetime(&naive).single())
                {
                    Some(mock_dt) => {
                        let offset = mock_dt.signed_duration_since(chrono::Local::now());
                        tracing::info!(
                            mock_time = %mock_time_str,
                            offset_secs = offset.num_seconds(),
                            "Mock time enabled"
                        );
                        return Some(offset);
                    }
                    None => {
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            expected_format = "%Y-%m-%d %H:%M:%S",
                            "Invalid mock time, using system time"
                        );
                    }
                }
            }
            None
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Get the current local time, respecting mock time settings in debug builds.
#[allow(clippy::disallowed_methods)]
pub fn now() -> DateTime<Local> {
    let real_now = chrono::Local::now();

    if let Some(offset) = get_mock_time_offset() {
        real_now + offset
    } else {
        real_now
    }
}

/// Today's calendar date according to [`now`].
pub fn today() -> NaiveDate {
    now().date_naive()
}

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .map_err(|e| format!("Invalid date '{}': {}", s, e))
}

/// Format a calendar date as `YYYY-MM-DD`.
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Last date whose `YYYY-MM-DD` form has a four-digit year. Later years
/// format as `+YYYYY-MM-DD`, which no longer sorts as text.
pub fn last_plain_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(9999, 12, 31).unwrap_or(NaiveDate::MAX)
}

/// Inclusive first and last day of `days` consecutive days from `start`,
/// clipped to years 0 through 9999. `None` when no such day is covered.
pub fn date_range_bounds(start: NaiveDate, days: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(0, 1, 1).unwrap_or(NaiveDate::MIN);
    let last = last_plain_date();
    if days == 0 || start > last {
        return None;
    }
    let end = start
        .checked_add_days(Days::new(u64::from(days) - 1))
        .map_or(last, |end| end.min(last));
    if end < first {
        return None;
    }
    Some((start.max(first), end))
}

/// Wall-clock time of day, written `HH:MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WallClock {
    pub hour: u8,
    pub minute: u8,
}

impl WallClock {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self { hour, minute })
        } else {
            None
        }
    }

    /// Parse `HH:MM` (24-hour).
    pub fn parse(s: &str) -> Result<Self, String> {
        let (h, m) = s
            .split_once(':')
            .ok_or_else(|| format!("Expected HH:MM format, got '{}'", s))?;

        let hour: u8 = h.parse().map_err(|_| format!("Invalid hour in '{}'", s))?;
        let minute: u8 = m.parse().map_err(|_| format!("Invalid minute in '{}'", s))?;

        if hour >= 24 {
            return Err(format!("Hour must be 0-23, got {}", hour));
        }
        if minute >= 60 {
            return Err(format!("Minute must be 0-59, got {}", minute));
        }

        Ok(Self { hour, minute })
    }

    /// Returns minutes since midnight
    pub fn minutes_from_midnight(&self) -> u32 {
        (self.hour as u32) * 60 + self.minute as u32
    }
}

impl PartialOrd for WallClock {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WallClock {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.minutes_from_midnight().cmp(&other.minutes_from_midnight())
    }
}

impl fmt::Display for WallClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl Serialize for WallClock {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for WallClock {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        WallClock::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Format a minute count the way dashboards show it, e.g. `3h 45m`.
pub fn format_minutes(minutes: u32) -> String {
    let hours = minutes / 60;
    let rest = minutes % 60;

    match (hours, rest) {
        (0, m) => format!("{}m", m),
        (h, 0) => format!("{}h", h),
        (h, m) => format!("{}h {}m", h, m),
    }
}
