//! Next-wakeup computation for displays.
//!
//! Displays sleep between refreshes and report their own wakeup schedule
//! as a crontab-style string. Parsing that grammar is not implemented:
//! an empty schedule means "wake up at the start of the next day", any
//! non-empty schedule currently falls back to the top of the next hour.

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::Serialize;

/// Derived wakeup information for a display, relative to a reference
/// instant. Never persisted.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WakeupInfo {
    /// The next instant the display is expected to contact the server.
    pub next_wakeup: DateTime<Utc>,
    /// Seconds from the reference instant until `next_wakeup`.
    /// Non-negative by construction.
    pub sleep_in_seconds: i64,
    /// The raw schedule string the computation was based on.
    pub schedule: String,
}

/// Compute the next expected wakeup for the given schedule, relative to
/// `now`.
pub fn next_wakeup_time(schedule: &str, now: DateTime<Utc>) -> WakeupInfo {
    let next_wakeup = if schedule.trim().is_empty() {
        // No schedule, wake up at the start of the next day.
        (now + Duration::days(1))
            .duration_trunc(Duration::days(1))
            .unwrap_or(now + Duration::days(1))
    } else {
        // TODO: parse the crontab schedule; until then fall back to the
        // top of the next hour.
        (now + Duration::hours(1))
            .duration_trunc(Duration::hours(1))
            .unwrap_or(now + Duration::hours(1))
    };

    let sleep_in_seconds = (next_wakeup - now).num_seconds().max(0);

    WakeupInfo {
        next_wakeup,
        sleep_in_seconds,
        schedule: schedule.to_string(),
    }
}
