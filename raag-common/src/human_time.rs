//! Human-readable duration formatting for progress lines
//!
//! Format is selected by magnitude so short runs stay precise and long
//! runs stay compact:
//! - `< 100s`  → `X.Xs`
//! - `< 100m`  → `M:SS`
//! - otherwise → `H:MM:SS`

use std::time::Duration;

const SHORT_FORMAT_MAX: u64 = 100; // < 100s → X.Xs
const MEDIUM_FORMAT_MAX: u64 = 6000; // < 100m → M:SS

/// Format a duration for display in progress and summary lines.
///
/// # Examples
///
/// ```
/// use raag_common::human_time::format_duration;
/// use std::time::Duration;
///
/// assert_eq!(format_duration(Duration::from_millis(4_250)), "4.2s");
/// assert_eq!(format_duration(Duration::from_secs(330)), "5:30");
/// assert_eq!(format_duration(Duration::from_secs(3661 * 2)), "2:02:02");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();

    if secs < SHORT_FORMAT_MAX {
        // Truncate rather than round so 99.96s never prints as "100.0s"
        let tenths = duration.as_millis() / 100;
        format!("{}.{}s", tenths / 10, tenths % 10)
    } else if secs < MEDIUM_FORMAT_MAX {
        format!("{}:{:02}", secs / 60, secs % 60)
    } else {
        format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

/// Format an optional ETA; `None` means not enough samples yet.
pub fn format_eta(eta: Option<Duration>) -> String {
    match eta {
        Some(duration) => format_duration(duration),
        None => "calculating...".to_string(),
    }
}

/// Extrapolate remaining time from the mean duration of completed items.
///
/// Returns `None` until at least one item has completed.
pub fn estimate_remaining(elapsed: Duration, completed: usize, total: usize) -> Option<Duration> {
    if completed == 0 {
        return None;
    }
    let remaining = total.saturating_sub(completed) as u32;
    let mean = elapsed / completed as u32;
    Some(mean * remaining)
}
