//! Half-hour time grid.
//!
//! Every scheduled time in a plan is a multiple of 30 minutes. Travel
//! durations stay fractional; the grid is applied when a segment boundary is
//! committed.

use chrono::{NaiveTime, Timelike};

const GRID_MINUTES: u32 = 30;

/// Round up to the next grid point (already-aligned times are unchanged).
pub fn snap_up(t: NaiveTime) -> NaiveTime {
    let minutes = t.num_seconds_from_midnight().div_ceil(60);
    let snapped = minutes.div_ceil(GRID_MINUTES) * GRID_MINUTES;
    from_minutes(snapped)
}

/// Round down to the previous grid point.
pub fn snap_down(t: NaiveTime) -> NaiveTime {
    let minutes = t.num_seconds_from_midnight() / 60;
    from_minutes(minutes / GRID_MINUTES * GRID_MINUTES)
}

/// Round to the closest grid point (exact quarter-hours round up).
pub fn snap_nearest(t: NaiveTime) -> NaiveTime {
    let minutes = t.num_seconds_from_midnight() / 60;
    let snapped = (minutes + GRID_MINUTES / 2) / GRID_MINUTES * GRID_MINUTES;
    from_minutes(snapped)
}

pub fn is_aligned(t: NaiveTime) -> bool {
    let seconds = t.num_seconds_from_midnight();
    seconds % (GRID_MINUTES * 60) == 0
}

/// `t` shifted by a fractional hour count, clamped to the day.
pub fn add_hours(t: NaiveTime, hours: f64) -> NaiveTime {
    let minutes =
        t.num_seconds_from_midnight() as i64 / 60 + (hours * 60.0).round() as i64;
    from_minutes(minutes.clamp(0, 24 * 60 - 1) as u32)
}

/// Hours from `start` to `end`, assuming both fall on the same day.
pub fn hours_between(start: NaiveTime, end: NaiveTime) -> f64 {
    (end.num_seconds_from_midnight() as f64
        - start.num_seconds_from_midnight() as f64)
        / 3600.0
}

pub fn hhmm(t: NaiveTime) -> String {
    t.format("%H:%M").to_string()
}

// Times are clamped to 23:30 so late-evening snapping stays on the grid.
fn from_minutes(minutes: u32) -> NaiveTime {
    let minutes = minutes.min(23 * 60 + 30);
    NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0)
        .unwrap_or_else(|| NaiveTime::from_hms_opt(23, 30, 0).expect("valid time"))
}
