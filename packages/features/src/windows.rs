//! Half-open time windows and the cutoff schedule.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use crash_hotspots_config::WindowConfig;

/// A `[start, end)` time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Window {
    /// Whether `ts` falls in the window (start inclusive, end exclusive).
    #[must_use]
    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        self.start <= ts && ts < self.end
    }
}

/// The three windows anchored at one cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CutoffWindows {
    pub cutoff_date: NaiveDate,
    /// `[cutoff - history_days, cutoff)`
    pub history: Window,
    /// `[cutoff - recent_days, cutoff)`
    pub recent: Window,
    /// `[cutoff, cutoff + predict_days)`
    pub future: Window,
}

impl CutoffWindows {
    #[must_use]
    pub fn new(cutoff_date: NaiveDate, config: &WindowConfig) -> Self {
        let cutoff = cutoff_date.and_time(NaiveTime::MIN);
        Self {
            cutoff_date,
            history: Window {
                start: cutoff - Duration::days(config.history_days),
                end: cutoff,
            },
            recent: Window {
                start: cutoff - Duration::days(config.recent_days),
                end: cutoff,
            },
            future: Window {
                start: cutoff,
                end: cutoff + Duration::days(config.predict_days),
            },
        }
    }

    /// Midnight at the cutoff date.
    #[must_use]
    pub const fn cutoff(&self) -> NaiveDateTime {
        self.history.end
    }
}

/// Cutoff dates for a data span, in chronological order.
///
/// The latest cutoff is `floor_day(max_ts) - predict_days`; earlier ones
/// step back by `predict_days` while at least `history_days +
/// recent_days` of data precede the cutoff.
#[must_use]
pub fn cutoff_schedule(
    min_ts: NaiveDateTime,
    max_ts: NaiveDateTime,
    config: &WindowConfig,
) -> Vec<NaiveDate> {
    let earliest = min_ts.date() + Duration::days(config.history_days + config.recent_days);
    let step = Duration::days(config.predict_days);

    let mut cutoffs = Vec::new();
    let mut cutoff = max_ts.date() - step;
    while cutoff >= earliest {
        cutoffs.push(cutoff);
        cutoff -= step;
    }
    cutoffs.reverse();
    cutoffs
}
