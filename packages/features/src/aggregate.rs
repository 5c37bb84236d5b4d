//! Per-intersection window aggregation.
//!
//! Events are held sorted by timestamp so each window is a contiguous
//! slice found by binary search.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use crash_hotspots_crash_models::{InjurySeverity, LinkedPerson, SnappedCrash};

use crate::windows::{CutoffWindows, Window};

/// A matched crash reduced to what aggregation needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrashEvent {
    pub intersection_id: i64,
    pub occurred_at: NaiveDateTime,
    pub severity: u32,
}

/// A person linked to a matched crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InjuryEvent {
    pub intersection_id: i64,
    pub occurred_at: NaiveDateTime,
    pub injury: InjurySeverity,
}

/// Crash count and severity sum over a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrashTotals {
    pub crashes: u32,
    pub severity: u32,
}

/// Injury counts over a window.
///
/// `total` counts every linked person with a recorded classification,
/// including "no indication of injury" and labels outside the portal
/// categories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InjuryTotals {
    pub total: u32,
    pub fatal: u32,
    pub incapacitating: u32,
    pub nonincap: u32,
}

/// Window aggregates for one intersection at one cutoff.
///
/// `None` means the intersection had no events in that window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporalAggregates {
    pub intersection_id: i64,
    pub cutoff_date: NaiveDate,
    pub history: Option<CrashTotals>,
    pub history_injuries: Option<InjuryTotals>,
    pub recent: Option<CrashTotals>,
    pub recent_injuries: Option<InjuryTotals>,
    pub future: Option<CrashTotals>,
}

/// Matched crashes and linked people, sorted by time.
#[derive(Debug, Default)]
pub struct EventLog {
    crashes: Vec<CrashEvent>,
    injuries: Vec<InjuryEvent>,
}

impl EventLog {
    /// Keeps matched crashes and people with an intersection, a
    /// timestamp, and a classification.
    #[must_use]
    pub fn new(snapped: &[SnappedCrash], people: &[LinkedPerson]) -> Self {
        let mut crashes: Vec<CrashEvent> = snapped
            .iter()
            .filter_map(|c| {
                Some(CrashEvent {
                    intersection_id: c.intersection_id()?,
                    occurred_at: c.occurred_at,
                    severity: c.severity_weight(),
                })
            })
            .collect();
        crashes.sort_by_key(|e| (e.occurred_at, e.intersection_id));

        let mut injuries: Vec<InjuryEvent> = people
            .iter()
            .filter_map(|p| {
                Some(InjuryEvent {
                    intersection_id: p.intersection_id?,
                    occurred_at: p.occurred_at?,
                    injury: p.injury_classification?,
                })
            })
            .collect();
        injuries.sort_by_key(|e| (e.occurred_at, e.intersection_id));

        log::info!(
            "Aggregating {} matched crashes and {} linked injuries",
            crashes.len(),
            injuries.len()
        );
        Self { crashes, injuries }
    }

    /// Number of matched crashes.
    #[must_use]
    pub fn crash_count(&self) -> usize {
        self.crashes.len()
    }

    /// Earliest and latest matched crash timestamps.
    #[must_use]
    pub fn time_range(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        Some((self.crashes.first()?.occurred_at, self.crashes.last()?.occurred_at))
    }

    fn crashes_in(&self, window: &Window) -> &[CrashEvent] {
        let lo = self.crashes.partition_point(|e| e.occurred_at < window.start);
        let hi = self.crashes.partition_point(|e| e.occurred_at < window.end);
        &self.crashes[lo..hi.max(lo)]
    }

    fn injuries_in(&self, window: &Window) -> &[InjuryEvent] {
        let lo = self.injuries.partition_point(|e| e.occurred_at < window.start);
        let hi = self.injuries.partition_point(|e| e.occurred_at < window.end);
        &self.injuries[lo..hi.max(lo)]
    }

    /// Crash totals per intersection over a window.
    #[must_use]
    pub fn crash_totals(&self, window: &Window) -> BTreeMap<i64, CrashTotals> {
        let mut totals: BTreeMap<i64, CrashTotals> = BTreeMap::new();
        for event in self.crashes_in(window) {
            let entry = totals.entry(event.intersection_id).or_default();
            entry.crashes += 1;
            entry.severity += event.severity;
        }
        totals
    }

    /// Injury totals per intersection over a window.
    #[must_use]
    pub fn injury_totals(&self, window: &Window) -> BTreeMap<i64, InjuryTotals> {
        let mut totals: BTreeMap<i64, InjuryTotals> = BTreeMap::new();
        for event in self.injuries_in(window) {
            let entry = totals.entry(event.intersection_id).or_default();
            entry.total += 1;
            match event.injury {
                InjurySeverity::Fatal => entry.fatal += 1,
                InjurySeverity::Incapacitating => entry.incapacitating += 1,
                InjurySeverity::NonIncapacitating => entry.nonincap += 1,
                InjurySeverity::ReportedNotEvident
                | InjurySeverity::NoIndication
                | InjurySeverity::Other => {}
            }
        }
        totals
    }

    /// Aggregates for every intersection with at least one matched crash
    /// in any of the three windows, ordered by intersection id.
    #[must_use]
    pub fn aggregate_cutoff(&self, windows: &CutoffWindows) -> Vec<TemporalAggregates> {
        let history = self.crash_totals(&windows.history);
        let recent = self.crash_totals(&windows.recent);
        let future = self.crash_totals(&windows.future);
        let history_injuries = self.injury_totals(&windows.history);
        let recent_injuries = self.injury_totals(&windows.recent);

        let mut ids: Vec<i64> = history
            .keys()
            .chain(recent.keys())
            .chain(future.keys())
            .copied()
            .collect();
        ids.sort_unstable();
        ids.dedup();

        ids.into_iter()
            .map(|id| TemporalAggregates {
                intersection_id: id,
                cutoff_date: windows.cutoff_date,
                history: history.get(&id).copied(),
                history_injuries: history_injuries.get(&id).copied(),
                recent: recent.get(&id).copied(),
                recent_injuries: recent_injuries.get(&id).copied(),
                future: future.get(&id).copied(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crash_hotspots_config::WindowConfig;

    use super::*;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn crash(id: &str, node: i64, ts: NaiveDateTime, injury: Option<InjurySeverity>) -> SnappedCrash {
        SnappedCrash {
            crash_record_id: id.to_string(),
            occurred_at: ts,
            most_severe_injury: injury,
            injuries_total: 0,
            injuries_fatal: 0,
            injuries_incapacitating: 0,
            nearest_node_id: Some(node),
            distance_m: Some(10.0),
            matched: true,
        }
    }

    fn person(crash: &SnappedCrash, injury: InjurySeverity) -> LinkedPerson {
        LinkedPerson {
            person_id: format!("P{}", crash.crash_record_id),
            crash_record_id: crash.crash_record_id.clone(),
            injury_classification: Some(injury),
            occurred_at: Some(crash.occurred_at),
            intersection_id: crash.intersection_id(),
        }
    }

    fn windows() -> CutoffWindows {
        CutoffWindows::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            &WindowConfig::default(),
        )
    }

    #[test]
    fn splits_events_by_window() {
        let crashes = vec![
            crash("old", 1, at(2023, 3, 1), Some(InjurySeverity::Fatal)),
            crash("recent", 1, at(2023, 12, 1), None),
            crash("future", 1, at(2024, 2, 1), Some(InjurySeverity::Incapacitating)),
            crash("too-old", 1, at(2022, 6, 1), None),
            crash("too-late", 1, at(2024, 8, 1), None),
        ];
        let people = vec![
            person(&crashes[0], InjurySeverity::Fatal),
            person(&crashes[1], InjurySeverity::NonIncapacitating),
            person(&crashes[2], InjurySeverity::Incapacitating),
        ];
        let log = EventLog::new(&crashes, &people);

        let rows = log.aggregate_cutoff(&windows());
        assert_eq!(rows.len(), 1);
        let row = rows[0];

        assert_eq!(row.history, Some(CrashTotals { crashes: 2, severity: 6 }));
        assert_eq!(row.recent, Some(CrashTotals { crashes: 1, severity: 1 }));
        assert_eq!(row.future, Some(CrashTotals { crashes: 1, severity: 4 }));
        assert_eq!(
            row.history_injuries,
            Some(InjuryTotals {
                total: 2,
                fatal: 1,
                incapacitating: 0,
                nonincap: 1
            })
        );
        assert_eq!(row.recent_injuries.unwrap().nonincap, 1);
    }

    #[test]
    fn unrecognized_classification_counts_toward_total() {
        let crashes = vec![crash("r", 4, at(2023, 12, 1), None)];
        let people = vec![
            person(&crashes[0], InjurySeverity::Other),
            person(&crashes[0], InjurySeverity::Fatal),
        ];
        let log = EventLog::new(&crashes, &people);
        let row = log.aggregate_cutoff(&windows())[0];
        assert_eq!(
            row.recent_injuries,
            Some(InjuryTotals {
                total: 2,
                fatal: 1,
                incapacitating: 0,
                nonincap: 0
            })
        );
    }

    #[test]
    fn unmatched_crashes_are_ignored() {
        let mut far = crash("far", 2, at(2023, 12, 1), None);
        far.matched = false;
        far.distance_m = Some(500.0);
        let log = EventLog::new(&[far], &[]);
        assert_eq!(log.crash_count(), 0);
        assert!(log.aggregate_cutoff(&windows()).is_empty());
    }

    #[test]
    fn future_only_intersection_has_empty_history() {
        let crashes = vec![crash("f", 9, at(2024, 3, 1), None)];
        let log = EventLog::new(&crashes, &[]);
        let rows = log.aggregate_cutoff(&windows());
        assert_eq!(rows[0].intersection_id, 9);
        assert!(rows[0].history.is_none());
        assert!(rows[0].recent.is_none());
        assert_eq!(rows[0].future.unwrap().crashes, 1);
    }

    #[test]
    fn crash_at_cutoff_midnight_is_future_only() {
        let midnight = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let log = EventLog::new(&[crash("m", 3, midnight, None)], &[]);
        let rows = log.aggregate_cutoff(&windows());
        assert!(rows[0].history.is_none());
        assert_eq!(rows[0].future.unwrap().crashes, 1);
    }

    #[test]
    fn rows_are_ordered_by_intersection() {
        let crashes = vec![
            crash("a", 30, at(2023, 12, 1), None),
            crash("b", 10, at(2023, 11, 1), None),
            crash("c", 20, at(2024, 2, 1), None),
        ];
        let log = EventLog::new(&crashes, &[]);
        let ids: Vec<i64> = log
            .aggregate_cutoff(&windows())
            .iter()
            .map(|r| r.intersection_id)
            .collect();
        assert_eq!(ids, vec![10, 20, 30]);
    }
}
