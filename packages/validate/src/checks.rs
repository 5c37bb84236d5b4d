//! Individual data checks.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use crash_hotspots_config::stats;
use crash_hotspots_config::{ValidationConfig, WindowConfig};
use crash_hotspots_crash_models::{InjurySeverity, LinkedPerson, SnapRun, SnappedCrash};
use crash_hotspots_feature_models::{FeatureRow, WindowAggregate};

use crate::{CheckResult, CheckStatus};

/// Checks the matched flag against the distance, recomputes the match
/// rate, and compares it with the recorded snap run.
#[must_use]
pub fn snap_checks(
    snapped: &[SnappedCrash],
    tolerance_m: f64,
    recorded: Option<&SnapRun>,
    config: &ValidationConfig,
) -> Vec<CheckResult> {
    let disagreeing: Vec<&SnappedCrash> = snapped
        .iter()
        .filter(|c| c.distance_m.is_some_and(|d| d <= tolerance_m) != c.matched)
        .collect();
    let tolerance = disagreeing.first().map_or_else(
        || {
            CheckResult::pass(
                "snap_tolerance",
                format!(
                    "all {} crashes agree with distance <= {tolerance_m} m",
                    snapped.len()
                ),
            )
        },
        |first| {
            CheckResult::fail(
                "snap_tolerance",
                format!(
                    "{} crashes disagree with distance <= {tolerance_m} m (first: {})",
                    disagreeing.len(),
                    first.crash_record_id
                ),
            )
        },
    );

    let matched = snapped.iter().filter(|c| c.matched).count();
    #[allow(clippy::cast_precision_loss)]
    let rate = if snapped.is_empty() {
        0.0
    } else {
        matched as f64 / snapped.len() as f64
    };
    let status = if rate >= config.match_rate_pass {
        CheckStatus::Pass
    } else if rate >= config.match_rate_warn {
        CheckStatus::Warn
    } else {
        CheckStatus::Fail
    };
    let match_rate = CheckResult::new(
        "match_rate",
        status,
        format!(
            "{matched}/{} matched ({:.1}%, pass >= {:.0}%, warn >= {:.0}%)",
            snapped.len(),
            rate * 100.0,
            config.match_rate_pass * 100.0,
            config.match_rate_warn * 100.0
        ),
    );

    let mut results = vec![tolerance, match_rate];
    if let Some(run) = recorded {
        results.push(
            if run.crash_count == snapped.len() && run.matched_count == matched {
                CheckResult::pass(
                    "snap_run_record",
                    format!("snap_run.json agrees ({matched}/{})", run.crash_count),
                )
            } else {
                CheckResult::fail(
                    "snap_run_record",
                    format!(
                        "snap_run.json records {}/{}, mapping has {matched}/{}",
                        run.matched_count,
                        run.crash_count,
                        snapped.len()
                    ),
                )
            },
        );
    }
    results
}

/// Snapping keeps every cleaned crash, matched or not, so the mapping
/// must have exactly as many rows as the cleaned table.
#[must_use]
pub fn clean_snap_row_count(clean_rows: Option<usize>, snapped_rows: usize) -> CheckResult {
    match clean_rows {
        None => CheckResult::warn(
            "clean_snap_row_count",
            "crashes_clean.csv not found, row count not compared",
        ),
        Some(clean) if clean == snapped_rows => CheckResult::pass(
            "clean_snap_row_count",
            format!("{clean} cleaned crashes, {snapped_rows} mapped"),
        ),
        Some(clean) => CheckResult::fail(
            "clean_snap_row_count",
            format!("{clean} cleaned crashes but {snapped_rows} mapped"),
        ),
    }
}

/// 95th percentile of matched snap distances against the configured
/// tolerance. Exceeding it means the mapping was built with a looser
/// tolerance than the current config.
#[must_use]
pub fn snap_distance_p95(snapped: &[SnappedCrash], tolerance_m: f64) -> CheckResult {
    let mut distances: Vec<f64> = snapped
        .iter()
        .filter(|c| c.matched)
        .filter_map(|c| c.distance_m)
        .collect();
    distances.sort_by(f64::total_cmp);

    match stats::quantile_sorted(&distances, 0.95) {
        None => CheckResult::pass("snap_distance_p95", "no matched crashes"),
        Some(p95) if p95 > tolerance_m => CheckResult::warn(
            "snap_distance_p95",
            format!("p95 distance {p95:.1} m exceeds tolerance {tolerance_m} m"),
        ),
        Some(p95) => CheckResult::pass(
            "snap_distance_p95",
            format!("p95 distance {p95:.1} m within {tolerance_m} m"),
        ),
    }
}

/// Share of people linked to an intersection through their crash.
///
/// Warns below `pass_rate`. An absent people table is skipped.
#[must_use]
pub fn people_link_rate(people: &[LinkedPerson], pass_rate: f64) -> CheckResult {
    if people.is_empty() {
        return CheckResult::pass("people_link_rate", "no linked people, skipped");
    }
    let linked = people.iter().filter(|p| p.intersection_id.is_some()).count();
    #[allow(clippy::cast_precision_loss)]
    let rate = linked as f64 / people.len() as f64;
    let detail = format!(
        "{linked}/{} people linked ({:.1}%, expected >= {:.0}%)",
        people.len(),
        rate * 100.0,
        pass_rate * 100.0
    );
    if rate >= pass_rate {
        CheckResult::pass("people_link_rate", detail)
    } else {
        CheckResult::warn("people_link_rate", detail)
    }
}

#[derive(Default)]
struct Timeline {
    crashes: Vec<(NaiveDateTime, u32)>,
    injuries: Vec<(NaiveDateTime, InjurySeverity)>,
}

impl Timeline {
    /// Straight recount over `[start, cutoff)`.
    fn recount(&self, start: NaiveDateTime, cutoff: NaiveDateTime) -> WindowAggregate {
        let inside = |ts: NaiveDateTime| start <= ts && ts < cutoff;
        let mut agg = WindowAggregate::default();
        for &(ts, severity) in &self.crashes {
            if inside(ts) {
                agg.crashes += 1;
                agg.severity += severity;
            }
        }
        for &(ts, injury) in &self.injuries {
            if inside(ts) {
                agg.injuries_total += 1;
                match injury {
                    InjurySeverity::Fatal => agg.injuries_fatal += 1,
                    InjurySeverity::Incapacitating => agg.injuries_incapacitating += 1,
                    InjurySeverity::NonIncapacitating => agg.injuries_nonincap += 1,
                    InjurySeverity::ReportedNotEvident
                    | InjurySeverity::NoIndication
                    | InjurySeverity::Other => {}
                }
            }
        }
        agg
    }
}

/// Recounts every row's history and recent aggregates from the mapping
/// using strict `< cutoff` and compares them with the table.
#[must_use]
pub fn window_disjointness(
    rows: &[FeatureRow],
    snapped: &[SnappedCrash],
    people: &[LinkedPerson],
    windows: &WindowConfig,
) -> CheckResult {
    let mut timelines: HashMap<i64, Timeline> = HashMap::new();
    for crash in snapped {
        if let Some(id) = crash.intersection_id() {
            timelines
                .entry(id)
                .or_default()
                .crashes
                .push((crash.occurred_at, crash.severity_weight()));
        }
    }
    for person in people {
        if let (Some(id), Some(ts), Some(injury)) = (
            person.intersection_id,
            person.occurred_at,
            person.injury_classification,
        ) {
            timelines.entry(id).or_default().injuries.push((ts, injury));
        }
    }

    let empty = Timeline::default();
    let mut mismatches = 0usize;
    let mut first = None;
    for row in rows {
        let cutoff = row.cutoff();
        let timeline = timelines.get(&row.intersection_id).unwrap_or(&empty);
        let history = timeline.recount(cutoff - Duration::days(windows.history_days), cutoff);
        let recent = timeline.recount(cutoff - Duration::days(windows.recent_days), cutoff);
        if history != row.history() || recent != row.recent() {
            mismatches += 1;
            if first.is_none() {
                first = Some(format!(
                    "intersection {} at {}: table {:?}, recount {history:?}",
                    row.intersection_id,
                    row.cutoff_date,
                    row.history()
                ));
            }
        }
    }

    match first {
        None => CheckResult::pass(
            "window_disjointness",
            format!("{} rows recount identically before their cutoff", rows.len()),
        ),
        Some(example) => CheckResult::fail(
            "window_disjointness",
            format!("{mismatches} rows differ from the recount, e.g. {example}"),
        ),
    }
}

/// Flags model input columns that could carry label-window information.
#[must_use]
pub fn leakage_audit(columns: &[&str]) -> CheckResult {
    let leaking: Vec<&str> = columns
        .iter()
        .copied()
        .filter(|c| {
            let lower = c.to_ascii_lowercase();
            lower.starts_with("future_") || lower.contains("predict")
        })
        .collect();
    if leaking.is_empty() {
        CheckResult::pass(
            "leakage_audit",
            format!("{} model inputs, none future-derived", columns.len()),
        )
    } else {
        CheckResult::fail(
            "leakage_audit",
            format!("future-derived model inputs: {}", leaking.join(", ")),
        )
    }
}

/// Value ranges, row keys, and per-cutoff label prevalence.
#[must_use]
pub fn distribution_checks(rows: &[FeatureRow], config: &ValidationConfig) -> Vec<CheckResult> {
    if rows.is_empty() {
        return vec![CheckResult::fail("feature_rows", "feature table is empty")];
    }

    let negative = rows
        .iter()
        .filter(|r| r.model_inputs().iter().any(|v| !v.is_finite() || *v < 0.0))
        .count();
    let not_nested = rows
        .iter()
        .filter(|r| r.recent90_crashes > r.hist_crashes || r.recent90_severity > r.hist_severity)
        .count();
    let ranges = if negative > 0 {
        CheckResult::fail(
            "value_ranges",
            format!("{negative} rows have negative or non-finite inputs"),
        )
    } else if not_nested > 0 {
        CheckResult::fail(
            "value_ranges",
            format!("{not_nested} rows count more recent than history crashes"),
        )
    } else {
        CheckResult::pass("value_ranges", "all inputs finite and non-negative")
    };

    let out_of_order = rows
        .windows(2)
        .filter(|w| (w[0].cutoff_date, w[0].intersection_id) >= (w[1].cutoff_date, w[1].intersection_id))
        .count();
    let keys = if out_of_order == 0 {
        CheckResult::pass(
            "row_keys",
            "rows unique and sorted by cutoff, intersection",
        )
    } else {
        CheckResult::fail(
            "row_keys",
            format!("{out_of_order} adjacent rows duplicated or out of order"),
        )
    };

    let mut per_cutoff: BTreeMap<NaiveDate, (usize, usize)> = BTreeMap::new();
    for row in rows {
        let entry = per_cutoff.entry(row.cutoff_date).or_default();
        entry.0 += 1;
        entry.1 += usize::from(row.is_hotspot());
    }
    let mut status = CheckStatus::Pass;
    let mut parts = Vec::with_capacity(per_cutoff.len());
    for (cutoff, (total, positives)) in &per_cutoff {
        #[allow(clippy::cast_precision_loss)]
        let prevalence = *positives as f64 / *total as f64;
        let this = if *positives == 0 || positives == total {
            CheckStatus::Fail
        } else if (config.prevalence_min..=config.prevalence_max).contains(&prevalence) {
            CheckStatus::Pass
        } else {
            CheckStatus::Warn
        };
        status = status.max(this);
        parts.push(format!("{cutoff} {:.1}%", prevalence * 100.0));
    }
    let prevalence = CheckResult::new(
        "label_prevalence",
        status,
        format!(
            "band [{:.0}%, {:.0}%]: {}",
            config.prevalence_min * 100.0,
            config.prevalence_max * 100.0,
            parts.join(", ")
        ),
    );

    vec![ranges, keys, prevalence]
}

/// Cross-file consistency between the feature table, the network, and
/// the crash mapping.
#[must_use]
pub fn consistency_checks(
    rows: &[FeatureRow],
    network_nodes: &HashSet<i64>,
    snapped: &[SnappedCrash],
) -> Vec<CheckResult> {
    let feature_nodes: HashSet<i64> = rows.iter().map(|r| r.intersection_id).collect();

    let orphans = feature_nodes
        .iter()
        .filter(|id| !network_nodes.contains(id))
        .count();
    let in_network = if orphans == 0 {
        CheckResult::pass(
            "feature_nodes_in_network",
            format!("{} feature intersections all in the network", feature_nodes.len()),
        )
    } else {
        CheckResult::fail(
            "feature_nodes_in_network",
            format!("{orphans} feature intersections missing from the network"),
        )
    };

    let crash_nodes: HashSet<i64> = snapped
        .iter()
        .filter_map(SnappedCrash::intersection_id)
        .collect();
    let uncovered = crash_nodes.difference(&feature_nodes).count();
    let covered = if uncovered == 0 {
        CheckResult::pass(
            "crash_nodes_covered",
            format!("{} crash intersections all have feature rows", crash_nodes.len()),
        )
    } else {
        CheckResult::warn(
            "crash_nodes_covered",
            format!(
                "{uncovered} of {} crash intersections have no feature row",
                crash_nodes.len()
            ),
        )
    };

    vec![in_network, covered]
}

#[cfg(test)]
mod tests {
    use crash_hotspots_feature_models::MODEL_FEATURES;

    use super::*;
    use crate::tests::{at, feature_row, snapped};

    fn cutoff() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    #[test]
    fn match_flag_must_follow_distance() {
        let mut lying = snapped("b", 2, at(2023, 5, 1), 90.0);
        lying.matched = true;
        let crashes = vec![snapped("a", 1, at(2023, 5, 1), 10.0), lying];

        let results = snap_checks(&crashes, 70.0, None, &ValidationConfig::default());
        assert_eq!(results[0].status, CheckStatus::Fail);
        assert!(results[0].detail.contains("(first: b)"));
    }

    #[test]
    fn match_rate_bands() {
        let config = ValidationConfig::default();
        let crashes = |matched: usize| -> Vec<SnappedCrash> {
            (0..100)
                .map(|i| {
                    let d = if i < matched { 10.0 } else { 100.0 };
                    snapped(&i.to_string(), 1, at(2023, 1, 1), d)
                })
                .collect()
        };
        let status = |n| snap_checks(&crashes(n), 70.0, None, &config)[1].status;
        assert_eq!(status(90), CheckStatus::Pass);
        assert_eq!(status(80), CheckStatus::Warn);
        assert_eq!(status(60), CheckStatus::Fail);
    }

    #[test]
    fn recorded_run_must_agree() {
        let crashes = vec![snapped("a", 1, at(2023, 5, 1), 10.0)];
        let run = SnapRun {
            tolerance_m: 70.0,
            crash_count: 2,
            matched_count: 1,
            match_rate: 0.5,
            mean_distance_m: Some(10.0),
            median_distance_m: Some(10.0),
            p95_distance_m: Some(10.0),
            node_count: 1,
        };
        let results = snap_checks(&crashes, 70.0, Some(&run), &ValidationConfig::default());
        assert_eq!(results[2].name, "snap_run_record");
        assert_eq!(results[2].status, CheckStatus::Fail);
    }

    #[test]
    fn snapping_must_keep_every_cleaned_crash() {
        assert_eq!(clean_snap_row_count(Some(3), 3).status, CheckStatus::Pass);
        let dropped = clean_snap_row_count(Some(3), 2);
        assert_eq!(dropped.status, CheckStatus::Fail);
        assert_eq!(dropped.detail, "3 cleaned crashes but 2 mapped");
        assert_eq!(clean_snap_row_count(None, 2).status, CheckStatus::Warn);
    }

    #[test]
    fn p95_beyond_configured_tolerance_warns() {
        let crashes: Vec<SnappedCrash> = (0..20)
            .map(|i| snapped(&i.to_string(), 1, at(2023, 1, 1), f64::from(i) * 3.0))
            .collect();
        let within = snap_distance_p95(&crashes, 70.0);
        assert_eq!(within.status, CheckStatus::Pass);

        let loose = snap_distance_p95(&crashes, 50.0);
        assert_eq!(loose.status, CheckStatus::Warn);
        assert!(loose.detail.starts_with("p95 distance 54."));

        assert_eq!(snap_distance_p95(&[], 70.0).status, CheckStatus::Pass);
    }

    #[test]
    fn people_link_rate_band() {
        let person = |id: usize, linked: bool| LinkedPerson {
            person_id: format!("P{id}"),
            crash_record_id: format!("c{id}"),
            injury_classification: None,
            occurred_at: Some(at(2023, 5, 1)),
            intersection_id: linked.then_some(1),
        };
        let people = |linked: usize| -> Vec<LinkedPerson> {
            (0..20).map(|i| person(i, i < linked)).collect()
        };

        assert_eq!(people_link_rate(&people(18), 0.85).status, CheckStatus::Pass);
        let low = people_link_rate(&people(15), 0.85);
        assert_eq!(low.status, CheckStatus::Warn);
        assert!(low.detail.starts_with("15/20 people linked (75.0%"));
        assert_eq!(people_link_rate(&[], 0.85).status, CheckStatus::Pass);
    }

    #[test]
    fn crash_at_cutoff_is_not_history() {
        let midnight = cutoff().and_hms_opt(0, 0, 0).unwrap();
        let crashes = vec![
            snapped("a", 1, at(2023, 12, 1), 10.0),
            snapped("b", 1, midnight, 10.0),
        ];
        let windows = WindowConfig::default();

        let honest = vec![feature_row(1, cutoff(), 1, 1, 1, 1)];
        assert_eq!(
            window_disjointness(&honest, &crashes, &[], &windows).status,
            CheckStatus::Pass
        );

        let leaky = vec![feature_row(1, cutoff(), 2, 2, 1, 1)];
        let result = window_disjointness(&leaky, &crashes, &[], &windows);
        assert_eq!(result.status, CheckStatus::Fail);
        assert!(result.detail.starts_with("1 rows"));
    }

    #[test]
    fn injuries_are_recounted() {
        let crash = snapped("a", 1, at(2023, 12, 1), 10.0);
        let person = LinkedPerson {
            person_id: "p".to_string(),
            crash_record_id: "a".to_string(),
            injury_classification: Some(InjurySeverity::Fatal),
            occurred_at: Some(crash.occurred_at),
            intersection_id: Some(1),
        };
        let row = feature_row(1, cutoff(), 1, 1, 0, 0);
        let result = window_disjointness(&[row], &[crash], &[person], &WindowConfig::default());
        assert_eq!(result.status, CheckStatus::Fail);
    }

    #[test]
    fn model_features_do_not_leak() {
        assert_eq!(leakage_audit(MODEL_FEATURES).status, CheckStatus::Pass);
        let result = leakage_audit(&["hist_crashes", "future_crashes", "predicted_prob"]);
        assert_eq!(result.status, CheckStatus::Fail);
        assert!(result.detail.contains("future_crashes, predicted_prob"));
    }

    #[test]
    fn prevalence_band() {
        let config = ValidationConfig::default();
        let rows = |positives: i64| -> Vec<FeatureRow> {
            (1..=20)
                .map(|id| feature_row(id, cutoff(), 1, 0, 1, u8::from(id <= positives)))
                .collect()
        };
        let status = |n| distribution_checks(&rows(n), &config)[2].status;
        assert_eq!(status(2), CheckStatus::Pass);
        assert_eq!(status(5), CheckStatus::Warn);
        assert_eq!(status(0), CheckStatus::Fail);
        assert_eq!(status(20), CheckStatus::Fail);
    }

    #[test]
    fn ranges_and_keys() {
        let config = ValidationConfig::default();
        let mut rows = vec![
            feature_row(1, cutoff(), 1, 0, 1, 1),
            feature_row(2, cutoff(), 1, 0, 1, 0),
        ];
        let ok = distribution_checks(&rows, &config);
        assert_eq!(ok[0].status, CheckStatus::Pass);
        assert_eq!(ok[1].status, CheckStatus::Pass);

        rows[0].acs_median_income = -1.0;
        rows.swap(0, 1);
        let bad = distribution_checks(&rows, &config);
        assert_eq!(bad[0].status, CheckStatus::Fail);
        assert_eq!(bad[1].status, CheckStatus::Fail);

        assert_eq!(
            distribution_checks(&[], &config)[0].status,
            CheckStatus::Fail
        );
    }

    #[test]
    fn consistency_across_files() {
        let rows = vec![feature_row(1, cutoff(), 1, 0, 1, 1)];
        let crashes = vec![
            snapped("a", 1, at(2023, 5, 1), 10.0),
            snapped("b", 7, at(2020, 5, 1), 10.0),
            snapped("c", 8, at(2023, 5, 1), 500.0),
        ];
        let network: HashSet<i64> = [1, 7].into_iter().collect();
        let results = consistency_checks(&rows, &network, &crashes);
        assert_eq!(results[0].status, CheckStatus::Pass);
        assert_eq!(results[1].status, CheckStatus::Warn);
        assert!(results[1].detail.starts_with("1 of 2"));

        let empty_network = HashSet::new();
        assert_eq!(
            consistency_checks(&rows, &empty_network, &crashes)[0].status,
            CheckStatus::Fail
        );
    }
}
