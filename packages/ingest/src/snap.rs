//! Crash-to-intersection snapping and people linking.

use std::collections::HashMap;
use std::sync::Arc;

use crash_hotspots_config::progress::ProgressCallback;
use crash_hotspots_config::stats;
use crash_hotspots_crash_models::{
    CrashRecord, LinkedPerson, PersonRecord, SnapRun, SnappedCrash,
};
use crash_hotspots_spatial::snap::Snapper;

/// Snaps every crash to its nearest node.
///
/// Unmatched crashes stay in the output with their nearest node and
/// distance so the tolerance can be audited later.
#[must_use]
pub fn snap_crashes(
    crashes: &[CrashRecord],
    snapper: &Snapper,
    progress: &Arc<dyn ProgressCallback>,
) -> Vec<SnappedCrash> {
    progress.set_total(crashes.len() as u64);
    progress.set_message("snapping crashes".to_string());

    let snapped = crashes
        .iter()
        .map(|crash| {
            let result = snapper.snap(crash.x, crash.y);
            progress.inc(1);
            SnappedCrash {
                crash_record_id: crash.crash_record_id.clone(),
                occurred_at: crash.occurred_at,
                most_severe_injury: crash.most_severe_injury,
                injuries_total: crash.injuries_total,
                injuries_fatal: crash.injuries_fatal,
                injuries_incapacitating: crash.injuries_incapacitating,
                nearest_node_id: result.map(|r| r.node_id),
                distance_m: result.map(|r| r.distance_m),
                matched: result.is_some_and(|r| r.matched),
            }
        })
        .collect();

    progress.finish_and_clear();
    snapped
}

/// Summarizes a snapping run.
///
/// Distance statistics cover matched crashes only.
#[must_use]
pub fn summarize(snapped: &[SnappedCrash], tolerance_m: f64, node_count: usize) -> SnapRun {
    let mut distances: Vec<f64> = snapped
        .iter()
        .filter(|c| c.matched)
        .filter_map(|c| c.distance_m)
        .collect();
    distances.sort_by(f64::total_cmp);

    let matched_count = distances.len();
    let crash_count = snapped.len();
    #[allow(clippy::cast_precision_loss)]
    let match_rate = if crash_count == 0 {
        0.0
    } else {
        matched_count as f64 / crash_count as f64
    };

    SnapRun {
        tolerance_m,
        crash_count,
        matched_count,
        match_rate,
        mean_distance_m: stats::mean(&distances),
        median_distance_m: stats::quantile_sorted(&distances, 0.5),
        p95_distance_m: stats::quantile_sorted(&distances, 0.95),
        node_count,
    }
}

/// Links people to intersections through their crash.
///
/// People whose crash was dropped during cleaning keep `occurred_at` and
/// `intersection_id` empty; people of unmatched crashes keep the
/// timestamp but no intersection.
#[must_use]
pub fn link_people(people: &[PersonRecord], snapped: &[SnappedCrash]) -> Vec<LinkedPerson> {
    let by_crash: HashMap<&str, &SnappedCrash> = snapped
        .iter()
        .map(|c| (c.crash_record_id.as_str(), c))
        .collect();

    let linked: Vec<LinkedPerson> = people
        .iter()
        .map(|person| {
            let crash = by_crash.get(person.crash_record_id.as_str());
            LinkedPerson {
                person_id: person.person_id.clone(),
                crash_record_id: person.crash_record_id.clone(),
                injury_classification: person.injury_classification,
                occurred_at: crash.map(|c| c.occurred_at),
                intersection_id: crash.and_then(|c| c.intersection_id()),
            }
        })
        .collect();

    let attached = linked.iter().filter(|p| p.intersection_id.is_some()).count();
    log::info!(
        "Linked {attached} of {} people to intersections",
        linked.len()
    );
    linked
}
