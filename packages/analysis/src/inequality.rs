//! Community-area summaries, Gini coefficient, and hotspot rates by
//! median-income quintile.

use std::collections::{BTreeMap, HashMap};

use crash_hotspots_analysis_models::{CommunitySummary, QuintileRate};
use crash_hotspots_config::stats;
use crash_hotspots_feature_models::{FeatureRow, UNKNOWN};

/// Gini coefficient of non-negative values. `None` when empty or all zero.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn gini(values: &[f64]) -> Option<f64> {
    let total: f64 = values.iter().sum();
    if values.is_empty() || total <= 0.0 {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len() as f64;
    let weighted: f64 = sorted
        .iter()
        .enumerate()
        .map(|(i, v)| (2.0 * (i as f64 + 1.0) - n - 1.0) * v)
        .sum();
    Some(weighted / (n * total))
}

#[allow(clippy::cast_precision_loss)]
fn rate(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Per-community totals over one snapshot's rows, busiest first.
///
/// `predicted` maps intersection ids to the predicted hotspot flag.
#[must_use]
pub fn community_summaries(
    rows: &[&FeatureRow],
    predicted: &HashMap<i64, u8>,
) -> Vec<CommunitySummary> {
    #[derive(Default)]
    struct Acc {
        name: String,
        intersections: usize,
        crashes: u64,
        hotspots: usize,
        predicted: usize,
        incomes: Vec<f64>,
    }

    let mut groups: BTreeMap<&str, Acc> = BTreeMap::new();
    for row in rows {
        let acc = groups.entry(row.community_id.as_str()).or_default();
        if acc.name.is_empty() {
            acc.name.clone_from(&row.community_name);
        }
        acc.intersections += 1;
        acc.crashes += u64::from(row.hist_crashes);
        acc.hotspots += usize::from(row.is_hotspot());
        acc.predicted += usize::from(predicted.get(&row.intersection_id).copied() == Some(1));
        if row.acs_median_income_missing == 0 {
            acc.incomes.push(row.acs_median_income);
        }
    }

    let mut out: Vec<CommunitySummary> = groups
        .into_iter()
        .map(|(id, acc)| CommunitySummary {
            community_id: id.to_string(),
            community_name: acc.name,
            intersections: acc.intersections,
            crashes: acc.crashes,
            hotspots: acc.hotspots,
            hotspot_rate: rate(acc.hotspots, acc.intersections),
            predicted_hotspots: acc.predicted,
            median_income: stats::median(&acc.incomes),
        })
        .collect();
    out.sort_by(|a, b| {
        b.crashes
            .cmp(&a.crashes)
            .then_with(|| a.community_id.cmp(&b.community_id))
    });
    out
}

/// Gini of crash counts across known community areas.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn community_gini(summaries: &[CommunitySummary]) -> Option<f64> {
    let crashes: Vec<f64> = summaries
        .iter()
        .filter(|s| s.community_id != UNKNOWN)
        .map(|s| s.crashes as f64)
        .collect();
    gini(&crashes)
}

/// Hotspot rate per median-income quintile over rows with an observed
/// (not imputed) income. Quintiles are equal-count rank groups.
#[must_use]
pub fn income_quintiles(rows: &[&FeatureRow]) -> Vec<QuintileRate> {
    let mut observed: Vec<&FeatureRow> = rows
        .iter()
        .copied()
        .filter(|r| r.acs_median_income_missing == 0)
        .collect();
    observed.sort_by(|a, b| {
        a.acs_median_income
            .total_cmp(&b.acs_median_income)
            .then(a.intersection_id.cmp(&b.intersection_id))
    });

    let n = observed.len();
    let mut buckets: [Vec<&FeatureRow>; 5] = Default::default();
    for (rank, row) in observed.into_iter().enumerate() {
        buckets[rank * 5 / n].push(row);
    }

    buckets
        .iter()
        .zip(1u8..)
        .filter_map(|(bucket, quintile)| {
            let first = bucket.first()?;
            let last = bucket.last()?;
            let hotspots = bucket.iter().filter(|r| r.is_hotspot()).count();
            Some(QuintileRate {
                quintile,
                income_min: first.acs_median_income,
                income_max: last.acs_median_income,
                intersections: bucket.len(),
                hotspots,
                hotspot_rate: rate(hotspots, bucket.len()),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn row(id: i64, community: &str, crashes: u32, hot: bool, income: Option<f64>) -> FeatureRow {
        FeatureRow {
            intersection_id: id,
            cutoff_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            hist_crashes: crashes,
            hist_severity: crashes,
            hist_injuries_total: 0,
            hist_injuries_fatal: 0,
            hist_injuries_incapacitating: 0,
            hist_injuries_nonincap: 0,
            recent90_crashes: 0,
            recent90_severity: 0,
            recent90_injuries_total: 0,
            recent90_injuries_fatal: 0,
            recent90_injuries_incapacitating: 0,
            recent90_injuries_nonincap: 0,
            future_crashes: u32::from(hot),
            future_severity: u32::from(hot),
            centrality_degree: 0.0,
            centrality_closeness: 0.0,
            centrality_betweenness: 0.0,
            geoid: UNKNOWN.to_string(),
            acs_pop: 0.0,
            acs_median_income: income.unwrap_or(50_000.0),
            acs_households_with_vehicle: 0.0,
            acs_poverty_universe: 0.0,
            acs_vehicle_access_rate: 0.0,
            acs_pop_missing: 0,
            acs_median_income_missing: u8::from(income.is_none()),
            acs_households_with_vehicle_missing: 0,
            acs_poverty_universe_missing: 0,
            acs_vehicle_access_rate_missing: 0,
            community_id: community.to_string(),
            community_name: format!("AREA {community}"),
            label_hotspot: u8::from(hot),
        }
    }

    #[test]
    fn gini_extremes() {
        assert!(gini(&[5.0, 5.0, 5.0, 5.0]).unwrap().abs() < 1e-12);
        // One area holds everything: (n - 1) / n.
        assert!((gini(&[0.0, 0.0, 0.0, 8.0]).unwrap() - 0.75).abs() < 1e-12);
        assert!(gini(&[0.0, 0.0]).is_none());
        assert!(gini(&[]).is_none());
    }

    #[test]
    fn communities_are_summarized_busiest_first() {
        let rows = [
            row(1, "8", 2, false, Some(40_000.0)),
            row(2, "32", 10, true, Some(90_000.0)),
            row(3, "32", 4, false, None),
            row(4, "8", 1, true, Some(60_000.0)),
        ];
        let refs: Vec<&FeatureRow> = rows.iter().collect();
        let predicted: HashMap<i64, u8> = [(2, 1), (3, 1), (4, 0)].into_iter().collect();

        let out = community_summaries(&refs, &predicted);
        assert_eq!(out[0].community_id, "32");
        assert_eq!(out[0].community_name, "AREA 32");
        assert_eq!(out[0].crashes, 14);
        assert_eq!(out[0].predicted_hotspots, 2);
        assert!((out[0].hotspot_rate - 0.5).abs() < 1e-12);
        assert_eq!(out[0].median_income, Some(90_000.0));
        assert_eq!(out[1].median_income, Some(50_000.0));
    }

    #[test]
    fn unknown_area_is_left_out_of_gini() {
        let summaries = vec![
            CommunitySummary {
                community_id: "1".to_string(),
                community_name: "A".to_string(),
                intersections: 1,
                crashes: 5,
                hotspots: 0,
                hotspot_rate: 0.0,
                predicted_hotspots: 0,
                median_income: None,
            },
            CommunitySummary {
                community_id: UNKNOWN.to_string(),
                community_name: UNKNOWN.to_string(),
                intersections: 1,
                crashes: 100,
                hotspots: 0,
                hotspot_rate: 0.0,
                predicted_hotspots: 0,
                median_income: None,
            },
        ];
        assert!(community_gini(&summaries).unwrap().abs() < 1e-12);
    }

    #[test]
    fn quintiles_are_equal_rank_groups() {
        let rows: Vec<FeatureRow> = (0..10)
            .map(|i| row(i, "1", 0, i < 2, Some(10_000.0 * (i + 1) as f64)))
            .chain(std::iter::once(row(99, "1", 0, true, None)))
            .collect();
        let refs: Vec<&FeatureRow> = rows.iter().collect();

        let q = income_quintiles(&refs);
        assert_eq!(q.len(), 5);
        assert_eq!(q[0].quintile, 1);
        assert_eq!(q[0].intersections, 2);
        assert!((q[0].hotspot_rate - 1.0).abs() < 1e-12);
        assert!((q[0].income_min - 10_000.0).abs() < 1e-9);
        assert!((q[4].income_max - 100_000.0).abs() < 1e-9);
        assert_eq!(q[4].hotspots, 0);
    }
}
