//! Per-cutoff hotspot labels.

use crash_hotspots_config::{LabelConfig, stats};
use crash_hotspots_feature_models::{FeatureRow, LabelStats};

/// Future-count threshold for one cutoff: the interpolated
/// `1 - top_pct` quantile, floored at `min_threshold`.
#[must_use]
pub fn hotspot_threshold(future_counts: &[f64], config: &LabelConfig) -> f64 {
    stats::quantile(future_counts, 1.0 - config.hotspot_top_pct)
        .map_or(config.min_threshold, |q| q.max(config.min_threshold))
}

/// Labels rows in place, cutoff by cutoff. Ties at the threshold are
/// hotspots.
///
/// Rows must be grouped by cutoff (the feature table is sorted by cutoff
/// then intersection).
pub fn apply_labels(rows: &mut [FeatureRow], config: &LabelConfig) -> Vec<LabelStats> {
    rows.chunk_by_mut(|a, b| a.cutoff_date == b.cutoff_date)
        .map(|group| {
            let counts: Vec<f64> = group.iter().map(|r| f64::from(r.future_crashes)).collect();
            let threshold = hotspot_threshold(&counts, config);

            let mut positives = 0usize;
            for row in group.iter_mut() {
                let hot = f64::from(row.future_crashes) >= threshold;
                row.label_hotspot = u8::from(hot);
                positives += usize::from(hot);
            }

            #[allow(clippy::cast_precision_loss)]
            let prevalence = positives as f64 / group.len() as f64;
            let stats = LabelStats {
                cutoff_date: group[0].cutoff_date,
                rows: group.len(),
                threshold,
                positives,
                prevalence,
            };
            log::info!(
                "Cutoff {}: {} rows, threshold {:.2}, {} hotspots ({:.1}%)",
                stats.cutoff_date,
                stats.rows,
                stats.threshold,
                stats.positives,
                stats.prevalence * 100.0
            );
            stats
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn row(id: i64, cutoff: NaiveDate, future: u32) -> FeatureRow {
        FeatureRow {
            intersection_id: id,
            cutoff_date: cutoff,
            hist_crashes: 0,
            hist_severity: 0,
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
            future_crashes: future,
            future_severity: future,
            centrality_degree: 0.0,
            centrality_closeness: 0.0,
            centrality_betweenness: 0.0,
            geoid: "UNKNOWN".to_string(),
            acs_pop: 0.0,
            acs_median_income: 0.0,
            acs_households_with_vehicle: 0.0,
            acs_poverty_universe: 0.0,
            acs_vehicle_access_rate: 0.0,
            acs_pop_missing: 1,
            acs_median_income_missing: 1,
            acs_households_with_vehicle_missing: 1,
            acs_poverty_universe_missing: 1,
            acs_vehicle_access_rate_missing: 1,
            community_id: "UNKNOWN".to_string(),
            community_name: "UNKNOWN".to_string(),
            label_hotspot: 0,
        }
    }

    #[test]
    fn threshold_is_interpolated_top_decile() {
        let counts: Vec<f64> = (1..=10_i32).map(f64::from).collect();
        let t = hotspot_threshold(&counts, &LabelConfig::default());
        assert!((t - 9.1).abs() < 1e-9);
    }

    #[test]
    fn threshold_is_floored_at_one() {
        let counts = vec![0.0; 20];
        let t = hotspot_threshold(&counts, &LabelConfig::default());
        assert!((t - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn labels_each_cutoff_separately() {
        let first = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let second = NaiveDate::from_ymd_opt(2023, 6, 30).unwrap();
        let mut rows: Vec<FeatureRow> = (1..=10)
            .map(|i| row(i, first, u32::try_from(i).unwrap()))
            .collect();
        rows.extend((1..=10).map(|i| row(i, second, 0)));

        let stats = apply_labels(&mut rows, &LabelConfig::default());

        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].positives, 1);
        assert!(rows[9].is_hotspot());
        assert!(!rows[8].is_hotspot());
        assert_eq!(stats[1].positives, 0);
        assert!(stats[1].prevalence.abs() < f64::EPSILON);
    }

    #[test]
    fn ties_at_threshold_are_hotspots() {
        let cutoff = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let mut rows: Vec<FeatureRow> = (1..=10)
            .map(|i| row(i, cutoff, if i > 7 { 4 } else { 1 }))
            .collect();
        let stats = apply_labels(&mut rows, &LabelConfig::default());
        assert!((stats[0].threshold - 4.0).abs() < 1e-9);
        assert_eq!(stats[0].positives, 3);
    }
}
