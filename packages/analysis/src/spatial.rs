//! Spatial statistics stage over the latest snapshot.

use std::collections::{BTreeMap, HashMap};

use crash_hotspots_analysis_models::{
    CommunitySummary, LisaQuadrant, LisaRow, Prediction, SpatialStats,
};
use crash_hotspots_config::PipelineConfig;
use crash_hotspots_config::paths::DataPaths;
use crash_hotspots_config::table;
use crash_hotspots_feature_models::FeatureRow;
use crash_hotspots_network_models::RoadNode;
use strum::IntoEnumIterator as _;

use crate::inequality;
use crate::moran::{global_moran, local_moran};
use crate::weights::KnnWeights;
use crate::{AnalysisError, latest_snapshot, load_features, read_optional_csv};

/// Column whose spatial clustering is measured.
pub const VARIABLE: &str = "hist_crashes";

#[derive(Debug, Clone, PartialEq)]
pub struct SpatialOutputs {
    pub stats: SpatialStats,
    /// One row per located intersection, by id.
    pub lisa: Vec<LisaRow>,
    pub communities: Vec<CommunitySummary>,
}

/// Computes Moran's I, LISA clusters, and inequality summaries.
///
/// Intersections without a network node are left out of the weights.
///
/// # Errors
///
/// Returns [`AnalysisError::Insufficient`] if there are fewer than three
/// located intersections or the variable is constant across them.
pub fn analyze(
    rows: &[FeatureRow],
    nodes: &[RoadNode],
    predictions: &[Prediction],
    config: &PipelineConfig,
) -> Result<SpatialOutputs, AnalysisError> {
    let Some((cutoff_date, mut latest)) = latest_snapshot(rows) else {
        return Err(AnalysisError::insufficient("feature table is empty"));
    };
    latest.sort_by_key(|r| r.intersection_id);

    let positions: HashMap<i64, [f64; 2]> =
        nodes.iter().map(|n| (n.node_id, [n.x, n.y])).collect();
    let located: Vec<(&FeatureRow, [f64; 2])> = latest
        .iter()
        .filter_map(|r| positions.get(&r.intersection_id).map(|p| (*r, *p)))
        .collect();
    if located.len() < latest.len() {
        log::warn!(
            "{} of {} intersections have no network node and are skipped",
            latest.len() - located.len(),
            latest.len()
        );
    }

    let points: Vec<[f64; 2]> = located.iter().map(|(_, p)| *p).collect();
    let values: Vec<f64> = located
        .iter()
        .map(|(r, _)| f64::from(r.hist_crashes))
        .collect();
    let spatial = &config.spatial;
    let weights = KnnWeights::new(&points, spatial.k_neighbors);

    let moran = global_moran(&values, &weights, spatial.permutations, spatial.seed).ok_or_else(
        || {
            AnalysisError::insufficient(format!(
                "{VARIABLE} needs at least 3 located intersections with varying values at {cutoff_date}"
            ))
        },
    )?;
    log::info!(
        "Global Moran's I for {VARIABLE} at {cutoff_date}: {:.4} (E[I] {:.4}, p {:.4})",
        moran.i,
        moran.expected_i,
        moran.p_value
    );

    let local = local_moran(&values, &weights, spatial.permutations, spatial.seed);
    let lisa: Vec<LisaRow> = located
        .iter()
        .zip(&local)
        .map(|((row, _), l)| LisaRow {
            intersection_id: row.intersection_id,
            value: f64::from(row.hist_crashes),
            local_i: l.local_i,
            quadrant: l.quadrant,
            p_value: l.p_value,
            cluster: (l.p_value < spatial.significance).then_some(l.quadrant),
        })
        .collect();

    let mut clusters: BTreeMap<String, usize> = LisaQuadrant::iter()
        .map(|q| (q.to_string(), 0))
        .collect();
    for quadrant in lisa.iter().filter_map(|l| l.cluster) {
        *clusters.entry(quadrant.to_string()).or_default() += 1;
    }
    log::info!("Significant LISA clusters: {clusters:?}");

    let predicted: HashMap<i64, u8> = predictions
        .iter()
        .map(|p| (p.intersection_id, p.predicted_hotspot))
        .collect();
    let communities = inequality::community_summaries(&latest, &predicted);
    let community_gini = inequality::community_gini(&communities);
    let income_quintiles = inequality::income_quintiles(&latest);
    if let Some(g) = community_gini {
        log::info!(
            "Crash Gini across {} community areas: {g:.3}",
            communities.len()
        );
    }

    Ok(SpatialOutputs {
        stats: SpatialStats {
            cutoff_date,
            variable: VARIABLE.to_string(),
            intersections: located.len(),
            k_neighbors: spatial.k_neighbors,
            moran,
            significance: spatial.significance,
            clusters,
            community_gini,
            income_quintiles,
        },
        lisa,
        communities,
    })
}

/// Runs the spatial stage.
///
/// Predictions are optional; without them every community reports zero
/// predicted hotspots. Writes `lisa.csv`, `spatial_stats.json`, and
/// `community_areas.csv`.
///
/// # Errors
///
/// Returns [`AnalysisError`] if the feature or node table is missing, the
/// snapshot cannot support the statistics, or an output cannot be written.
pub fn run(paths: &DataPaths, config: &PipelineConfig) -> Result<SpatialOutputs, AnalysisError> {
    let rows = load_features(&paths.features_temporal())?;
    let nodes = crash_hotspots_network::load_nodes(&paths.osm_nodes())?;
    let predictions: Vec<Prediction> = read_optional_csv(&paths.all_predictions())?;

    let outputs = analyze(&rows, &nodes, &predictions, config)?;

    table::write_csv(&paths.lisa(), &outputs.lisa)?;
    table::write_json(&paths.spatial_stats(), &outputs.stats)?;
    table::write_csv(&paths.community_summary(), &outputs.communities)?;
    log::info!(
        "Wrote spatial statistics for {} intersections to {}",
        outputs.stats.intersections,
        paths.results_dir().display()
    );
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use crate::tests::{cutoff, feature_row, fixture_nodes, fixture_rows};

    use super::*;

    fn config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.spatial.k_neighbors = 3;
        config.spatial.permutations = 199;
        config
    }

    #[test]
    fn busy_cluster_is_high_high() {
        let out = analyze(&fixture_rows(), &fixture_nodes(), &[], &config()).unwrap();
        assert_eq!(out.stats.cutoff_date, cutoff(5));
        assert_eq!(out.stats.intersections, 40);
        assert!(out.stats.moran.i > 0.5);
        assert!(out.stats.moran.p_value < 0.05);

        assert_eq!(out.lisa.len(), 40);
        assert_eq!(out.lisa[0].quadrant, LisaQuadrant::HighHigh);
        assert_eq!(out.lisa[0].cluster, Some(LisaQuadrant::HighHigh));
        assert!(out.stats.clusters["HH"] >= 1);
        assert_eq!(out.stats.clusters.len(), 4);
    }

    #[test]
    fn communities_and_quintiles_use_latest_snapshot() {
        let predictions: Vec<Prediction> = (0..40)
            .map(|id| Prediction {
                intersection_id: id,
                predicted_probability: 0.5,
                predicted_hotspot: u8::from(id < 4),
            })
            .collect();
        let out = analyze(&fixture_rows(), &fixture_nodes(), &predictions, &config()).unwrap();

        assert_eq!(out.communities.len(), 2);
        let north = out
            .communities
            .iter()
            .find(|c| c.community_id == "8")
            .unwrap();
        assert_eq!(north.intersections, 20);
        assert_eq!(north.hotspots, 10);
        assert_eq!(north.predicted_hotspots, 4);
        assert!(out.stats.community_gini.unwrap() > 0.0);

        // Incomes rise with id, so the poorest quintile holds the hotspots.
        let q = &out.stats.income_quintiles;
        assert_eq!(q.len(), 5);
        assert!((q[0].hotspot_rate - 1.0).abs() < 1e-12);
        assert_eq!(q[4].hotspots, 0);
    }

    #[test]
    fn unlocated_rows_are_skipped_and_constant_values_rejected() {
        let rows: Vec<FeatureRow> = (0..5).map(|id| feature_row(id, cutoff(0), 2, false)).collect();
        let err = analyze(&rows, &fixture_nodes(), &[], &config()).unwrap_err();
        assert!(matches!(err, AnalysisError::Insufficient { .. }));

        let mut rows = fixture_rows();
        rows.push(feature_row(999, cutoff(5), 4, false));
        let out = analyze(&rows, &fixture_nodes(), &[], &config()).unwrap();
        assert_eq!(out.stats.intersections, 40);
    }

    #[test]
    fn run_writes_outputs_without_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path());
        table::write_csv(&paths.features_temporal(), &fixture_rows()).unwrap();
        table::write_csv(&paths.osm_nodes(), &fixture_nodes()).unwrap();

        let out = run(&paths, &config()).unwrap();
        let lisa: Vec<LisaRow> = table::read_csv(&paths.lisa()).unwrap();
        assert_eq!(lisa, out.lisa);
        let stats: SpatialStats = table::read_json(&paths.spatial_stats()).unwrap();
        assert_eq!(stats.clusters, out.stats.clusters);
        let communities: Vec<CommunitySummary> =
            table::read_csv(&paths.community_summary()).unwrap();
        assert!(communities.iter().all(|c| c.predicted_hotspots == 0));
    }
}
