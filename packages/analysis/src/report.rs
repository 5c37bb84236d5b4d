//! Markdown report and map layer.

use std::fmt;

use crash_hotspots_analysis_models::{
    ClassifierMetrics, CommunitySummary, LisaRow, ModelMetrics, Prediction, SpatialStats,
    TopPrediction,
};
use crash_hotspots_config::paths::{DataPaths, ensure_parent};
use crash_hotspots_config::table::{self, TableError};
use crash_hotspots_feature_models::ImputationSummary;
use crash_hotspots_validate::ValidationReport;

use crate::layers::intersection_layer;
use crate::{AnalysisError, latest_snapshot, load_features, read_optional_csv, read_optional_json};

/// Rows shown in each ranked table of the report.
const TABLE_ROWS: usize = 10;

/// Everything the report draws on. Absent stages render as a note.
#[derive(Debug, Default, Clone, Copy)]
pub struct Report<'a> {
    pub validation: Option<&'a ValidationReport>,
    pub imputation: Option<&'a ImputationSummary>,
    pub metrics: Option<&'a ModelMetrics>,
    pub top: &'a [TopPrediction],
    pub spatial: Option<&'a SpatialStats>,
    pub communities: &'a [CommunitySummary],
}

fn opt(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.3}"))
}

fn missing(f: &mut fmt::Formatter<'_>, stage: &str) -> fmt::Result {
    writeln!(f, "_Not available. Run `crash_hotspots {stage}` first._")?;
    writeln!(f)
}

fn metrics_row(f: &mut fmt::Formatter<'_>, m: &ClassifierMetrics) -> fmt::Result {
    writeln!(
        f,
        "| {} | {} | {} | {:.4} | {:.3} | {:.3} | {:.3} | {:.3} (k={}) |",
        m.model,
        opt(m.roc_auc),
        opt(m.average_precision),
        m.threshold,
        m.precision,
        m.recall,
        m.f1,
        m.precision_at_k,
        m.k
    )
}

impl Report<'_> {
    fn validation(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "## Validation")?;
        writeln!(f)?;
        let Some(report) = self.validation else {
            return missing(f, "validate");
        };
        writeln!(f, "Overall: **{}**", report.status)?;
        writeln!(f)?;
        writeln!(f, "| Check | Status | Detail |")?;
        writeln!(f, "|---|---|---|")?;
        for check in &report.checks {
            writeln!(f, "| {} | {} | {} |", check.name, check.status, check.detail)?;
        }
        writeln!(f)
    }

    fn imputation(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "## Imputation")?;
        writeln!(f)?;
        let Some(summary) = self.imputation else {
            return missing(f, "features");
        };
        writeln!(f, "{} feature rows.", summary.rows)?;
        writeln!(f)?;
        writeln!(f, "| Column | Strategy | Missing | Fill |")?;
        writeln!(f, "|---|---|---:|---|")?;
        for column in summary.columns.iter().filter(|c| c.missing > 0) {
            writeln!(
                f,
                "| {} | {} | {} | {} |",
                column.column, column.strategy, column.missing, column.fill_value
            )?;
        }
        writeln!(f)
    }

    fn model(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "## Hotspot model")?;
        writeln!(f)?;
        let Some(metrics) = self.metrics else {
            return missing(f, "model");
        };
        let split = &metrics.split;
        writeln!(
            f,
            "Chronological split: {} train / {} validation / {} test rows \
             ({} / {} / {} cutoff periods).",
            split.train_rows,
            split.validation_rows,
            split.test_rows,
            split.train_cutoffs.len(),
            split.validation_cutoffs.len(),
            split.test_cutoffs.len()
        )?;
        writeln!(f)?;
        writeln!(
            f,
            "| Model | ROC AUC | Avg. precision | Threshold | Precision | Recall | F1 | Precision@k |"
        )?;
        writeln!(f, "|---|---:|---:|---:|---:|---:|---:|---:|")?;
        metrics_row(f, &metrics.logistic)?;
        metrics_row(f, &metrics.baseline)?;
        writeln!(f)?;

        let mut coefficients: Vec<_> = metrics.coefficients.iter().collect();
        coefficients.sort_by(|a, b| b.weight.abs().total_cmp(&a.weight.abs()));
        writeln!(f, "Largest standardized coefficients:")?;
        writeln!(f)?;
        for c in coefficients.iter().take(5) {
            writeln!(f, "- `{}`: {:+.3}", c.feature, c.weight)?;
        }
        writeln!(f)?;

        writeln!(
            f,
            "### Predicted hotspots at {} (threshold {:.4})",
            metrics.prediction_cutoff, metrics.prediction_threshold
        )?;
        writeln!(f)?;
        writeln!(f, "| Intersection | Probability | Past-year crashes | Labeled | Community |")?;
        writeln!(f, "|---:|---:|---:|---:|---|")?;
        for t in self.top.iter().take(TABLE_ROWS) {
            writeln!(
                f,
                "| {} | {:.3} | {} | {} | {} |",
                t.intersection_id, t.predicted_probability, t.hist_crashes, t.label_hotspot, t.community_name
            )?;
        }
        writeln!(f)
    }

    fn spatial(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "## Spatial clustering")?;
        writeln!(f)?;
        let Some(stats) = self.spatial else {
            return missing(f, "spatial");
        };
        let moran = &stats.moran;
        writeln!(
            f,
            "Global Moran's I of `{}` over {} intersections at {} ({} nearest neighbors): \
             **{:.4}** (expected {:.4}, z {}, pseudo p {:.4} from {} permutations).",
            stats.variable,
            stats.intersections,
            stats.cutoff_date,
            stats.k_neighbors,
            moran.i,
            moran.expected_i,
            opt(moran.z_score),
            moran.p_value,
            moran.permutations
        )?;
        writeln!(f)?;
        writeln!(f, "Significant LISA clusters (p < {}):", stats.significance)?;
        writeln!(f)?;
        for (quadrant, count) in &stats.clusters {
            writeln!(f, "- {quadrant}: {count}")?;
        }
        writeln!(f)?;

        writeln!(f, "## Inequality")?;
        writeln!(f)?;
        writeln!(
            f,
            "Gini coefficient of crashes across community areas: **{}**",
            opt(stats.community_gini)
        )?;
        writeln!(f)?;
        writeln!(f, "| Income quintile | Median income range | Intersections | Hotspot rate |")?;
        writeln!(f, "|---:|---|---:|---:|")?;
        for q in &stats.income_quintiles {
            writeln!(
                f,
                "| {} | ${:.0} to ${:.0} | {} | {:.1}% |",
                q.quintile,
                q.income_min,
                q.income_max,
                q.intersections,
                q.hotspot_rate * 100.0
            )?;
        }
        writeln!(f)?;

        writeln!(f, "| Community area | Crashes | Intersections | Hotspot rate | Predicted |")?;
        writeln!(f, "|---|---:|---:|---:|---:|")?;
        for c in self.communities.iter().take(TABLE_ROWS) {
            writeln!(
                f,
                "| {} | {} | {} | {:.1}% | {} |",
                c.community_name,
                c.crashes,
                c.intersections,
                c.hotspot_rate * 100.0,
                c.predicted_hotspots
            )?;
        }
        writeln!(f)
    }
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# Chicago crash hotspots")?;
        writeln!(f)?;
        self.validation(f)?;
        self.imputation(f)?;
        self.model(f)?;
        self.spatial(f)
    }
}

/// Renders `report.md` and `intersections.geojson` from whatever stage
/// outputs exist.
///
/// # Errors
///
/// Returns [`AnalysisError`] if the feature or node table is missing, a
/// present artifact is malformed, or an output cannot be written.
pub fn run(paths: &DataPaths) -> Result<(), AnalysisError> {
    let rows = load_features(&paths.features_temporal())?;
    let nodes = crash_hotspots_network::load_nodes(&paths.osm_nodes())?;
    let predictions: Vec<Prediction> = read_optional_csv(&paths.all_predictions())?;
    let lisa: Vec<LisaRow> = read_optional_csv(&paths.lisa())?;
    let top: Vec<TopPrediction> = read_optional_csv(&paths.top_predictions())?;
    let communities: Vec<CommunitySummary> = read_optional_csv(&paths.community_summary())?;
    let metrics: Option<ModelMetrics> = read_optional_json(&paths.model_metrics())?;
    let spatial: Option<SpatialStats> = read_optional_json(&paths.spatial_stats())?;
    let validation: Option<ValidationReport> = read_optional_json(&paths.validation_report())?;
    let imputation: Option<ImputationSummary> = read_optional_json(&paths.imputation_summary())?;

    let Some((cutoff, mut latest)) = latest_snapshot(&rows) else {
        return Err(AnalysisError::insufficient("feature table is empty"));
    };
    latest.sort_by_key(|r| r.intersection_id);
    let layer = intersection_layer(&latest, &nodes, &predictions, &lisa);
    table::write_json(&paths.intersections_geojson(), &layer)?;
    log::info!(
        "Wrote {} intersections at {cutoff} to {}",
        layer.features.len(),
        paths.intersections_geojson().display()
    );

    let report = Report {
        validation: validation.as_ref(),
        imputation: imputation.as_ref(),
        metrics: metrics.as_ref(),
        top: &top,
        spatial: spatial.as_ref(),
        communities: &communities,
    };
    let path = paths.report();
    let io_error = |source| TableError::Io {
        path: path.display().to_string(),
        source,
    };
    ensure_parent(&path).map_err(io_error)?;
    std::fs::write(&path, report.to_string()).map_err(io_error)?;
    log::info!("Wrote report to {}", path.display());
    Ok(())
}
