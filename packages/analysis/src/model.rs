//! Hotspot classifier stage.
//!
//! Fits the logistic model on the training periods, picks decision
//! thresholds on the validation periods, and reports test-period metrics
//! next to a baseline that ranks intersections by historical crash count.
//! The fitted model then scores every intersection of the latest cutoff.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use crash_hotspots_analysis_models::{
    Coefficient, ModelMetrics, Prediction, SplitSummary, TopPrediction,
};
use crash_hotspots_config::PipelineConfig;
use crash_hotspots_config::paths::DataPaths;
use crash_hotspots_config::stats;
use crash_hotspots_config::table;
use crash_hotspots_feature_models::{FeatureRow, MODEL_FEATURES};

use crate::logistic::LogisticRegression;
use crate::metrics;
use crate::split::split_periods;
use crate::{AnalysisError, latest_snapshot, load_features};

/// Rows kept in the top predictions table.
pub const TOP_PREDICTIONS: usize = 100;

/// Everything the model stage produces.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutputs {
    pub metrics: ModelMetrics,
    /// One row per intersection of the latest cutoff, by id.
    pub predictions: Vec<Prediction>,
    /// Highest-probability intersections, most likely first.
    pub top: Vec<TopPrediction>,
}

fn inputs(rows: &[&FeatureRow]) -> (Vec<Vec<f64>>, Vec<bool>) {
    rows.iter()
        .map(|r| (r.model_inputs(), r.is_hotspot()))
        .unzip()
}

fn baseline_scores(rows: &[&FeatureRow]) -> Vec<f64> {
    rows.iter().map(|r| f64::from(r.hist_crashes)).collect()
}

/// Trains, evaluates, and scores the latest snapshot.
///
/// # Errors
///
/// Returns [`AnalysisError::Insufficient`] if the table spans fewer than
/// two cutoffs or the training or test split is empty.
pub fn train_and_evaluate(
    rows: &[FeatureRow],
    config: &PipelineConfig,
) -> Result<ModelOutputs, AnalysisError> {
    let cutoffs: Vec<NaiveDate> = rows
        .iter()
        .map(|r| r.cutoff_date)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let periods = split_periods(&cutoffs, &config.model).ok_or_else(|| {
        AnalysisError::insufficient(format!(
            "{} cutoff period(s), need at least 2",
            cutoffs.len()
        ))
    })?;
    let split = periods.partition(rows);
    let summary: SplitSummary = periods.summary(&split);
    log::info!(
        "Split {} train / {} validation / {} test rows over {} / {} / {} periods",
        summary.train_rows,
        summary.validation_rows,
        summary.test_rows,
        summary.train_cutoffs.len(),
        summary.validation_cutoffs.len(),
        summary.test_cutoffs.len()
    );
    if split.test.is_empty() {
        return Err(AnalysisError::insufficient("test split is empty"));
    }

    let (train_x, train_y) = inputs(&split.train);
    let model = LogisticRegression::fit(&train_x, &train_y, &config.model)
        .ok_or_else(|| AnalysisError::insufficient("training split is empty"))?;

    let tuning = if split.validation.is_empty() {
        log::warn!("No validation periods, choosing thresholds on the training split");
        &split.train
    } else {
        &split.validation
    };
    let (tuning_x, tuning_y) = inputs(tuning);
    let tuning_scores: Vec<f64> = tuning_x.iter().map(|x| model.predict_proba(x)).collect();
    let logistic_threshold = metrics::best_f1_threshold(&tuning_scores, &tuning_y);
    let baseline_threshold = metrics::best_f1_threshold(&baseline_scores(tuning), &tuning_y);

    let (test_x, test_y) = inputs(&split.test);
    let test_scores: Vec<f64> = test_x.iter().map(|x| model.predict_proba(x)).collect();
    let logistic = metrics::evaluate(
        "logistic",
        &test_scores,
        &test_y,
        logistic_threshold,
        config.model.top_k_fraction,
    );
    let baseline = metrics::evaluate(
        "baseline_hist_crashes",
        &baseline_scores(&split.test),
        &test_y,
        baseline_threshold,
        config.model.top_k_fraction,
    );
    for m in [&logistic, &baseline] {
        log::info!(
            "{}: ROC AUC {}, AP {}, F1 {:.3} at {:.4}, precision@{} {:.3}",
            m.model,
            m.roc_auc.map_or_else(|| "n/a".to_string(), |v| format!("{v:.3}")),
            m.average_precision
                .map_or_else(|| "n/a".to_string(), |v| format!("{v:.3}")),
            m.f1,
            m.threshold,
            m.k,
            m.precision_at_k
        );
    }

    let coefficients = MODEL_FEATURES
        .iter()
        .zip(&model.weights)
        .map(|(feature, weight)| Coefficient {
            feature: (*feature).to_string(),
            weight: *weight,
        })
        .collect();

    let Some((prediction_cutoff, mut latest)) = latest_snapshot(rows) else {
        return Err(AnalysisError::insufficient("no rows to score"));
    };
    latest.sort_by_key(|r| r.intersection_id);
    let probabilities: Vec<f64> = latest
        .iter()
        .map(|r| model.predict_proba(&r.model_inputs()))
        .collect();
    let prediction_threshold =
        stats::quantile(&probabilities, 1.0 - config.label.hotspot_top_pct).unwrap_or(1.0);

    let predictions: Vec<Prediction> = latest
        .iter()
        .zip(&probabilities)
        .map(|(row, &p)| Prediction {
            intersection_id: row.intersection_id,
            predicted_probability: p,
            predicted_hotspot: u8::from(p >= prediction_threshold),
        })
        .collect();

    let mut order: Vec<usize> = metrics::ranked(&probabilities);
    order.truncate(TOP_PREDICTIONS);
    let top = order
        .into_iter()
        .map(|i| TopPrediction {
            intersection_id: latest[i].intersection_id,
            predicted_probability: probabilities[i],
            hist_crashes: latest[i].hist_crashes,
            label_hotspot: latest[i].label_hotspot,
            community_name: latest[i].community_name.clone(),
        })
        .collect();

    Ok(ModelOutputs {
        metrics: ModelMetrics {
            split: summary,
            logistic,
            baseline,
            intercept: model.intercept,
            coefficients,
            prediction_cutoff,
            prediction_threshold,
        },
        predictions,
        top,
    })
}

/// Runs the model stage over the feature table.
///
/// Writes `model_metrics.json`, `all_predictions.csv`, and
/// `top_100_predicted_hotspots.csv`.
///
/// # Errors
///
/// Returns [`AnalysisError`] if the feature table is missing or cannot
/// support training, or an output cannot be written.
pub fn run(paths: &DataPaths, config: &PipelineConfig) -> Result<ModelOutputs, AnalysisError> {
    let rows = load_features(&paths.features_temporal())?;
    let outputs = train_and_evaluate(&rows, config)?;

    table::write_json(&paths.model_metrics(), &outputs.metrics)?;
    table::write_csv(&paths.all_predictions(), &outputs.predictions)?;
    table::write_csv(&paths.top_predictions(), &outputs.top)?;

    let flagged = outputs
        .predictions
        .iter()
        .filter(|p| p.predicted_hotspot == 1)
        .count();
    log::info!(
        "Scored {} intersections at {} ({flagged} predicted hotspots), results in {}",
        outputs.predictions.len(),
        outputs.metrics.prediction_cutoff,
        paths.results_dir().display()
    );
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use crate::tests::{cutoff, feature_row, fixture_rows};

    use super::*;

    #[test]
    fn separable_table_ranks_perfectly() {
        let out = train_and_evaluate(&fixture_rows(), &PipelineConfig::default()).unwrap();
        let m = &out.metrics;

        assert_eq!(m.split.train_cutoffs.len(), 4);
        assert_eq!(m.split.validation_cutoffs.len(), 1);
        assert_eq!(m.split.test_cutoffs, vec![cutoff(5)]);
        assert_eq!(m.logistic.test_rows, 40);
        assert_eq!(m.logistic.test_positives, 10);
        assert!((m.logistic.roc_auc.unwrap() - 1.0).abs() < 1e-12);
        assert!((m.baseline.roc_auc.unwrap() - 1.0).abs() < 1e-12);
        assert!((m.logistic.f1 - 1.0).abs() < 1e-12);
        assert_eq!(m.logistic.k, 4);
        assert!((m.logistic.precision_at_k - 1.0).abs() < 1e-12);
        assert_eq!(m.coefficients.len(), MODEL_FEATURES.len());
        assert_eq!(m.coefficients[0].feature, "hist_crashes");
        assert!(m.coefficients[0].weight > 0.0);
    }

    #[test]
    fn latest_cutoff_is_scored() {
        let out = train_and_evaluate(&fixture_rows(), &PipelineConfig::default()).unwrap();
        assert_eq!(out.metrics.prediction_cutoff, cutoff(5));
        assert_eq!(out.predictions.len(), 40);
        assert!(
            out.predictions
                .windows(2)
                .all(|w| w[0].intersection_id < w[1].intersection_id)
        );

        let flagged: Vec<i64> = out
            .predictions
            .iter()
            .filter(|p| p.predicted_hotspot == 1)
            .map(|p| p.intersection_id)
            .collect();
        assert!(!flagged.is_empty() && flagged.len() <= 10, "{flagged:?}");
        assert!(flagged.iter().all(|&id| id < 10));

        assert_eq!(out.top.len(), 40);
        assert!(out.top[..10].iter().all(|t| t.label_hotspot == 1));
        assert!(
            out.top
                .windows(2)
                .all(|w| w[0].predicted_probability >= w[1].predicted_probability)
        );
    }

    #[test]
    fn single_cutoff_cannot_be_split() {
        let rows = vec![feature_row(1, cutoff(0), 3, true), feature_row(2, cutoff(0), 0, false)];
        let err = train_and_evaluate(&rows, &PipelineConfig::default()).unwrap_err();
        assert!(matches!(err, AnalysisError::Insufficient { .. }));
    }

    #[test]
    fn run_writes_result_tables() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path());
        table::write_csv(&paths.features_temporal(), &fixture_rows()).unwrap();

        let out = run(&paths, &PipelineConfig::default()).unwrap();
        let metrics: ModelMetrics = table::read_json(&paths.model_metrics()).unwrap();
        assert_eq!(metrics.prediction_cutoff, out.metrics.prediction_cutoff);
        let predictions: Vec<Prediction> = table::read_csv(&paths.all_predictions()).unwrap();
        assert_eq!(predictions.len(), 40);
        let top: Vec<TopPrediction> = table::read_csv(&paths.top_predictions()).unwrap();
        assert_eq!(top[0].intersection_id, out.top[0].intersection_id);
    }
}
