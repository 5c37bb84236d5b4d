#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Output records of the modeling and spatial statistics stages.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Cutoff periods assigned to each chronological split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSummary {
    pub train_cutoffs: Vec<NaiveDate>,
    pub validation_cutoffs: Vec<NaiveDate>,
    pub test_cutoffs: Vec<NaiveDate>,
    pub train_rows: usize,
    pub validation_rows: usize,
    pub test_rows: usize,
}

/// Test-set performance of one ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierMetrics {
    pub model: String,
    /// `None` when the test set holds a single class.
    pub roc_auc: Option<f64>,
    /// `None` when the test set has no positives.
    pub average_precision: Option<f64>,
    /// Decision threshold chosen on the validation periods.
    pub threshold: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Number of top-ranked rows in precision at k.
    pub k: usize,
    pub precision_at_k: f64,
    pub test_rows: usize,
    pub test_positives: usize,
}

/// A fitted weight on the original (unstandardized) feature name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coefficient {
    pub feature: String,
    /// Weight on the standardized feature.
    pub weight: f64,
}

/// Everything written to `model_metrics.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub split: SplitSummary,
    pub logistic: ClassifierMetrics,
    pub baseline: ClassifierMetrics,
    pub intercept: f64,
    pub coefficients: Vec<Coefficient>,
    /// Cutoff the predictions were made for.
    pub prediction_cutoff: NaiveDate,
    /// Probability at or above which an intersection is predicted a hotspot.
    pub prediction_threshold: f64,
}

/// One row of `all_predictions.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub intersection_id: i64,
    pub predicted_probability: f64,
    pub predicted_hotspot: u8,
}

/// One row of `top_100_predicted_hotspots.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopPrediction {
    pub intersection_id: i64,
    pub predicted_probability: f64,
    pub hist_crashes: u32,
    pub label_hotspot: u8,
    pub community_name: String,
}

/// LISA quadrant of an intersection relative to its neighbors.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
pub enum LisaQuadrant {
    /// High value among high neighbors.
    #[serde(rename = "HH")]
    #[strum(serialize = "HH")]
    HighHigh,
    /// Low value among low neighbors.
    #[serde(rename = "LL")]
    #[strum(serialize = "LL")]
    LowLow,
    /// High value among low neighbors.
    #[serde(rename = "HL")]
    #[strum(serialize = "HL")]
    HighLow,
    /// Low value among high neighbors.
    #[serde(rename = "LH")]
    #[strum(serialize = "LH")]
    LowHigh,
}

impl LisaQuadrant {
    /// Quadrant from a deviation and its spatial lag. Zero counts as low.
    #[must_use]
    pub fn classify(z: f64, lag: f64) -> Self {
        match (z > 0.0, lag > 0.0) {
            (true, true) => Self::HighHigh,
            (false, false) => Self::LowLow,
            (true, false) => Self::HighLow,
            (false, true) => Self::LowHigh,
        }
    }
}

/// One row of `lisa.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LisaRow {
    pub intersection_id: i64,
    pub value: f64,
    pub local_i: f64,
    pub quadrant: LisaQuadrant,
    pub p_value: f64,
    /// The quadrant when significant, empty otherwise.
    pub cluster: Option<LisaQuadrant>,
}

/// Global Moran's I with its permutation inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalMoran {
    pub i: f64,
    pub expected_i: f64,
    pub p_value: f64,
    pub z_score: Option<f64>,
    pub permutations: usize,
}

/// Hotspot rate within one median-income quintile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuintileRate {
    /// 1 is the lowest-income fifth.
    pub quintile: u8,
    pub income_min: f64,
    pub income_max: f64,
    pub intersections: usize,
    pub hotspots: usize,
    pub hotspot_rate: f64,
}

/// One row of `community_areas.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunitySummary {
    pub community_id: String,
    pub community_name: String,
    pub intersections: usize,
    /// History-window crashes at the latest cutoff.
    pub crashes: u64,
    pub hotspots: usize,
    pub hotspot_rate: f64,
    pub predicted_hotspots: usize,
    pub median_income: Option<f64>,
}

/// Everything written to `spatial_stats.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialStats {
    pub cutoff_date: NaiveDate,
    /// Column the autocorrelation statistics describe.
    pub variable: String,
    pub intersections: usize,
    pub k_neighbors: usize,
    pub moran: GlobalMoran,
    pub significance: f64,
    /// Significant LISA clusters by quadrant.
    pub clusters: BTreeMap<String, usize>,
    /// Gini coefficient of per-community crash counts.
    pub community_gini: Option<f64>,
    pub income_quintiles: Vec<QuintileRate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quadrants_follow_signs() {
        assert_eq!(LisaQuadrant::classify(1.0, 2.0), LisaQuadrant::HighHigh);
        assert_eq!(LisaQuadrant::classify(-1.0, -0.5), LisaQuadrant::LowLow);
        assert_eq!(LisaQuadrant::classify(1.0, -0.5), LisaQuadrant::HighLow);
        assert_eq!(LisaQuadrant::classify(-1.0, 0.5), LisaQuadrant::LowHigh);
        assert_eq!(LisaQuadrant::classify(0.0, 0.0), LisaQuadrant::LowLow);
    }

    #[test]
    fn lisa_csv_leaves_insignificant_cluster_empty() {
        let rows = vec![
            LisaRow {
                intersection_id: 1,
                value: 4.0,
                local_i: 1.5,
                quadrant: LisaQuadrant::HighHigh,
                p_value: 0.01,
                cluster: Some(LisaQuadrant::HighHigh),
            },
            LisaRow {
                intersection_id: 2,
                value: 0.0,
                local_i: 0.1,
                quadrant: LisaQuadrant::LowLow,
                p_value: 0.4,
                cluster: None,
            },
        ];
        let mut writer = csv::Writer::from_writer(Vec::new());
        for row in &rows {
            writer.serialize(row).unwrap();
        }
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(
            text,
            "intersection_id,value,local_i,quadrant,p_value,cluster\n\
             1,4.0,1.5,HH,0.01,HH\n\
             2,0.0,0.1,LL,0.4,\n"
        );

        let mut reader = csv::Reader::from_reader(text.as_bytes());
        let back: Vec<LisaRow> = reader.deserialize().map(Result::unwrap).collect();
        assert_eq!(back, rows);
    }
}
