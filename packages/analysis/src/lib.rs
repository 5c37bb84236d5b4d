#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Modeling, spatial statistics, and reporting over the feature table.
//!
//! [`model`] trains a hotspot classifier on a chronological split and
//! scores the latest snapshot. [`spatial`] measures clustering of
//! historical crash counts at that snapshot and summarizes it by
//! community area and income. [`report`] renders both into a map layer
//! and a Markdown report.

pub mod inequality;
pub mod layers;
pub mod logistic;
pub mod metrics;
pub mod model;
pub mod moran;
pub mod report;
pub mod spatial;
pub mod split;
pub mod weights;

use std::path::Path;

use chrono::NaiveDate;
use crash_hotspots_config::table::{self, TableError};
use crash_hotspots_feature_models::FeatureRow;

/// Errors from the analysis stages.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// Reading or writing an artifact failed.
    #[error(transparent)]
    Table(#[from] TableError),

    /// The feature table cannot support the analysis.
    #[error("Cannot analyze: {message}")]
    Insufficient {
        /// What is lacking.
        message: String,
    },
}

impl AnalysisError {
    fn insufficient(message: impl Into<String>) -> Self {
        Self::Insufficient {
            message: message.into(),
        }
    }
}

/// Rows of the most recent cutoff, with that cutoff.
#[must_use]
pub fn latest_snapshot(rows: &[FeatureRow]) -> Option<(NaiveDate, Vec<&FeatureRow>)> {
    let latest = rows.iter().map(|r| r.cutoff_date).max()?;
    let snapshot = rows.iter().filter(|r| r.cutoff_date == latest).collect();
    Some((latest, snapshot))
}

fn load_features(path: &Path) -> Result<Vec<FeatureRow>, AnalysisError> {
    let rows: Vec<FeatureRow> = table::read_csv(path)?;
    if rows.is_empty() {
        return Err(AnalysisError::insufficient(format!(
            "{} has no rows",
            path.display()
        )));
    }
    Ok(rows)
}

fn read_optional_csv<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>, TableError> {
    if path.exists() {
        table::read_csv(path)
    } else {
        log::warn!("{} not found, skipping", path.display());
        Ok(Vec::new())
    }
}

fn read_optional_json<T: serde::de::DeserializeOwned>(
    path: &Path,
) -> Result<Option<T>, TableError> {
    if path.exists() {
        table::read_json(path).map(Some)
    } else {
        log::warn!("{} not found, skipping", path.display());
        Ok(None)
    }
}
