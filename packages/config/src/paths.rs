#![allow(clippy::module_name_repetitions)]
//! Canonical artifact paths under the configured data directory.
//!
//! Raw downloads live in `raw/`, stage outputs in `processed/`, and
//! modeling/analysis outputs in `results/`.

use std::path::{Path, PathBuf};

/// Resolves every artifact path the pipeline reads or writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    /// Creates a resolver rooted at `data_dir`.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: data_dir.into(),
        }
    }

    /// Returns the data root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the `raw/` directory for downloaded inputs.
    #[must_use]
    pub fn raw_dir(&self) -> PathBuf {
        self.root.join("raw")
    }

    /// Returns the `processed/` directory for stage outputs.
    #[must_use]
    pub fn processed_dir(&self) -> PathBuf {
        self.root.join("processed")
    }

    /// Returns the `results/` directory for modeling outputs.
    #[must_use]
    pub fn results_dir(&self) -> PathBuf {
        self.root.join("results")
    }

    // ── raw ──────────────────────────────────────────────────────────

    #[must_use]
    pub fn crashes_raw(&self) -> PathBuf {
        self.raw_dir().join("chicago_crashes.csv")
    }

    #[must_use]
    pub fn people_raw(&self) -> PathBuf {
        self.raw_dir().join("chicago_people.csv")
    }

    #[must_use]
    pub fn osm_pbf(&self) -> PathBuf {
        self.raw_dir().join("chicago.osm.pbf")
    }

    #[must_use]
    pub fn acs_raw(&self) -> PathBuf {
        self.raw_dir().join("acs_il_tracts.csv")
    }

    #[must_use]
    pub fn tracts_geojson(&self) -> PathBuf {
        self.raw_dir().join("cook_tracts.geojson")
    }

    #[must_use]
    pub fn community_areas_geojson(&self) -> PathBuf {
        self.raw_dir().join("community_areas.geojson")
    }

    // ── processed ────────────────────────────────────────────────────

    #[must_use]
    pub fn crashes_clean(&self) -> PathBuf {
        self.processed_dir().join("crashes_clean.csv")
    }

    #[must_use]
    pub fn people_clean(&self) -> PathBuf {
        self.processed_dir().join("people_clean.csv")
    }

    #[must_use]
    pub fn osm_nodes(&self) -> PathBuf {
        self.processed_dir().join("osm_nodes.csv")
    }

    #[must_use]
    pub fn osm_edges(&self) -> PathBuf {
        self.processed_dir().join("osm_edges.csv")
    }

    #[must_use]
    pub fn centrality(&self) -> PathBuf {
        self.processed_dir().join("centrality.csv")
    }

    #[must_use]
    pub fn crashes_with_nodes(&self) -> PathBuf {
        self.processed_dir().join("crashes_with_nodes.csv")
    }

    #[must_use]
    pub fn snap_run(&self) -> PathBuf {
        self.processed_dir().join("snap_run.json")
    }

    #[must_use]
    pub fn people_with_nodes(&self) -> PathBuf {
        self.processed_dir().join("people_with_nodes.csv")
    }

    #[must_use]
    pub fn features_temporal(&self) -> PathBuf {
        self.processed_dir().join("intersection_features_temporal.csv")
    }

    #[must_use]
    pub fn imputation_summary(&self) -> PathBuf {
        self.processed_dir().join("imputation.json")
    }

    #[must_use]
    pub fn validation_report(&self) -> PathBuf {
        self.processed_dir().join("validation.json")
    }

    #[must_use]
    pub fn manifest(&self) -> PathBuf {
        self.processed_dir().join("manifest.json")
    }

    // ── results ──────────────────────────────────────────────────────

    #[must_use]
    pub fn model_metrics(&self) -> PathBuf {
        self.results_dir().join("model_metrics.json")
    }

    #[must_use]
    pub fn all_predictions(&self) -> PathBuf {
        self.results_dir().join("all_predictions.csv")
    }

    #[must_use]
    pub fn top_predictions(&self) -> PathBuf {
        self.results_dir().join("top_100_predicted_hotspots.csv")
    }

    #[must_use]
    pub fn lisa(&self) -> PathBuf {
        self.results_dir().join("lisa.csv")
    }

    #[must_use]
    pub fn spatial_stats(&self) -> PathBuf {
        self.results_dir().join("spatial_stats.json")
    }

    #[must_use]
    pub fn community_summary(&self) -> PathBuf {
        self.results_dir().join("community_areas.csv")
    }

    #[must_use]
    pub fn intersections_geojson(&self) -> PathBuf {
        self.results_dir().join("intersections.geojson")
    }

    #[must_use]
    pub fn report(&self) -> PathBuf {
        self.results_dir().join("report.md")
    }
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Ensures the parent directory of `path` exists.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir(parent),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_outputs_land_in_stage_dirs() {
        let paths = DataPaths::new("/tmp/hotspots");
        assert_eq!(
            paths.crashes_raw(),
            PathBuf::from("/tmp/hotspots/raw/chicago_crashes.csv")
        );
        assert_eq!(
            paths.crashes_with_nodes(),
            PathBuf::from("/tmp/hotspots/processed/crashes_with_nodes.csv")
        );
        assert_eq!(
            paths.report(),
            PathBuf::from("/tmp/hotspots/results/report.md")
        );
    }
}
