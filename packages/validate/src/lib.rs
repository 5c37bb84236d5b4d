#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Regression guard over the pipeline's intermediate artifacts.
//!
//! Every check recomputes its quantity from the upstream files instead of
//! trusting what the producing stage recorded, then reports
//! `PASS`/`WARN`/`FAIL`. Any `FAIL` makes the run fail.

pub mod checks;
pub mod manifest;

use std::collections::HashSet;
use std::path::Path;

use crash_hotspots_config::PipelineConfig;
use crash_hotspots_config::paths::DataPaths;
use crash_hotspots_config::table::{self, TableError};
use crash_hotspots_crash_models::{CrashRecord, LinkedPerson, SnapRun, SnappedCrash};
use crash_hotspots_feature_models::{FeatureRow, MODEL_FEATURES};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::manifest::Manifest;

/// Errors that stop validation from producing a report.
#[derive(Debug, thiserror::Error)]
pub enum ValidateError {
    /// An artifact could not be read or the report could not be written.
    #[error(transparent)]
    Table(#[from] TableError),

    /// An artifact could not be hashed.
    #[error("I/O error hashing {path}: {source}")]
    Io {
        /// Offending file.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },
}

/// Outcome of a single check. Ordered from best to worst.
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
    AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// One named check and what it found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

impl CheckResult {
    #[must_use]
    pub fn new(name: &str, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn pass(name: &str, detail: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Pass, detail)
    }

    #[must_use]
    pub fn warn(name: &str, detail: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Warn, detail)
    }

    #[must_use]
    pub fn fail(name: &str, detail: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Fail, detail)
    }
}

/// Every check result plus the worst status among them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub status: CheckStatus,
    pub checks: Vec<CheckResult>,
}

impl ValidationReport {
    #[must_use]
    pub fn new(checks: Vec<CheckResult>) -> Self {
        let status = checks
            .iter()
            .map(|c| c.status)
            .max()
            .unwrap_or(CheckStatus::Pass);
        Self { status, checks }
    }

    /// `true` unless some check failed. Warnings still pass.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.status != CheckStatus::Fail
    }

    /// Checks that failed.
    pub fn failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks
            .iter()
            .filter(|c| c.status == CheckStatus::Fail)
    }
}

/// Artifacts the checks run over, already loaded.
pub struct ValidationInputs<'a> {
    /// Row count of `crashes_clean.csv`, `None` when the table is absent.
    pub clean_crash_count: Option<usize>,
    pub snapped: &'a [SnappedCrash],
    pub people: &'a [LinkedPerson],
    pub snap_run: Option<&'a SnapRun>,
    pub features: &'a [FeatureRow],
    pub network_nodes: &'a HashSet<i64>,
}

/// Runs every data check (everything except the manifest comparison).
///
/// The snap tolerance comes from the recorded snap run when present, so
/// the match flags are judged against the threshold that produced them.
#[must_use]
pub fn validate(inputs: &ValidationInputs<'_>, config: &PipelineConfig) -> Vec<CheckResult> {
    let tolerance_m = inputs
        .snap_run
        .map_or(config.snap.tolerance_m, |run| run.tolerance_m);
    if (tolerance_m - config.snap.tolerance_m).abs() > f64::EPSILON {
        log::warn!(
            "Snap run used tolerance {tolerance_m} m, config says {} m",
            config.snap.tolerance_m
        );
    }

    let mut results = vec![checks::clean_snap_row_count(
        inputs.clean_crash_count,
        inputs.snapped.len(),
    )];
    results.extend(checks::snap_checks(
        inputs.snapped,
        tolerance_m,
        inputs.snap_run,
        &config.validation,
    ));
    results.push(checks::snap_distance_p95(
        inputs.snapped,
        config.snap.tolerance_m,
    ));
    results.push(checks::people_link_rate(
        inputs.people,
        config.validation.match_rate_pass,
    ));
    results.push(checks::window_disjointness(
        inputs.features,
        inputs.snapped,
        inputs.people,
        &config.windows,
    ));
    results.push(checks::leakage_audit(MODEL_FEATURES));
    results.extend(checks::distribution_checks(
        inputs.features,
        &config.validation,
    ));
    results.extend(checks::consistency_checks(
        inputs.features,
        inputs.network_nodes,
        inputs.snapped,
    ));
    results
}

fn read_optional_csv<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>, TableError> {
    if path.exists() {
        table::read_csv(path)
    } else {
        log::warn!("{} not found, skipping", path.display());
        Ok(Vec::new())
    }
}

/// Validates the artifacts under `paths`.
///
/// Writes `validation.json` and a fresh `manifest.json`. The returned
/// report's [`ValidationReport::passed`] decides the exit status.
///
/// # Errors
///
/// Returns [`ValidateError`] if a required artifact is missing or
/// malformed, or the report cannot be written.
pub fn run(paths: &DataPaths, config: &PipelineConfig) -> Result<ValidationReport, ValidateError> {
    let snapped: Vec<SnappedCrash> = table::read_csv(&paths.crashes_with_nodes())?;
    let clean_crash_count = if paths.crashes_clean().exists() {
        Some(table::read_csv::<CrashRecord>(&paths.crashes_clean())?.len())
    } else {
        None
    };
    let people: Vec<LinkedPerson> = read_optional_csv(&paths.people_with_nodes())?;
    let snap_run: Option<SnapRun> = if paths.snap_run().exists() {
        Some(table::read_json(&paths.snap_run())?)
    } else {
        None
    };
    let features: Vec<FeatureRow> = table::read_csv(&paths.features_temporal())?;
    let network_nodes: HashSet<i64> = crash_hotspots_network::load_nodes(&paths.osm_nodes())?
        .into_iter()
        .map(|n| n.node_id)
        .collect();

    log::info!(
        "Validating {} crashes, {} people, {} feature rows, {} network nodes",
        snapped.len(),
        people.len(),
        features.len(),
        network_nodes.len()
    );

    let inputs = ValidationInputs {
        clean_crash_count,
        snapped: &snapped,
        people: &people,
        snap_run: snap_run.as_ref(),
        features: &features,
        network_nodes: &network_nodes,
    };
    let mut results = validate(&inputs, config);

    let previous: Option<Manifest> = if paths.manifest().exists() {
        Some(table::read_json(&paths.manifest())?)
    } else {
        None
    };
    let current = manifest::build(paths)?;
    results.push(manifest::compare(previous.as_ref(), &current));

    let report = ValidationReport::new(results);
    for check in &report.checks {
        match check.status {
            CheckStatus::Pass => log::info!("[{}] {}: {}", check.status, check.name, check.detail),
            CheckStatus::Warn => log::warn!("[{}] {}: {}", check.status, check.name, check.detail),
            CheckStatus::Fail => log::error!("[{}] {}: {}", check.status, check.name, check.detail),
        }
    }

    table::write_json(&paths.validation_report(), &report)?;
    table::write_json(&paths.manifest(), &current)?;
    log::info!(
        "Validation {}: report written to {}",
        report.status,
        paths.validation_report().display()
    );
    Ok(report)
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::{NaiveDate, NaiveDateTime};
    use crash_hotspots_feature_models::UNKNOWN;
    use crash_hotspots_network_models::RoadNode;

    use super::*;

    pub(crate) fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    pub(crate) fn snapped(id: &str, node: i64, ts: NaiveDateTime, distance_m: f64) -> SnappedCrash {
        SnappedCrash {
            crash_record_id: id.to_string(),
            occurred_at: ts,
            most_severe_injury: None,
            injuries_total: 0,
            injuries_fatal: 0,
            injuries_incapacitating: 0,
            nearest_node_id: Some(node),
            distance_m: Some(distance_m),
            matched: distance_m <= 70.0,
        }
    }

    /// A row whose only non-zero aggregates are crash counts with
    /// severity weight 1 per crash.
    pub(crate) fn feature_row(
        id: i64,
        cutoff: NaiveDate,
        hist: u32,
        recent: u32,
        future: u32,
        label: u8,
    ) -> FeatureRow {
        FeatureRow {
            intersection_id: id,
            cutoff_date: cutoff,
            hist_crashes: hist,
            hist_severity: hist,
            hist_injuries_total: 0,
            hist_injuries_fatal: 0,
            hist_injuries_incapacitating: 0,
            hist_injuries_nonincap: 0,
            recent90_crashes: recent,
            recent90_severity: recent,
            recent90_injuries_total: 0,
            recent90_injuries_fatal: 0,
            recent90_injuries_incapacitating: 0,
            recent90_injuries_nonincap: 0,
            future_crashes: future,
            future_severity: future,
            centrality_degree: 0.1,
            centrality_closeness: 0.2,
            centrality_betweenness: 0.0,
            geoid: UNKNOWN.to_string(),
            acs_pop: 1000.0,
            acs_median_income: 50_000.0,
            acs_households_with_vehicle: 300.0,
            acs_poverty_universe: 950.0,
            acs_vehicle_access_rate: 0.3,
            acs_pop_missing: 0,
            acs_median_income_missing: 0,
            acs_households_with_vehicle_missing: 0,
            acs_poverty_universe_missing: 0,
            acs_vehicle_access_rate_missing: 0,
            community_id: UNKNOWN.to_string(),
            community_name: UNKNOWN.to_string(),
            label_hotspot: label,
        }
    }

    /// Ten intersections, one history crash each, node 10 busiest in the
    /// future window and labeled.
    fn write_artifacts(paths: &DataPaths) {
        let cutoff = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut crashes: Vec<SnappedCrash> = Vec::new();
        let mut rows = Vec::new();
        let mut nodes = Vec::new();
        for id in 1..=10_i64 {
            crashes.push(snapped(&format!("h{id}"), id, at(2023, 6, 1), 5.0));
            crashes.push(snapped(&format!("f{id}"), id, at(2024, 2, 1), 5.0));
            let future = if id == 10 {
                crashes.push(snapped("f10b", id, at(2024, 3, 1), 5.0));
                2
            } else {
                1
            };
            rows.push(feature_row(id, cutoff, 1, 0, future, u8::from(id == 10)));
            nodes.push(RoadNode {
                node_id: id,
                lon: -87.6,
                lat: 41.9,
                x: 0.0,
                y: 0.0,
            });
        }
        let clean: Vec<CrashRecord> = crashes
            .iter()
            .map(|c| CrashRecord {
                crash_record_id: c.crash_record_id.clone(),
                occurred_at: c.occurred_at,
                latitude: 41.9,
                longitude: -87.6,
                x: 0.0,
                y: 0.0,
                most_severe_injury: None,
                injuries_total: 0,
                injuries_fatal: 0,
                injuries_incapacitating: 0,
            })
            .collect();
        table::write_csv(&paths.crashes_clean(), &clean).unwrap();
        table::write_csv(&paths.crashes_with_nodes(), &crashes).unwrap();
        table::write_csv(&paths.features_temporal(), &rows).unwrap();
        table::write_csv(&paths.osm_nodes(), &nodes).unwrap();
    }

    #[test]
    fn clean_artifacts_pass_and_rerun_is_identical() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path());
        write_artifacts(&paths);
        let config = PipelineConfig::default();

        let first = run(&paths, &config).unwrap();
        assert!(first.passed(), "{:?}", first.checks);
        assert_eq!(first.status, CheckStatus::Pass);
        assert!(paths.validation_report().exists());
        assert!(paths.manifest().exists());

        let second = run(&paths, &config).unwrap();
        let manifest_check = second
            .checks
            .iter()
            .find(|c| c.name == "manifest")
            .unwrap();
        assert_eq!(manifest_check.status, CheckStatus::Pass);
        assert!(manifest_check.detail.contains("byte-identical"));
    }

    #[test]
    fn tampered_history_fails() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path());
        write_artifacts(&paths);

        let mut rows: Vec<FeatureRow> = table::read_csv(&paths.features_temporal()).unwrap();
        rows[0].hist_crashes = 2;
        rows[0].hist_severity = 2;
        table::write_csv(&paths.features_temporal(), &rows).unwrap();

        let report = run(&paths, &PipelineConfig::default()).unwrap();
        assert!(!report.passed());
        let failed: Vec<&str> = report.failures().map(|c| c.name.as_str()).collect();
        assert_eq!(failed, vec!["window_disjointness"]);
    }

    #[test]
    fn crashes_lost_during_snapping_fail() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path());
        write_artifacts(&paths);

        let mut crashes: Vec<SnappedCrash> = table::read_csv(&paths.crashes_with_nodes()).unwrap();
        crashes.retain(|c| c.crash_record_id != "f10b");
        table::write_csv(&paths.crashes_with_nodes(), &crashes).unwrap();

        let report = run(&paths, &PipelineConfig::default()).unwrap();
        let row_count = report
            .checks
            .iter()
            .find(|c| c.name == "clean_snap_row_count")
            .unwrap();
        assert_eq!(row_count.status, CheckStatus::Fail);
        assert!(!report.passed());
    }

    #[test]
    fn worst_status_wins() {
        let report = ValidationReport::new(vec![
            CheckResult::pass("a", ""),
            CheckResult::warn("b", ""),
        ]);
        assert_eq!(report.status, CheckStatus::Warn);
        assert!(report.passed());
        assert_eq!(ValidationReport::new(Vec::new()).status, CheckStatus::Pass);
        assert_eq!(CheckStatus::Fail.to_string(), "FAIL");
    }
}
