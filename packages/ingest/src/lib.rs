#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Cleaning and snapping stages.
//!
//! `clean` turns the raw portal tables into typed, deduplicated, projected
//! records. `snap` attaches each crash to its nearest intersection and
//! links people to intersections through their crash.

pub mod clean;
pub mod parsing;
pub mod snap;

use std::sync::Arc;

use crash_hotspots_config::paths::DataPaths;
use crash_hotspots_config::progress::ProgressCallback;
use crash_hotspots_config::table::{self, TableError};
use crash_hotspots_config::{CleanConfig, SnapConfig};
use crash_hotspots_crash_models::{CrashRecord, PersonRecord, SnapRun};
use crash_hotspots_spatial::projection::TransverseMercator;
use crash_hotspots_spatial::snap::Snapper;

use crate::clean::{CrashCleanReport, PeopleCleanReport, RawCrashRow, RawPersonRow};

/// Errors from the cleaning and snapping stages.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Reading or writing a table failed.
    #[error(transparent)]
    Table(#[from] TableError),

    /// A required input is absent or empty.
    #[error("Missing input: {message}")]
    MissingInput {
        /// What is missing.
        message: String,
    },
}

/// Row counts from a cleaning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanSummary {
    pub crashes: CrashCleanReport,
    /// `None` when the raw people table was not downloaded.
    pub people: Option<PeopleCleanReport>,
}

/// Cleans the raw crash and people tables.
///
/// Writes `crashes_clean.csv` and, when the raw people table exists,
/// `people_clean.csv`.
///
/// # Errors
///
/// Returns [`IngestError`] if the raw crash table is missing or a table
/// cannot be read or written.
pub fn run_clean(paths: &DataPaths, config: &CleanConfig) -> Result<CleanSummary, IngestError> {
    let raw_crashes = paths.crashes_raw();
    if !raw_crashes.exists() {
        return Err(IngestError::MissingInput {
            message: format!("{} (run `download` first)", raw_crashes.display()),
        });
    }

    log::info!("Cleaning crashes from {}", raw_crashes.display());
    let rows: Vec<RawCrashRow> = table::read_csv(&raw_crashes)?;
    let (crashes, crash_report) =
        clean::clean_crashes(rows, config, &TransverseMercator::illinois_east());
    table::write_csv(&paths.crashes_clean(), &crashes)?;

    let raw_people = paths.people_raw();
    let people_report = if raw_people.exists() {
        log::info!("Cleaning people from {}", raw_people.display());
        let rows: Vec<RawPersonRow> = table::read_csv(&raw_people)?;
        let (people, report) = clean::clean_people(rows);
        table::write_csv(&paths.people_clean(), &people)?;
        Some(report)
    } else {
        log::warn!(
            "{} not found, skipping people cleaning",
            raw_people.display()
        );
        None
    };

    Ok(CleanSummary {
        crashes: crash_report,
        people: people_report,
    })
}

/// Snaps cleaned crashes to intersections and links people.
///
/// Writes `crashes_with_nodes.csv`, `snap_run.json`, and (when
/// `people_clean.csv` exists) `people_with_nodes.csv`.
///
/// # Errors
///
/// Returns [`IngestError`] if the node table or cleaned crashes are
/// missing, the network is empty, or an output cannot be written.
pub fn run_snap(
    paths: &DataPaths,
    config: &SnapConfig,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<SnapRun, IngestError> {
    let nodes = crash_hotspots_network::load_nodes(&paths.osm_nodes())?;
    if nodes.is_empty() {
        return Err(IngestError::MissingInput {
            message: format!("no intersections in {}", paths.osm_nodes().display()),
        });
    }
    let snapper = Snapper::new(
        nodes.iter().map(|n| (n.node_id, n.x, n.y)),
        config.tolerance_m,
    );

    let crashes: Vec<CrashRecord> = table::read_csv(&paths.crashes_clean())?;
    log::info!(
        "Snapping {} crashes to {} intersections",
        crashes.len(),
        snapper.len()
    );
    let snapped = snap::snap_crashes(&crashes, &snapper, progress);
    table::write_csv(&paths.crashes_with_nodes(), &snapped)?;

    let run = snap::summarize(&snapped, config.tolerance_m, snapper.len());
    table::write_json(&paths.snap_run(), &run)?;
    log::info!(
        "Matched {}/{} crashes ({:.1}%) within {} m",
        run.matched_count,
        run.crash_count,
        run.match_rate * 100.0,
        run.tolerance_m
    );

    let people_path = paths.people_clean();
    if people_path.exists() {
        let people: Vec<PersonRecord> = table::read_csv(&people_path)?;
        let linked = snap::link_people(&people, &snapped);
        table::write_csv(&paths.people_with_nodes(), &linked)?;
    } else {
        log::warn!(
            "{} not found, skipping people linking",
            people_path.display()
        );
    }

    Ok(run)
}

#[cfg(test)]
mod tests {
    use crash_hotspots_config::progress::null_progress;
    use crash_hotspots_crash_models::{LinkedPerson, SnappedCrash};
    use crash_hotspots_network_models::RoadNode;

    use super::*;

    const RAW_CRASHES: &str = "crash_record_id,crash_date,posted_speed_limit,latitude,longitude,most_severe_injury,injuries_total,injuries_fatal,injuries_incapacitating\n\
        c1,2024-01-01T08:00:00.000,30,41.8781,-87.6298,NO INDICATION OF INJURY,0,0,0\n\
        c1,2024-01-01T08:00:00.000,30,41.8781,-87.6298,NO INDICATION OF INJURY,0,0,0\n\
        c2,2024-01-02T09:00:00.000,25,41.9500,-87.6500,FATAL,1,1,0\n";

    const RAW_PEOPLE: &str = "person_id,person_type,crash_record_id,sex,age,safety_equipment,injury_classification\n\
        O1,driver,c1,m,30,,NO INDICATION OF INJURY\n\
        O2,driver,c2,f,,,FATAL\n";

    #[test]
    fn clean_then_snap_writes_every_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path());
        std::fs::create_dir_all(paths.raw_dir()).unwrap();
        std::fs::write(paths.crashes_raw(), RAW_CRASHES).unwrap();
        std::fs::write(paths.people_raw(), RAW_PEOPLE).unwrap();

        let summary = run_clean(&paths, &CleanConfig::default()).unwrap();
        assert_eq!(summary.crashes.kept, 2);
        assert_eq!(summary.crashes.duplicate_id, 1);
        assert_eq!(summary.people.unwrap().kept, 2);

        let projection = TransverseMercator::illinois_east();
        let (x, y) = projection.project(-87.6298, 41.8781);
        let nodes = vec![RoadNode {
            node_id: 100,
            lon: -87.6298,
            lat: 41.8781,
            x: x + 5.0,
            y,
        }];
        table::write_csv(&paths.osm_nodes(), &nodes).unwrap();

        let run = run_snap(&paths, &SnapConfig::default(), &null_progress()).unwrap();
        assert_eq!(run.crash_count, 2);
        assert_eq!(run.matched_count, 1);

        let snapped: Vec<SnappedCrash> = table::read_csv(&paths.crashes_with_nodes()).unwrap();
        assert_eq!(snapped[0].intersection_id(), Some(100));
        assert!(!snapped[1].matched);

        let reread: SnapRun = table::read_json(&paths.snap_run()).unwrap();
        assert_eq!(reread.matched_count, 1);
        assert_eq!(reread.node_count, 1);

        let linked: Vec<LinkedPerson> = table::read_csv(&paths.people_with_nodes()).unwrap();
        assert_eq!(linked[0].intersection_id, Some(100));
        assert_eq!(linked[1].intersection_id, None);
    }

    #[test]
    fn clean_requires_raw_crashes() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_clean(&DataPaths::new(dir.path()), &CleanConfig::default()).unwrap_err();
        assert!(matches!(err, IngestError::MissingInput { .. }));
    }
}
