#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Temporal feature stage.
//!
//! For every cutoff in the schedule and every intersection with matched
//! crashes near it, aggregates the history, recent, and future windows,
//! joins static attributes, imputes join misses, and derives the hotspot
//! label from the future window.

pub mod aggregate;
pub mod enrich;
pub mod impute;
pub mod label;
pub mod windows;

use std::path::Path;
use std::sync::Arc;

use crash_hotspots_config::PipelineConfig;
use crash_hotspots_config::paths::DataPaths;
use crash_hotspots_config::progress::ProgressCallback;
use crash_hotspots_config::table::{self, TableError};
use crash_hotspots_crash_models::{LinkedPerson, SnappedCrash};
use crash_hotspots_feature_models::{FeatureRow, ImputationSummary, LabelStats};
use crash_hotspots_geography::GeoError;
use crash_hotspots_geography::demographics::TractLookup;
use crash_hotspots_spatial::{BoundaryIndex, SpatialError};

use crate::aggregate::EventLog;
use crate::enrich::{COMMUNITY_ID_PROPERTY, COMMUNITY_NAME_PROPERTY, Enricher};
use crate::windows::{CutoffWindows, cutoff_schedule};

/// Errors from the feature stage.
#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    /// Reading or writing a table failed.
    #[error(transparent)]
    Table(#[from] TableError),

    /// Loading tract demographics failed.
    #[error(transparent)]
    Geo(#[from] GeoError),

    /// Loading a boundary layer failed.
    #[error(transparent)]
    Spatial(#[from] SpatialError),

    /// There is not enough data to build any snapshot.
    #[error("Cannot build features: {message}")]
    Insufficient {
        /// What is lacking.
        message: String,
    },
}

/// The finished feature table with its side outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    /// Rows sorted by cutoff, then intersection.
    pub rows: Vec<FeatureRow>,
    pub imputation: ImputationSummary,
    pub labels: Vec<LabelStats>,
}

/// Builds the feature table from in-memory inputs.
///
/// # Errors
///
/// Returns [`FeatureError::Insufficient`] if there are no matched crashes
/// or the data span is too short for a single cutoff.
pub fn build(
    snapped: &[SnappedCrash],
    people: &[LinkedPerson],
    enricher: &Enricher,
    config: &PipelineConfig,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<FeatureTable, FeatureError> {
    let events = EventLog::new(snapped, people);
    let Some((min_ts, max_ts)) = events.time_range() else {
        return Err(FeatureError::Insufficient {
            message: "no matched crashes".to_string(),
        });
    };
    log::info!("Matched crash span: {min_ts} to {max_ts}");

    let cutoffs = cutoff_schedule(min_ts, max_ts, &config.windows);
    let (Some(first), Some(last)) = (cutoffs.first(), cutoffs.last()) else {
        return Err(FeatureError::Insufficient {
            message: format!(
                "span {} to {} is shorter than {} + {} + {} days",
                min_ts.date(),
                max_ts.date(),
                config.windows.history_days,
                config.windows.recent_days,
                config.windows.predict_days
            ),
        });
    };
    log::info!("Building {} snapshots, {first} to {last}", cutoffs.len());

    progress.set_total(cutoffs.len() as u64);
    progress.set_message("aggregating windows".to_string());
    let mut temporal = Vec::new();
    for cutoff in &cutoffs {
        let windows = CutoffWindows::new(*cutoff, &config.windows);
        let rows = events.aggregate_cutoff(&windows);
        log::debug!("Cutoff {cutoff}: {} intersections", rows.len());
        temporal.extend(rows);
        progress.inc(1);
    }
    progress.finish_and_clear();

    let enriched = enricher.enrich(temporal);
    let (mut rows, imputation) = impute::impute(enriched);
    rows.sort_by_key(|r| (r.cutoff_date, r.intersection_id));
    let labels = label::apply_labels(&mut rows, &config.label);

    Ok(FeatureTable {
        rows,
        imputation,
        labels,
    })
}

/// Loads the optional enrichment layers and the network tables.
///
/// # Errors
///
/// Returns [`FeatureError`] if a present layer fails to load or the node
/// and centrality tables are missing.
pub fn load_enricher(paths: &DataPaths) -> Result<Enricher, FeatureError> {
    let nodes = crash_hotspots_network::load_nodes(&paths.osm_nodes())?;
    let centrality = crash_hotspots_network::load_centrality(&paths.centrality())?;

    let tracts_path = paths.tracts_geojson();
    let tracts = if tracts_path.exists() {
        Some(TractLookup::load(&tracts_path, &paths.acs_raw())?)
    } else {
        log::warn!(
            "{} not found, demographics will be imputed",
            tracts_path.display()
        );
        None
    };

    let communities_path = paths.community_areas_geojson();
    let communities = if communities_path.exists() {
        Some(BoundaryIndex::load(
            &communities_path,
            COMMUNITY_ID_PROPERTY,
            Some(COMMUNITY_NAME_PROPERTY),
        )?)
    } else {
        log::warn!(
            "{} not found, community areas will be UNKNOWN",
            communities_path.display()
        );
        None
    };

    Ok(Enricher::new(&nodes, centrality, tracts, communities))
}

/// Runs the feature stage end to end.
///
/// Writes `intersection_features_temporal.csv` and `imputation.json`.
///
/// # Errors
///
/// Returns [`FeatureError`] if an input is missing, the data is
/// insufficient, or an output cannot be written.
pub fn run(
    paths: &DataPaths,
    config: &PipelineConfig,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<FeatureTable, FeatureError> {
    let snapped: Vec<SnappedCrash> = table::read_csv(&paths.crashes_with_nodes())?;

    let people_path = paths.people_with_nodes();
    let people: Vec<LinkedPerson> = if people_path.exists() {
        table::read_csv(&people_path)?
    } else {
        log::warn!(
            "{} not found, injury counts will be 0",
            people_path.display()
        );
        Vec::new()
    };

    let enricher = load_enricher(paths)?;
    let features = build(&snapped, &people, &enricher, config, progress)?;

    table::write_csv(&paths.features_temporal(), &features.rows)?;
    table::write_json(&paths.imputation_summary(), &features.imputation)?;

    let positives: usize = features.labels.iter().map(|l| l.positives).sum();
    log::info!(
        "Wrote {} feature rows across {} cutoffs ({positives} hotspots) to {}",
        features.rows.len(),
        features.labels.len(),
        paths.features_temporal().display()
    );
    Ok(features)
}

/// Loads the feature table.
///
/// # Errors
///
/// Returns [`TableError`] if the file is missing or malformed.
pub fn load_features(path: &Path) -> Result<Vec<FeatureRow>, TableError> {
    table::read_csv(path)
}
