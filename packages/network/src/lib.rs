#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Road network stage.
//!
//! Reads the drivable network from the OSM extract, simplifies it to
//! intersections, writes node and edge tables, and computes centrality
//! for every intersection.

pub mod centrality;
pub mod graph;
pub mod osm;

use std::path::Path;
use std::sync::Arc;

use crash_hotspots_config::NetworkConfig;
use crash_hotspots_config::paths::DataPaths;
use crash_hotspots_config::progress::ProgressCallback;
use crash_hotspots_config::table::{self, TableError};
use crash_hotspots_network_models::{NodeCentrality, RoadEdge, RoadNode};
use crash_hotspots_spatial::projection::TransverseMercator;

pub use graph::RoadNetwork;
pub use osm::OsmError;

/// Errors from the network stage.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// OSM extraction failed.
    #[error(transparent)]
    Osm(#[from] OsmError),

    /// Reading or writing a network table failed.
    #[error(transparent)]
    Table(#[from] TableError),

    /// The extract produced no usable road graph.
    #[error("Empty road network: {message}")]
    Empty {
        /// What was empty.
        message: String,
    },
}

/// Counts reported after a network run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkSummary {
    pub nodes: usize,
    pub edges: usize,
}

/// Builds the intersection network and centrality tables.
///
/// Writes `osm_nodes.csv`, `osm_edges.csv`, and `centrality.csv` under the
/// processed directory.
///
/// # Errors
///
/// Returns [`NetworkError`] if the extract cannot be read, yields no
/// intersections, or an output table cannot be written.
pub fn run(
    paths: &DataPaths,
    config: &NetworkConfig,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<NetworkSummary, NetworkError> {
    let roads = osm::read_roads(&paths.osm_pbf())?;
    let network = RoadNetwork::simplify(&roads, &TransverseMercator::illinois_east());

    if network.nodes.is_empty() {
        return Err(NetworkError::Empty {
            message: format!("no drivable intersections in {}", paths.osm_pbf().display()),
        });
    }

    table::write_csv(&paths.osm_nodes(), &network.nodes)?;
    table::write_csv(&paths.osm_edges(), &network.edges)?;

    let graph = network.to_graph();
    let scores = centrality::compute(
        &graph.graph,
        config.betweenness_samples,
        config.seed,
        progress,
    );
    table::write_csv(&paths.centrality(), &scores)?;

    log::info!(
        "Network stage wrote {} nodes, {} edges, {} centrality rows",
        network.nodes.len(),
        network.edges.len(),
        scores.len()
    );

    Ok(NetworkSummary {
        nodes: network.nodes.len(),
        edges: network.edges.len(),
    })
}

/// Loads the intersection node table.
///
/// # Errors
///
/// Returns [`TableError`] if the file is missing or malformed.
pub fn load_nodes(path: &Path) -> Result<Vec<RoadNode>, TableError> {
    table::read_csv(path)
}

/// Loads the edge table.
///
/// # Errors
///
/// Returns [`TableError`] if the file is missing or malformed.
pub fn load_edges(path: &Path) -> Result<Vec<RoadEdge>, TableError> {
    table::read_csv(path)
}

/// Loads the centrality table.
///
/// # Errors
///
/// Returns [`TableError`] if the file is missing or malformed.
pub fn load_centrality(path: &Path) -> Result<Vec<NodeCentrality>, TableError> {
    table::read_csv(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_extract_is_an_osm_error() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path());
        let err = run(
            &paths,
            &NetworkConfig::default(),
            &crash_hotspots_config::progress::null_progress(),
        )
        .unwrap_err();
        assert!(matches!(err, NetworkError::Osm(OsmError::FileNotFound(_))));
    }

    #[test]
    fn node_table_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("osm_nodes.csv");
        let nodes = vec![RoadNode {
            node_id: 261_234_567,
            lon: -87.6298,
            lat: 41.8781,
            x: 358_398.1,
            y: 578_802.6,
        }];
        table::write_csv(&path, &nodes).unwrap();
        assert_eq!(load_nodes(&path).unwrap(), nodes);
    }
}
