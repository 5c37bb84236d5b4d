//! Drivable road extraction from an OpenStreetMap PBF extract.
//!
//! Runs two passes over the file: the first collects drivable `highway`
//! ways and their node references, the second resolves coordinates for
//! only the referenced nodes.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use osmpbf::{Element, ElementReader};

/// Highway classes that carry general motor traffic.
const DRIVABLE_HIGHWAYS: &[&str] = &[
    "motorway",
    "motorway_link",
    "trunk",
    "trunk_link",
    "primary",
    "primary_link",
    "secondary",
    "secondary_link",
    "tertiary",
    "tertiary_link",
    "unclassified",
    "residential",
    "living_street",
    "road",
];

/// A drivable way with its ordered node references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsmWay {
    pub id: i64,
    pub nodes: Vec<i64>,
}

/// Ways and node coordinates of the drivable network.
#[derive(Debug, Default)]
pub struct OsmRoads {
    /// Drivable ways sorted by way id.
    pub ways: Vec<OsmWay>,
    /// `node id -> (lon, lat)` for every node referenced by a way.
    pub coords: BTreeMap<i64, (f64, f64)>,
}

/// Errors from OSM PBF parsing.
#[derive(Debug, thiserror::Error)]
pub enum OsmError {
    /// PBF file not found.
    #[error("OSM PBF file not found: {0}")]
    FileNotFound(String),

    /// PBF parsing error.
    #[error("OSM PBF parse error in {path}: {message}")]
    Parse {
        /// Path to the PBF file.
        path: String,
        /// Error description.
        message: String,
    },
}

/// Whether a way's tags describe a road open to general motor traffic.
#[must_use]
pub fn is_drivable<'a>(tags: impl Iterator<Item = (&'a str, &'a str)>) -> bool {
    let mut highway = None;
    for (key, value) in tags {
        match (key, value) {
            ("highway", v) => highway = Some(v),
            ("area", "yes")
            | ("access", "private" | "no")
            | ("motor_vehicle" | "motorcar", "no") => return false,
            _ => {}
        }
    }
    highway.is_some_and(|h| DRIVABLE_HIGHWAYS.contains(&h))
}

/// Reads the drivable road network from a PBF file.
///
/// # Errors
///
/// Returns [`OsmError`] if the file is missing or cannot be decoded.
pub fn read_roads(path: &Path) -> Result<OsmRoads, OsmError> {
    if !path.exists() {
        return Err(OsmError::FileNotFound(path.display().to_string()));
    }

    let parse_error = |e: osmpbf::Error| OsmError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    };

    log::info!("Reading drivable ways from {}", path.display());
    let reader = ElementReader::from_path(path).map_err(parse_error)?;
    let mut ways = reader
        .par_map_reduce(
            |element| match element {
                Element::Way(way) if is_drivable(way.tags()) => vec![OsmWay {
                    id: way.id(),
                    nodes: way.refs().collect(),
                }],
                _ => Vec::new(),
            },
            Vec::new,
            |mut a, mut b| {
                a.append(&mut b);
                a
            },
        )
        .map_err(parse_error)?;
    ways.sort_by_key(|w| w.id);
    log::info!("Found {} drivable ways", ways.len());

    let wanted: HashSet<i64> = ways.iter().flat_map(|w| w.nodes.iter().copied()).collect();

    log::info!("Resolving coordinates for {} nodes", wanted.len());
    let reader = ElementReader::from_path(path).map_err(parse_error)?;
    let located = reader
        .par_map_reduce(
            |element| {
                let (id, lon, lat) = match element {
                    Element::Node(node) => (node.id(), node.lon(), node.lat()),
                    Element::DenseNode(node) => (node.id(), node.lon(), node.lat()),
                    Element::Way(_) | Element::Relation(_) => return Vec::new(),
                };
                if wanted.contains(&id) {
                    vec![(id, lon, lat)]
                } else {
                    Vec::new()
                }
            },
            Vec::new,
            |mut a, mut b| {
                a.append(&mut b);
                a
            },
        )
        .map_err(parse_error)?;

    let coords: BTreeMap<i64, (f64, f64)> = located
        .into_iter()
        .map(|(id, lon, lat)| (id, (lon, lat)))
        .collect();

    let missing = wanted.len().saturating_sub(coords.len());
    if missing > 0 {
        log::warn!("{missing} way nodes have no coordinates in the extract");
    }

    Ok(OsmRoads { ways, coords })
}
