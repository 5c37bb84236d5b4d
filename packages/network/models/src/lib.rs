#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Road network record types shared by the network, snapping, and feature
//! stages.

use serde::{Deserialize, Serialize};

/// An intersection node of the simplified drivable road graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadNode {
    /// OSM node id.
    pub node_id: i64,
    /// WGS84 longitude.
    pub lon: f64,
    /// WGS84 latitude.
    pub lat: f64,
    /// Projected easting in meters.
    pub x: f64,
    /// Projected northing in meters.
    pub y: f64,
}

/// An undirected road segment between two kept nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadEdge {
    /// Lower of the two endpoint ids.
    pub from_node: i64,
    /// Higher of the two endpoint ids.
    pub to_node: i64,
    /// Sum of projected segment lengths along the way, in meters.
    pub length_m: f64,
}

/// Centrality scores for one intersection.
///
/// All three scores are normalized to `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeCentrality {
    pub node_id: i64,
    pub degree: f64,
    pub closeness: f64,
    pub betweenness: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centrality_csv_header_matches_fields() {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .serialize(NodeCentrality {
                node_id: 42,
                degree: 0.5,
                closeness: 0.25,
                betweenness: 0.0,
            })
            .unwrap();
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        let header = text.lines().next().unwrap();
        assert_eq!(header, "node_id,degree,closeness,betweenness");
    }
}
