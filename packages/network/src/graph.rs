//! Intersection-level simplification of the drivable road network.
//!
//! A node is kept when it ends a way or is shared by two or more ways
//! (counting repeated visits within one way). Every run of intermediate
//! shape points between two kept nodes collapses into a single edge whose
//! length is the sum of the projected segment lengths.

use std::collections::{BTreeMap, HashMap};

use crash_hotspots_network_models::{RoadEdge, RoadNode};
use crash_hotspots_spatial::projection::TransverseMercator;
use petgraph::graph::{NodeIndex, UnGraph};

use crate::osm::OsmRoads;

/// Simplified road network with stable (id-sorted) node and edge order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoadNetwork {
    /// Kept intersections sorted by node id.
    pub nodes: Vec<RoadNode>,
    /// Undirected edges sorted by `(from_node, to_node)`.
    pub edges: Vec<RoadEdge>,
}

/// Undirected petgraph view of a [`RoadNetwork`].
pub struct IntersectionGraph {
    pub graph: UnGraph<i64, f64>,
    pub node_map: HashMap<i64, NodeIndex>,
}

impl RoadNetwork {
    /// Simplifies raw OSM ways into an intersection graph.
    ///
    /// Way references without coordinates are dropped before
    /// simplification. Self-loops are discarded and parallel edges keep
    /// the shortest length.
    #[must_use]
    pub fn simplify(roads: &OsmRoads, projection: &TransverseMercator) -> Self {
        let ways: Vec<Vec<i64>> = roads
            .ways
            .iter()
            .map(|way| {
                way.nodes
                    .iter()
                    .copied()
                    .filter(|id| roads.coords.contains_key(id))
                    .collect::<Vec<_>>()
            })
            .filter(|nodes| nodes.len() >= 2)
            .collect();

        let mut uses: HashMap<i64, u32> = HashMap::new();
        for nodes in &ways {
            for id in nodes {
                *uses.entry(*id).or_default() += 1;
            }
        }

        let projected: HashMap<i64, (f64, f64)> = roads
            .coords
            .iter()
            .map(|(&id, &(lon, lat))| (id, projection.project(lon, lat)))
            .collect();

        let mut edges: BTreeMap<(i64, i64), f64> = BTreeMap::new();

        for nodes in &ways {
            let last = nodes.len() - 1;
            let mut start = nodes[0];
            let mut length = 0.0;

            for (i, pair) in nodes.windows(2).enumerate() {
                let (a, b) = (projected[&pair[0]], projected[&pair[1]]);
                length += (b.0 - a.0).hypot(b.1 - a.1);

                let node = pair[1];
                let kept = i + 1 == last || uses.get(&node).copied().unwrap_or(0) >= 2;
                if !kept {
                    continue;
                }

                if node != start {
                    let key = (start.min(node), start.max(node));
                    edges
                        .entry(key)
                        .and_modify(|existing| *existing = existing.min(length))
                        .or_insert(length);
                }
                start = node;
                length = 0.0;
            }
        }

        let mut node_ids: Vec<i64> = edges.keys().flat_map(|&(a, b)| [a, b]).collect();
        node_ids.sort_unstable();
        node_ids.dedup();

        let nodes = node_ids
            .into_iter()
            .filter_map(|id| {
                let (lon, lat) = *roads.coords.get(&id)?;
                let (x, y) = *projected.get(&id)?;
                Some(RoadNode {
                    node_id: id,
                    lon,
                    lat,
                    x,
                    y,
                })
            })
            .collect::<Vec<_>>();

        let edges = edges
            .into_iter()
            .map(|((from_node, to_node), length_m)| RoadEdge {
                from_node,
                to_node,
                length_m,
            })
            .collect::<Vec<_>>();

        log::info!(
            "Simplified {} ways into {} intersections and {} edges",
            ways.len(),
            nodes.len(),
            edges.len()
        );

        Self { nodes, edges }
    }

    /// Builds the petgraph representation, nodes inserted in id order.
    #[must_use]
    pub fn to_graph(&self) -> IntersectionGraph {
        let mut graph = UnGraph::with_capacity(self.nodes.len(), self.edges.len());
        let mut node_map = HashMap::with_capacity(self.nodes.len());

        for node in &self.nodes {
            node_map.insert(node.node_id, graph.add_node(node.node_id));
        }
        for edge in &self.edges {
            if let (Some(&a), Some(&b)) = (node_map.get(&edge.from_node), node_map.get(&edge.to_node))
            {
                graph.add_edge(a, b, edge.length_m);
            }
        }

        IntersectionGraph { graph, node_map }
    }
}
