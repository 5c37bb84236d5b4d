//! Nearest-intersection snapping over projected coordinates.

use rstar::{RTree, primitives::GeomWithData};

/// A projected node position tagged with its node id.
type NodePoint = GeomWithData<[f64; 2], i64>;

/// Outcome of snapping one point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapResult {
    /// Nearest node id.
    pub node_id: i64,
    /// Euclidean distance to that node in meters.
    pub distance_m: f64,
    /// Whether `distance_m <= tolerance`.
    pub matched: bool,
}

/// R-tree over projected intersection coordinates with a match tolerance.
pub struct Snapper {
    tree: RTree<NodePoint>,
    tolerance_m: f64,
}

impl Snapper {
    /// Builds the index from `(node_id, x, y)` triples.
    #[must_use]
    pub fn new(nodes: impl IntoIterator<Item = (i64, f64, f64)>, tolerance_m: f64) -> Self {
        let points: Vec<NodePoint> = nodes
            .into_iter()
            .filter(|(_, x, y)| x.is_finite() && y.is_finite())
            .map(|(id, x, y)| GeomWithData::new([x, y], id))
            .collect();
        log::info!(
            "Built snapping index over {} nodes (tolerance {tolerance_m} m)",
            points.len()
        );
        Self {
            tree: RTree::bulk_load(points),
            tolerance_m,
        }
    }

    /// Number of indexed nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// The configured tolerance in meters.
    #[must_use]
    pub const fn tolerance_m(&self) -> f64 {
        self.tolerance_m
    }

    /// Snaps a projected point to its nearest node.
    ///
    /// Nodes at exactly equal distance resolve to the lowest node id.
    /// Returns `None` only when the index is empty or the point is not
    /// finite.
    #[must_use]
    pub fn snap(&self, x: f64, y: f64) -> Option<SnapResult> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }

        let mut candidates = self.tree.nearest_neighbor_iter_with_distance_2(&[x, y]);
        let (first, best_d2) = candidates.next()?;
        let mut node_id = first.data;

        for (candidate, d2) in candidates {
            if d2 > best_d2 {
                break;
            }
            node_id = node_id.min(candidate.data);
        }

        let distance_m = best_d2.sqrt();
        Some(SnapResult {
            node_id,
            distance_m,
            matched: distance_m <= self.tolerance_m,
        })
    }
}
