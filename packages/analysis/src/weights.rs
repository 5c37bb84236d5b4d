//! Row-standardized k-nearest-neighbor spatial weights.

use rstar::{RTree, primitives::GeomWithData};

type IndexedPoint = GeomWithData<[f64; 2], usize>;

/// Each observation's `k` nearest others, weighted `1 / k`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnnWeights {
    neighbors: Vec<Vec<usize>>,
}

impl KnnWeights {
    /// Builds weights over projected points. `k` is capped at `n - 1`;
    /// equidistant candidates resolve to the lower index.
    #[must_use]
    pub fn new(points: &[[f64; 2]], k: usize) -> Self {
        let k = k.min(points.len().saturating_sub(1));
        let tree = RTree::bulk_load(
            points
                .iter()
                .enumerate()
                .map(|(i, p)| GeomWithData::new(*p, i))
                .collect::<Vec<IndexedPoint>>(),
        );

        let neighbors = points
            .iter()
            .enumerate()
            .map(|(i, p)| {
                if k == 0 {
                    return Vec::new();
                }
                let mut found: Vec<(f64, usize)> = Vec::with_capacity(k + 1);
                for (candidate, d2) in tree.nearest_neighbor_iter_with_distance_2(p) {
                    if candidate.data == i {
                        continue;
                    }
                    if found.len() >= k && d2 > found[k - 1].0 {
                        break;
                    }
                    found.push((d2, candidate.data));
                }
                found.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
                found.truncate(k);
                found.into_iter().map(|(_, j)| j).collect()
            })
            .collect();

        Self { neighbors }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    #[must_use]
    pub fn neighbors(&self, i: usize) -> &[usize] {
        &self.neighbors[i]
    }

    /// Spatial lag: the mean of each observation's neighbor values.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn lag(&self, values: &[f64]) -> Vec<f64> {
        self.neighbors
            .iter()
            .map(|nbrs| {
                if nbrs.is_empty() {
                    0.0
                } else {
                    nbrs.iter().map(|&j| values[j]).sum::<f64>() / nbrs.len() as f64
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line() -> Vec<[f64; 2]> {
        (0..5).map(|i| [f64::from(i) * 10.0, 0.0]).collect()
    }

    #[test]
    fn finds_nearest_others() {
        let w = KnnWeights::new(&line(), 2);
        assert_eq!(w.neighbors(0), &[1, 2]);
        // 1 and 3 are equidistant from 2.
        assert_eq!(w.neighbors(2), &[1, 3]);
        assert_eq!(w.neighbors(4), &[3, 2]);
    }

    #[test]
    fn equidistant_ties_take_lower_index() {
        let w = KnnWeights::new(&line(), 1);
        assert_eq!(w.neighbors(2), &[1]);
    }

    #[test]
    fn k_is_capped() {
        let w = KnnWeights::new(&line()[..3], 8);
        assert_eq!(w.neighbors(0).len(), 2);
        assert!(KnnWeights::new(&line()[..1], 8).neighbors(0).is_empty());
    }

    #[test]
    fn lag_is_row_standardized() {
        let w = KnnWeights::new(&line(), 2);
        let lag = w.lag(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!((lag[0] - 2.5).abs() < 1e-12);
        assert!((lag[2] - 3.0).abs() < 1e-12);
    }
}
