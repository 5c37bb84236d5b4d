//! Degree, closeness, and sampled betweenness centrality over the
//! intersection graph.
//!
//! All three measures treat the graph as unweighted (hop distance), and
//! are normalized to `[0, 1]`:
//!
//! - degree: neighbor count over `n - 1`;
//! - closeness: `(r - 1) / Σd`, scaled by `(r - 1) / (n - 1)` where `r`
//!   is the size of the node's reachable set (Wasserman-Faust), so
//!   disconnected components do not inflate scores;
//! - betweenness: Brandes accumulation from `k` seeded random pivots,
//!   rescaled by `n / k` and `1 / ((n - 1)(n - 2))`.

use std::collections::VecDeque;
use std::sync::Arc;

use crash_hotspots_config::progress::ProgressCallback;
use crash_hotspots_network_models::NodeCentrality;
use petgraph::graph::{NodeIndex, UnGraph};
use rand::SeedableRng as _;
use rand::rngs::StdRng;

/// Adjacency lists indexed by petgraph node index.
fn adjacency(graph: &UnGraph<i64, f64>) -> Vec<Vec<usize>> {
    let mut adj = vec![Vec::new(); graph.node_count()];
    for idx in graph.node_indices() {
        let mut neighbors: Vec<usize> = graph.neighbors(idx).map(NodeIndex::index).collect();
        neighbors.sort_unstable();
        neighbors.dedup();
        adj[idx.index()] = neighbors;
    }
    adj
}

/// Normalized degree centrality.
#[must_use]
pub fn degree(adj: &[Vec<usize>]) -> Vec<f64> {
    let n = adj.len();
    if n <= 1 {
        return vec![0.0; n];
    }
    #[allow(clippy::cast_precision_loss)]
    let scale = 1.0 / (n - 1) as f64;
    #[allow(clippy::cast_precision_loss)]
    adj.iter().map(|nbrs| nbrs.len() as f64 * scale).collect()
}

/// Breadth-first hop distances from `source`; unreachable nodes are `None`.
fn bfs_distances(adj: &[Vec<usize>], source: usize) -> Vec<Option<u32>> {
    let mut dist = vec![None; adj.len()];
    let mut queue = VecDeque::new();
    dist[source] = Some(0);
    queue.push_back(source);

    while let Some(v) = queue.pop_front() {
        let next = dist[v].map_or(0, |d| d + 1);
        for &w in &adj[v] {
            if dist[w].is_none() {
                dist[w] = Some(next);
                queue.push_back(w);
            }
        }
    }
    dist
}

/// Closeness centrality with the reachable-set correction.
#[must_use]
pub fn closeness(adj: &[Vec<usize>], progress: &Arc<dyn ProgressCallback>) -> Vec<f64> {
    let n = adj.len();
    progress.set_total(n as u64);
    progress.set_message("closeness".to_string());

    let scores = (0..n)
        .map(|source| {
            let dist = bfs_distances(adj, source);
            let (reachable, total) = dist
                .iter()
                .flatten()
                .fold((0u64, 0u64), |(r, t), &d| (r + 1, t + u64::from(d)));
            progress.inc(1);

            if total == 0 || n <= 1 {
                return 0.0;
            }
            #[allow(clippy::cast_precision_loss)]
            let (r, t, n) = ((reachable - 1) as f64, total as f64, (n - 1) as f64);
            (r / t) * (r / n)
        })
        .collect();

    progress.finish_and_clear();
    scores
}

/// Approximate betweenness from `samples` seeded pivots.
///
/// With `samples >= n` every node is a pivot and the result is exact.
#[must_use]
pub fn betweenness(
    adj: &[Vec<usize>],
    samples: usize,
    seed: u64,
    progress: &Arc<dyn ProgressCallback>,
) -> Vec<f64> {
    let n = adj.len();
    let mut scores = vec![0.0; n];
    if n <= 2 {
        return scores;
    }

    let k = samples.min(n);
    let mut pivots = if k == n {
        (0..n).collect::<Vec<_>>()
    } else {
        let mut rng = StdRng::seed_from_u64(seed);
        rand::seq::index::sample(&mut rng, n, k).into_vec()
    };
    pivots.sort_unstable();

    progress.set_total(k as u64);
    progress.set_message(format!("betweenness ({k} pivots)"));

    let mut sigma = vec![0.0f64; n];
    let mut dist = vec![-1i64; n];
    let mut delta = vec![0.0f64; n];
    let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut stack = Vec::with_capacity(n);
    let mut queue = VecDeque::new();

    for &s in &pivots {
        sigma.fill(0.0);
        dist.fill(-1);
        delta.fill(0.0);
        for p in &mut preds {
            p.clear();
        }
        stack.clear();

        sigma[s] = 1.0;
        dist[s] = 0;
        queue.push_back(s);

        while let Some(v) = queue.pop_front() {
            stack.push(v);
            for &w in &adj[v] {
                if dist[w] < 0 {
                    dist[w] = dist[v] + 1;
                    queue.push_back(w);
                }
                if dist[w] == dist[v] + 1 {
                    sigma[w] += sigma[v];
                    preds[w].push(v);
                }
            }
        }

        while let Some(w) = stack.pop() {
            for &v in &preds[w] {
                delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
            }
            if w != s {
                scores[w] += delta[w];
            }
        }
        progress.inc(1);
    }

    #[allow(clippy::cast_precision_loss)]
    let scale = (n as f64 / k as f64) / ((n - 1) as f64 * (n - 2) as f64);
    for score in &mut scores {
        *score *= scale;
    }

    progress.finish_and_clear();
    scores
}

/// Computes all three measures and pairs them with OSM node ids.
///
/// Rows come back in graph insertion order (node id order for graphs
/// built by [`crate::graph::RoadNetwork::to_graph`]).
#[must_use]
pub fn compute(
    graph: &UnGraph<i64, f64>,
    samples: usize,
    seed: u64,
    progress: &Arc<dyn ProgressCallback>,
) -> Vec<NodeCentrality> {
    let adj = adjacency(graph);
    log::info!("Computing centrality for {} intersections", adj.len());

    let degree = degree(&adj);
    let closeness = closeness(&adj, progress);
    let betweenness = betweenness(&adj, samples, seed, progress);

    graph
        .node_indices()
        .map(|idx| {
            let i = idx.index();
            NodeCentrality {
                node_id: graph[idx],
                degree: degree[i],
                closeness: closeness[i],
                betweenness: betweenness[i],
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use crash_hotspots_config::progress::null_progress;

    use super::*;

    /// Path graph 0 - 1 - 2 - 3 - 4.
    fn path(n: usize) -> Vec<Vec<usize>> {
        (0..n)
            .map(|i| {
                let mut nbrs = Vec::new();
                if i > 0 {
                    nbrs.push(i - 1);
                }
                if i + 1 < n {
                    nbrs.push(i + 1);
                }
                nbrs
            })
            .collect()
    }

    /// Star with hub 0 and `leaves` spokes.
    fn star(leaves: usize) -> Vec<Vec<usize>> {
        let mut adj = vec![(1..=leaves).collect::<Vec<_>>()];
        adj.extend((1..=leaves).map(|_| vec![0]));
        adj
    }

    #[test]
    fn degree_is_normalized() {
        let d = degree(&star(4));
        assert!((d[0] - 1.0).abs() < 1e-12);
        assert!((d[1] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn closeness_on_path() {
        let c = closeness(&path(5), &null_progress());
        // Middle node: distances 1, 1, 2, 2 -> 4 / 6.
        assert!((c[2] - 4.0 / 6.0).abs() < 1e-12);
        // End node: distances 1, 2, 3, 4 -> 4 / 10.
        assert!((c[0] - 0.4).abs() < 1e-12);
    }

    #[test]
    fn closeness_scales_disconnected_components() {
        let mut adj = path(2);
        adj.push(Vec::new());
        adj.push(Vec::new());
        let c = closeness(&adj, &null_progress());
        // Reachable set of 2 in a graph of 4: (1 / 1) * (1 / 3).
        assert!((c[0] - 1.0 / 3.0).abs() < 1e-12);
        assert!(c[2].abs() < 1e-12);
    }

    #[test]
    fn exact_betweenness_of_star_hub_is_one() {
        let b = betweenness(&star(4), 100, 42, &null_progress());
        assert!((b[0] - 1.0).abs() < 1e-12);
        for leaf in &b[1..] {
            assert!(leaf.abs() < 1e-12);
        }
    }

    #[test]
    fn exact_betweenness_on_path() {
        let b = betweenness(&path(5), 5, 42, &null_progress());
        // Node 2 lies on 4 of the 6 pairs among the other 4 nodes.
        assert!((b[2] - 4.0 / 6.0).abs() < 1e-12);
        assert!((b[1] - 3.0 / 6.0).abs() < 1e-12);
        assert!(b[0].abs() < 1e-12);
    }

    #[test]
    fn sampled_betweenness_is_seeded() {
        let adj = path(40);
        let a = betweenness(&adj, 10, 7, &null_progress());
        let b = betweenness(&adj, 10, 7, &null_progress());
        assert_eq!(a, b);
    }

    #[test]
    fn compute_pairs_scores_with_osm_ids() {
        let mut graph = UnGraph::<i64, f64>::new_undirected();
        let a = graph.add_node(100);
        let b = graph.add_node(200);
        let c = graph.add_node(300);
        graph.add_edge(a, b, 10.0);
        graph.add_edge(b, c, 10.0);

        let rows = compute(&graph, 500, 42, &null_progress());
        let ids: Vec<i64> = rows.iter().map(|r| r.node_id).collect();
        assert_eq!(ids, vec![100, 200, 300]);
        assert!((rows[1].betweenness - 1.0).abs() < 1e-12);
        assert!((rows[1].degree - 1.0).abs() < 1e-12);
    }
}
