//! Global and local Moran's I with permutation inference.
//!
//! Weights are row-standardized, so the global statistic reduces to
//! `sum(z_i * lag_i) / sum(z_i^2)`. Pseudo p-values are folded: the
//! count of permuted statistics at least as extreme in the direction of
//! the observed one, `(extreme + 1) / (permutations + 1)`.

use crash_hotspots_analysis_models::{GlobalMoran, LisaQuadrant};
use rand::SeedableRng as _;
use rand::rngs::StdRng;
use rand::seq::SliceRandom as _;

use crate::weights::KnnWeights;

/// Local statistic for one observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalMoran {
    pub local_i: f64,
    pub quadrant: LisaQuadrant,
    pub p_value: f64,
}

/// Deviations from the mean, or `None` if the values do not vary.
fn deviations(values: &[f64]) -> Option<Vec<f64>> {
    if values.len() < 3 {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let z: Vec<f64> = values.iter().map(|v| v - mean).collect();
    let ss: f64 = z.iter().map(|v| v * v).sum();
    (ss > 1e-12).then_some(z)
}

fn statistic(z: &[f64], weights: &KnnWeights) -> f64 {
    let lag = weights.lag(z);
    let numerator: f64 = z.iter().zip(&lag).map(|(a, b)| a * b).sum();
    let denominator: f64 = z.iter().map(|v| v * v).sum();
    numerator / denominator
}

#[allow(clippy::cast_precision_loss)]
fn folded_p_value(larger: usize, permutations: usize) -> f64 {
    let extreme = larger.min(permutations - larger);
    (extreme + 1) as f64 / (permutations + 1) as f64
}

/// Global Moran's I. `None` with fewer than three observations or no
/// variation.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn global_moran(
    values: &[f64],
    weights: &KnnWeights,
    permutations: usize,
    seed: u64,
) -> Option<GlobalMoran> {
    let z = deviations(values)?;
    let observed = statistic(&z, weights);
    let expected_i = -1.0 / (z.len() - 1) as f64;

    let mut rng = StdRng::seed_from_u64(seed);
    let mut shuffled = z.clone();
    let mut simulated = Vec::with_capacity(permutations);
    for _ in 0..permutations {
        shuffled.shuffle(&mut rng);
        simulated.push(statistic(&shuffled, weights));
    }

    let larger = simulated.iter().filter(|&&s| s >= observed).count();
    let p_value = if permutations == 0 {
        1.0
    } else {
        folded_p_value(larger, permutations)
    };

    let z_score = (permutations > 1).then(|| {
        let n = simulated.len() as f64;
        let mean = simulated.iter().sum::<f64>() / n;
        let var = simulated.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1.0);
        (var > 0.0).then(|| (observed - mean) / var.sqrt())
    });

    Some(GlobalMoran {
        i: observed,
        expected_i,
        p_value,
        z_score: z_score.flatten(),
        permutations,
    })
}

/// Local Moran's I for every observation with conditional permutation
/// p-values: each observation keeps its value while its neighbors are
/// redrawn without replacement from all other observations.
///
/// Returns an empty vector under the same conditions that make
/// [`global_moran`] return `None`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn local_moran(
    values: &[f64],
    weights: &KnnWeights,
    permutations: usize,
    seed: u64,
) -> Vec<LocalMoran> {
    let Some(z) = deviations(values) else {
        return Vec::new();
    };
    let n = z.len();
    let m2 = z.iter().map(|v| v * v).sum::<f64>() / n as f64;
    let lag = weights.lag(&z);
    let mut rng = StdRng::seed_from_u64(seed);

    (0..n)
        .map(|i| {
            let local_i = z[i] / m2 * lag[i];
            let k = weights.neighbors(i).len();

            let mut larger = 0usize;
            if k > 0 {
                for _ in 0..permutations {
                    let drawn: f64 = rand::seq::index::sample(&mut rng, n - 1, k)
                        .into_iter()
                        .map(|j| if j >= i { z[j + 1] } else { z[j] })
                        .sum();
                    let simulated = z[i] / m2 * (drawn / k as f64);
                    if simulated >= local_i {
                        larger += 1;
                    }
                }
            }

            let p_value = if k == 0 || permutations == 0 {
                1.0
            } else {
                folded_p_value(larger, permutations)
            };
            LocalMoran {
                local_i,
                quadrant: LisaQuadrant::classify(z[i], lag[i]),
                p_value,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Ten high values near the origin and thirty low values 1 km away.
    fn clustered() -> (Vec<[f64; 2]>, Vec<f64>) {
        let mut points = Vec::new();
        let mut values = Vec::new();
        for i in 0..10 {
            points.push([f64::from(i) * 10.0, 0.0]);
            values.push(10.0 + f64::from(i % 2));
        }
        for i in 0..30 {
            points.push([1000.0 + f64::from(i) * 10.0, 0.0]);
            values.push(f64::from(i % 2));
        }
        (points, values)
    }

    #[test]
    fn clustered_values_autocorrelate() {
        let (points, values) = clustered();
        let w = KnnWeights::new(&points, 3);
        let moran = global_moran(&values, &w, 199, 42).unwrap();
        assert!(moran.i > 0.8, "I = {}", moran.i);
        assert!(moran.p_value < 0.01);
        assert!((moran.expected_i + 1.0 / 39.0).abs() < 1e-12);
        assert!(moran.z_score.unwrap() > 3.0);
    }

    #[test]
    fn permutations_are_seeded() {
        let (points, values) = clustered();
        let w = KnnWeights::new(&points, 3);
        assert_eq!(
            global_moran(&values, &w, 99, 7),
            global_moran(&values, &w, 99, 7)
        );
        assert_eq!(
            local_moran(&values, &w, 99, 7),
            local_moran(&values, &w, 99, 7)
        );
    }

    #[test]
    fn local_quadrants_and_significance() {
        let (points, values) = clustered();
        let w = KnnWeights::new(&points, 3);
        let local = local_moran(&values, &w, 999, 42);
        assert_eq!(local.len(), 40);
        assert_eq!(local[0].quadrant, LisaQuadrant::HighHigh);
        assert_eq!(local[10].quadrant, LisaQuadrant::LowLow);
        assert!(local.iter().all(|l| l.local_i > 0.0));
        assert!(local[0].p_value < 0.05);
    }

    #[test]
    fn constant_values_have_no_statistic() {
        let points: Vec<[f64; 2]> = (0..5).map(|i| [f64::from(i), 0.0]).collect();
        let w = KnnWeights::new(&points, 2);
        assert!(global_moran(&[3.0; 5], &w, 99, 1).is_none());
        assert!(local_moran(&[3.0; 5], &w, 99, 1).is_empty());
    }
}
