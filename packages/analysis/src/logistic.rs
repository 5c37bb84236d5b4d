//! L2-regularized logistic regression on standardized inputs, fitted by
//! full-batch gradient descent.

use crash_hotspots_config::ModelConfig;

/// Per-column mean and population standard deviation.
#[derive(Debug, Clone, PartialEq)]
pub struct Standardizer {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl Standardizer {
    /// Fits on row-major inputs. Constant columns get a scale of 1.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let width = rows.first().map_or(0, Vec::len);
        let n = rows.len().max(1) as f64;

        let mut means = vec![0.0; width];
        for row in rows {
            for (m, v) in means.iter_mut().zip(row) {
                *m += v;
            }
        }
        for m in &mut means {
            *m /= n;
        }

        let mut scales = vec![0.0; width];
        for row in rows {
            for ((s, v), m) in scales.iter_mut().zip(row).zip(&means) {
                *s += (v - m).powi(2);
            }
        }
        for s in &mut scales {
            *s = (*s / n).sqrt();
            if *s < 1e-12 {
                *s = 1.0;
            }
        }

        Self { means, scales }
    }

    #[must_use]
    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(&self.means)
            .zip(&self.scales)
            .map(|((v, m), s)| (v - m) / s)
            .collect()
    }
}

/// Numerically stable logistic function.
#[must_use]
pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogisticRegression {
    pub standardizer: Standardizer,
    /// Weights on standardized inputs.
    pub weights: Vec<f64>,
    pub intercept: f64,
}

impl LogisticRegression {
    /// Fits on raw inputs and 0/1 targets. Returns `None` for an empty
    /// training set.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fit(rows: &[Vec<f64>], labels: &[bool], config: &ModelConfig) -> Option<Self> {
        if rows.is_empty() || rows.len() != labels.len() {
            return None;
        }

        let standardizer = Standardizer::fit(rows);
        let x: Vec<Vec<f64>> = rows.iter().map(|r| standardizer.transform(r)).collect();
        let width = x[0].len();
        let n = x.len() as f64;

        let mut weights = vec![0.0; width];
        let mut intercept = 0.0;
        let mut grad = vec![0.0; width];

        for epoch in 0..config.epochs {
            grad.iter_mut().for_each(|g| *g = 0.0);
            let mut grad_intercept = 0.0;
            let mut loss = 0.0;

            for (row, &label) in x.iter().zip(labels) {
                let p = sigmoid(intercept + dot(&weights, row));
                let err = p - f64::from(u8::from(label));
                for (g, v) in grad.iter_mut().zip(row) {
                    *g += err * v;
                }
                grad_intercept += err;
                let p = p.clamp(1e-15, 1.0 - 1e-15);
                loss -= if label { p.ln() } else { (1.0 - p).ln() };
            }

            for (w, g) in weights.iter_mut().zip(&grad) {
                *w -= config.learning_rate * (g / n + config.l2 * *w);
            }
            intercept -= config.learning_rate * grad_intercept / n;

            if epoch % 100 == 0 {
                log::debug!("epoch {epoch}: log loss {:.5}", loss / n);
            }
        }

        Some(Self {
            standardizer,
            weights,
            intercept,
        })
    }

    /// Probability of the positive class for one raw input row.
    #[must_use]
    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        let x = self.standardizer.transform(row);
        sigmoid(self.intercept + dot(&self.weights, &x))
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standardizes_to_zero_mean_unit_scale() {
        let rows = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let s = Standardizer::fit(&rows);
        assert_eq!(s.transform(&[1.0, 5.0]), vec![-1.0, 0.0]);
        assert_eq!(s.transform(&[3.0, 5.0]), vec![1.0, 0.0]);
    }

    #[test]
    fn sigmoid_is_stable_at_extremes() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
        assert!(sigmoid(-800.0) >= 0.0);
        assert!((sigmoid(800.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn learns_a_separable_rule() {
        let rows: Vec<Vec<f64>> = (0..40).map(|i| vec![f64::from(i), 1.0]).collect();
        let labels: Vec<bool> = (0..40).map(|i| i >= 30).collect();
        let model = LogisticRegression::fit(&rows, &labels, &ModelConfig::default()).unwrap();

        assert!(model.weights[0] > 0.0);
        assert!(model.weights[1].abs() < 1e-9);
        assert!(model.predict_proba(&[39.0, 1.0]) > 0.5);
        assert!(model.predict_proba(&[0.0, 1.0]) < 0.1);
        assert!(model.predict_proba(&[35.0, 1.0]) > model.predict_proba(&[25.0, 1.0]));
    }

    #[test]
    fn empty_training_set_fits_nothing() {
        assert!(LogisticRegression::fit(&[], &[], &ModelConfig::default()).is_none());
    }
}
