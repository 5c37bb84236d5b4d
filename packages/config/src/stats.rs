//! Order statistics shared by the snapping, labeling, and analysis stages.

/// Linearly interpolated quantile of an ascending slice.
///
/// Uses the `(n - 1) * q` position convention, so `q = 0.5` on an
/// even-length slice averages the two middle values. Returns `None` for
/// an empty slice.
#[must_use]
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let q = q.clamp(0.0, 1.0);
    #[allow(clippy::cast_precision_loss)]
    let pos = last as f64 * q;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let lower = pos.floor() as usize;
    let upper = (lower + 1).min(last);
    #[allow(clippy::cast_precision_loss)]
    let frac = pos - lower as f64;
    Some(sorted[upper].mul_add(frac, sorted[lower] * (1.0 - frac)))
}

/// Linearly interpolated quantile of unsorted values.
#[must_use]
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    quantile_sorted(&sorted, q)
}

/// Median of unsorted values.
#[must_use]
pub fn median(values: &[f64]) -> Option<f64> {
    quantile(values, 0.5)
}

/// Arithmetic mean.
#[must_use]
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = values.len() as f64;
    Some(values.iter().sum::<f64>() / n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolates_between_ranks() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert!((median(&values).unwrap() - 2.5).abs() < 1e-12);
        assert!((quantile(&values, 0.9).unwrap() - 3.7).abs() < 1e-12);
        assert!((quantile(&values, 0.0).unwrap() - 1.0).abs() < 1e-12);
        assert!((quantile(&values, 1.0).unwrap() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn unsorted_input_is_sorted_first() {
        assert!((median(&[5.0, 1.0, 3.0]).unwrap() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn empty_input_has_no_statistics() {
        assert!(median(&[]).is_none());
        assert!(mean(&[]).is_none());
    }

    #[test]
    fn single_value_is_every_quantile() {
        assert!((quantile(&[7.0], 0.95).unwrap() - 7.0).abs() < 1e-12);
    }
}
