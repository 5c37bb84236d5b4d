//! Ranking and thresholded classification metrics.
//!
//! Scores are ranked descending; ties share a rank (ROC AUC) or form a
//! single threshold step (average precision, threshold search).

use crash_hotspots_analysis_models::ClassifierMetrics;

/// Row indices by descending score, ties by ascending index.
#[must_use]
pub fn ranked(scores: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));
    order
}

/// Cumulative true/false positives at the end of each tied-score group,
/// walking from the highest score down. Yields `(score, tp, fp)`.
fn threshold_steps(scores: &[f64], labels: &[bool]) -> Vec<(f64, usize, usize)> {
    let order = ranked(scores);
    let mut steps = Vec::new();
    let (mut tp, mut fp) = (0usize, 0usize);
    for (pos, &i) in order.iter().enumerate() {
        if labels[i] {
            tp += 1;
        } else {
            fp += 1;
        }
        let group_ends = order
            .get(pos + 1)
            .is_none_or(|&next| scores[next].total_cmp(&scores[i]).is_ne());
        if group_ends {
            steps.push((scores[i], tp, fp));
        }
    }
    steps
}

/// Area under the ROC curve via the rank-sum statistic with averaged
/// ranks for ties. `None` unless both classes are present.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn roc_auc(scores: &[f64], labels: &[bool]) -> Option<f64> {
    let positives = labels.iter().filter(|&&l| l).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut positive_rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end + 1 < order.len() && scores[order[end + 1]].total_cmp(&scores[order[start]]).is_eq() {
            end += 1;
        }
        let average_rank = (start + end) as f64 / 2.0 + 1.0;
        for &i in &order[start..=end] {
            if labels[i] {
                positive_rank_sum += average_rank;
            }
        }
        start = end + 1;
    }

    let p = positives as f64;
    let n = negatives as f64;
    Some((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * n))
}

/// Average precision: precision summed over recall increments at each
/// distinct threshold. `None` without positives.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn average_precision(scores: &[f64], labels: &[bool]) -> Option<f64> {
    let positives = labels.iter().filter(|&&l| l).count();
    if positives == 0 {
        return None;
    }
    let mut ap = 0.0;
    let mut previous_recall = 0.0;
    for (_, tp, fp) in threshold_steps(scores, labels) {
        let recall = tp as f64 / positives as f64;
        let precision = tp as f64 / (tp + fp) as f64;
        ap += (recall - previous_recall) * precision;
        previous_recall = recall;
    }
    Some(ap)
}

/// Precision, recall, and F1 when `score >= threshold` predicts positive.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn precision_recall_f1(scores: &[f64], labels: &[bool], threshold: f64) -> (f64, f64, f64) {
    let (mut tp, mut fp, mut fn_) = (0usize, 0usize, 0usize);
    for (&s, &l) in scores.iter().zip(labels) {
        match (s >= threshold, l) {
            (true, true) => tp += 1,
            (true, false) => fp += 1,
            (false, true) => fn_ += 1,
            (false, false) => {}
        }
    }
    let precision = if tp + fp == 0 {
        0.0
    } else {
        tp as f64 / (tp + fp) as f64
    };
    let recall = if tp + fn_ == 0 {
        0.0
    } else {
        tp as f64 / (tp + fn_) as f64
    };
    let f1 = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    };
    (precision, recall, f1)
}

/// Score threshold that maximizes F1. Ties go to the higher threshold.
/// Falls back to 0.5 when there is nothing to choose from.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn best_f1_threshold(scores: &[f64], labels: &[bool]) -> f64 {
    let positives = labels.iter().filter(|&&l| l).count();
    let mut best: Option<(f64, f64)> = None;
    for (score, tp, fp) in threshold_steps(scores, labels) {
        let f1 = 2.0 * tp as f64 / (2 * tp + fp + (positives - tp)) as f64;
        if best.is_none_or(|(best_f1, _)| f1 > best_f1) {
            best = Some((f1, score));
        }
    }
    best.map_or(0.5, |(_, threshold)| threshold)
}

/// Precision among the top `ceil(fraction * n)` ranked rows.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn precision_at_k(scores: &[f64], labels: &[bool], fraction: f64) -> (usize, f64) {
    if scores.is_empty() {
        return (0, 0.0);
    }
    let k = ((scores.len() as f64 * fraction).ceil() as usize).clamp(1, scores.len());
    let hits = ranked(scores)
        .into_iter()
        .take(k)
        .filter(|&i| labels[i])
        .count();
    (k, hits as f64 / k as f64)
}

/// Test-set metrics for one ranking at a fixed threshold.
#[must_use]
pub fn evaluate(
    model: &str,
    scores: &[f64],
    labels: &[bool],
    threshold: f64,
    top_k_fraction: f64,
) -> ClassifierMetrics {
    let (precision, recall, f1) = precision_recall_f1(scores, labels, threshold);
    let (k, precision_at_k) = precision_at_k(scores, labels, top_k_fraction);
    ClassifierMetrics {
        model: model.to_string(),
        roc_auc: roc_auc(scores, labels),
        average_precision: average_precision(scores, labels),
        threshold,
        precision,
        recall,
        f1,
        k,
        precision_at_k,
        test_rows: scores.len(),
        test_positives: labels.iter().filter(|&&l| l).count(),
    }
}
