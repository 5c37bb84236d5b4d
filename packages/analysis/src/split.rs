//! Chronological split by cutoff period.
//!
//! Rows are never shuffled across time: every training period precedes
//! every validation period, which precedes every test period.

use chrono::NaiveDate;
use crash_hotspots_analysis_models::SplitSummary;
use crash_hotspots_config::ModelConfig;
use crash_hotspots_feature_models::FeatureRow;

/// Cutoff periods per split, each list ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodSplit {
    pub train: Vec<NaiveDate>,
    pub validation: Vec<NaiveDate>,
    pub test: Vec<NaiveDate>,
}

/// Rows of each split, borrowed from the feature table.
#[derive(Debug, Default)]
pub struct SplitRows<'a> {
    pub train: Vec<&'a FeatureRow>,
    pub validation: Vec<&'a FeatureRow>,
    pub test: Vec<&'a FeatureRow>,
}

/// Splits distinct cutoffs into train, validation, and test periods.
///
/// The first `train_fraction` of periods train and the next
/// `validation_fraction` validate; the rest test. With three or more
/// periods each split gets at least one. Two periods become one train
/// and one test period with no validation. Fewer than two cannot be
/// split.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn split_periods(cutoffs: &[NaiveDate], config: &ModelConfig) -> Option<PeriodSplit> {
    let mut periods = cutoffs.to_vec();
    periods.sort_unstable();
    periods.dedup();
    let n = periods.len();
    if n < 2 {
        return None;
    }

    let (train_end, validation_end) = if n >= 3 {
        let n_f = n as f64;
        let train_end = ((n_f * config.train_fraction).floor() as usize).clamp(1, n - 2);
        let validation_end = ((n_f * (config.train_fraction + config.validation_fraction)).floor()
            as usize)
            .clamp(train_end + 1, n - 1);
        (train_end, validation_end)
    } else {
        (1, 1)
    };

    Some(PeriodSplit {
        train: periods[..train_end].to_vec(),
        validation: periods[train_end..validation_end].to_vec(),
        test: periods[validation_end..].to_vec(),
    })
}

impl PeriodSplit {
    /// Assigns every row to its period's split.
    #[must_use]
    pub fn partition<'a>(&self, rows: &'a [FeatureRow]) -> SplitRows<'a> {
        let mut out = SplitRows::default();
        for row in rows {
            if self.train.contains(&row.cutoff_date) {
                out.train.push(row);
            } else if self.validation.contains(&row.cutoff_date) {
                out.validation.push(row);
            } else if self.test.contains(&row.cutoff_date) {
                out.test.push(row);
            }
        }
        out
    }

    #[must_use]
    pub fn summary(&self, rows: &SplitRows<'_>) -> SplitSummary {
        SplitSummary {
            train_cutoffs: self.train.clone(),
            validation_cutoffs: self.validation.clone(),
            test_cutoffs: self.test.clone(),
            train_rows: rows.train.len(),
            validation_rows: rows.validation.len(),
            test_rows: rows.test.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn periods(n: u32) -> Vec<NaiveDate> {
        (0..n)
            .map(|i| NaiveDate::from_ymd_opt(2019, 1, 1).unwrap() + chrono::Duration::days(180 * i64::from(i)))
            .collect()
    }

    fn sizes(split: &PeriodSplit) -> (usize, usize, usize) {
        (split.train.len(), split.validation.len(), split.test.len())
    }

    #[test]
    fn ten_periods_split_seventy_fifteen_fifteen() {
        let split = split_periods(&periods(10), &ModelConfig::default()).unwrap();
        assert_eq!(sizes(&split), (7, 1, 2));
        assert!(split.train.last().unwrap() < split.validation.first().unwrap());
        assert!(split.validation.last().unwrap() < split.test.first().unwrap());
    }

    #[test]
    fn small_schedules_keep_every_split() {
        let config = ModelConfig::default();
        assert_eq!(sizes(&split_periods(&periods(3), &config).unwrap()), (1, 1, 1));
        assert_eq!(sizes(&split_periods(&periods(4), &config).unwrap()), (2, 1, 1));
        assert_eq!(sizes(&split_periods(&periods(2), &config).unwrap()), (1, 0, 1));
        assert!(split_periods(&periods(1), &config).is_none());
    }

    #[test]
    fn duplicate_cutoffs_count_once() {
        let mut cutoffs = periods(3);
        cutoffs.extend(periods(3));
        let split = split_periods(&cutoffs, &ModelConfig::default()).unwrap();
        assert_eq!(sizes(&split), (1, 1, 1));
    }
}
