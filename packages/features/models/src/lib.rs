#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Row types of the temporal feature table.
//!
//! [`FeatureRow`] is one intersection at one as-of cutoff. Its field
//! names are the CSV column names of
//! `intersection_features_temporal.csv`.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Placeholder for categorical joins that found nothing.
pub const UNKNOWN: &str = "UNKNOWN";

/// Columns fed to classifiers, in [`FeatureRow::model_inputs`] order.
///
/// Future-window columns and the label never appear here.
pub const MODEL_FEATURES: &[&str] = &[
    "hist_crashes",
    "hist_severity",
    "hist_injuries_total",
    "hist_injuries_fatal",
    "hist_injuries_incapacitating",
    "hist_injuries_nonincap",
    "recent90_crashes",
    "recent90_severity",
    "recent90_injuries_total",
    "recent90_injuries_fatal",
    "recent90_injuries_incapacitating",
    "recent90_injuries_nonincap",
    "centrality_degree",
    "centrality_closeness",
    "centrality_betweenness",
    "acs_pop",
    "acs_median_income",
    "acs_households_with_vehicle",
    "acs_poverty_universe",
    "acs_vehicle_access_rate",
    "acs_pop_missing",
    "acs_median_income_missing",
    "acs_households_with_vehicle_missing",
    "acs_poverty_universe_missing",
    "acs_vehicle_access_rate_missing",
];

/// Crash and injury aggregates over one time window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowAggregate {
    pub crashes: u32,
    pub severity: u32,
    pub injuries_total: u32,
    pub injuries_fatal: u32,
    pub injuries_incapacitating: u32,
    pub injuries_nonincap: u32,
}

/// One intersection at one cutoff, fully enriched and imputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub intersection_id: i64,
    /// As-of date; windows are anchored at its midnight.
    pub cutoff_date: NaiveDate,

    pub hist_crashes: u32,
    pub hist_severity: u32,
    pub hist_injuries_total: u32,
    pub hist_injuries_fatal: u32,
    pub hist_injuries_incapacitating: u32,
    pub hist_injuries_nonincap: u32,

    pub recent90_crashes: u32,
    pub recent90_severity: u32,
    pub recent90_injuries_total: u32,
    pub recent90_injuries_fatal: u32,
    pub recent90_injuries_incapacitating: u32,
    pub recent90_injuries_nonincap: u32,

    /// Label source only.
    pub future_crashes: u32,
    /// Label source only.
    pub future_severity: u32,

    pub centrality_degree: f64,
    pub centrality_closeness: f64,
    pub centrality_betweenness: f64,

    #[serde(rename = "GEOID")]
    pub geoid: String,
    pub acs_pop: f64,
    pub acs_median_income: f64,
    pub acs_households_with_vehicle: f64,
    pub acs_poverty_universe: f64,
    pub acs_vehicle_access_rate: f64,
    pub acs_pop_missing: u8,
    pub acs_median_income_missing: u8,
    pub acs_households_with_vehicle_missing: u8,
    pub acs_poverty_universe_missing: u8,
    pub acs_vehicle_access_rate_missing: u8,

    pub community_id: String,
    pub community_name: String,

    pub label_hotspot: u8,
}

impl FeatureRow {
    /// Midnight at the cutoff date.
    #[must_use]
    pub fn cutoff(&self) -> NaiveDateTime {
        self.cutoff_date.and_time(NaiveTime::MIN)
    }

    /// History-window aggregates.
    #[must_use]
    pub const fn history(&self) -> WindowAggregate {
        WindowAggregate {
            crashes: self.hist_crashes,
            severity: self.hist_severity,
            injuries_total: self.hist_injuries_total,
            injuries_fatal: self.hist_injuries_fatal,
            injuries_incapacitating: self.hist_injuries_incapacitating,
            injuries_nonincap: self.hist_injuries_nonincap,
        }
    }

    /// Recent-window aggregates.
    #[must_use]
    pub const fn recent(&self) -> WindowAggregate {
        WindowAggregate {
            crashes: self.recent90_crashes,
            severity: self.recent90_severity,
            injuries_total: self.recent90_injuries_total,
            injuries_fatal: self.recent90_injuries_fatal,
            injuries_incapacitating: self.recent90_injuries_incapacitating,
            injuries_nonincap: self.recent90_injuries_nonincap,
        }
    }

    /// Whether the row is labeled a hotspot.
    #[must_use]
    pub const fn is_hotspot(&self) -> bool {
        self.label_hotspot == 1
    }

    /// Model input vector in [`MODEL_FEATURES`] order.
    #[must_use]
    pub fn model_inputs(&self) -> Vec<f64> {
        vec![
            f64::from(self.hist_crashes),
            f64::from(self.hist_severity),
            f64::from(self.hist_injuries_total),
            f64::from(self.hist_injuries_fatal),
            f64::from(self.hist_injuries_incapacitating),
            f64::from(self.hist_injuries_nonincap),
            f64::from(self.recent90_crashes),
            f64::from(self.recent90_severity),
            f64::from(self.recent90_injuries_total),
            f64::from(self.recent90_injuries_fatal),
            f64::from(self.recent90_injuries_incapacitating),
            f64::from(self.recent90_injuries_nonincap),
            self.centrality_degree,
            self.centrality_closeness,
            self.centrality_betweenness,
            self.acs_pop,
            self.acs_median_income,
            self.acs_households_with_vehicle,
            self.acs_poverty_universe,
            self.acs_vehicle_access_rate,
            f64::from(self.acs_pop_missing),
            f64::from(self.acs_median_income_missing),
            f64::from(self.acs_households_with_vehicle_missing),
            f64::from(self.acs_poverty_universe_missing),
            f64::from(self.acs_vehicle_access_rate_missing),
        ]
    }
}

/// How a column's missing values were filled.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ImputationStrategy {
    /// Absence of crashes.
    Zero,
    /// Median of present values.
    Median,
    /// Median of present values plus a `*_missing` indicator column.
    MedianWithIndicator,
    /// The [`UNKNOWN`] category.
    Unknown,
}

/// Imputation applied to one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImputedColumn {
    pub column: String,
    pub strategy: ImputationStrategy,
    pub missing: usize,
    /// Rendered fill value.
    pub fill_value: String,
}

/// Every imputation applied to the feature table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImputationSummary {
    pub rows: usize,
    pub columns: Vec<ImputedColumn>,
}

impl ImputationSummary {
    /// Missing count recorded for a column, if it was imputed.
    #[must_use]
    pub fn missing(&self, column: &str) -> Option<usize> {
        self.columns
            .iter()
            .find(|c| c.column == column)
            .map(|c| c.missing)
    }
}

/// Hotspot label statistics for one cutoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelStats {
    pub cutoff_date: NaiveDate,
    pub rows: usize,
    pub threshold: f64,
    pub positives: usize,
    pub prevalence: f64,
}
