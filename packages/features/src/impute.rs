//! Missing-value imputation for the enriched feature table.
//!
//! Counts absent from a window become 0, centrality gaps take the
//! median of present values, demographic gaps take the median plus a
//! `*_missing` indicator, and categorical gaps become `UNKNOWN`.

use crash_hotspots_config::stats;
use crash_hotspots_feature_models::{
    FeatureRow, ImputationStrategy, ImputationSummary, ImputedColumn, UNKNOWN,
};

use crate::aggregate::CrashTotals;
use crate::enrich::{EnrichedRow, StaticAttributes};

type Accessor = fn(&StaticAttributes) -> Option<f64>;

/// Median of the present values in a column and how many were missing.
struct NumericFill {
    value: f64,
    missing: usize,
}

impl NumericFill {
    fn compute(column: &str, rows: &[EnrichedRow], get: Accessor) -> Self {
        let present: Vec<f64> = rows.iter().filter_map(|r| get(&r.attributes)).collect();
        let missing = rows.len() - present.len();
        let value = stats::median(&present).unwrap_or_else(|| {
            if !rows.is_empty() {
                log::warn!("{column}: no present values, filling with 0");
            }
            0.0
        });
        Self { value, missing }
    }
}

fn record(
    summary: &mut ImputationSummary,
    column: &str,
    strategy: ImputationStrategy,
    missing: usize,
    fill_value: String,
) {
    if missing > 0 {
        log::info!("  {column}: {missing} -> {fill_value} ({strategy})");
    }
    summary.columns.push(ImputedColumn {
        column: column.to_string(),
        strategy,
        missing,
        fill_value,
    });
}

fn count_missing(rows: &[EnrichedRow], present: impl Fn(&EnrichedRow) -> bool) -> usize {
    rows.iter().filter(|r| !present(r)).count()
}

/// Fills every gap and returns finished rows (label unset) plus the
/// summary of what was filled.
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn impute(rows: Vec<EnrichedRow>) -> (Vec<FeatureRow>, ImputationSummary) {
    let mut summary = ImputationSummary {
        rows: rows.len(),
        columns: Vec::new(),
    };
    log::info!("Imputing {} feature rows", rows.len());

    let zero_columns: [(&[&str], usize); 5] = [
        (
            &["hist_crashes", "hist_severity"],
            count_missing(&rows, |r| r.temporal.history.is_some()),
        ),
        (
            &[
                "hist_injuries_total",
                "hist_injuries_fatal",
                "hist_injuries_incapacitating",
                "hist_injuries_nonincap",
            ],
            count_missing(&rows, |r| r.temporal.history_injuries.is_some()),
        ),
        (
            &["recent90_crashes", "recent90_severity"],
            count_missing(&rows, |r| r.temporal.recent.is_some()),
        ),
        (
            &[
                "recent90_injuries_total",
                "recent90_injuries_fatal",
                "recent90_injuries_incapacitating",
                "recent90_injuries_nonincap",
            ],
            count_missing(&rows, |r| r.temporal.recent_injuries.is_some()),
        ),
        (
            &["future_crashes", "future_severity"],
            count_missing(&rows, |r| r.temporal.future.is_some()),
        ),
    ];
    for (columns, missing) in zero_columns {
        for column in columns {
            record(
                &mut summary,
                column,
                ImputationStrategy::Zero,
                missing,
                "0".to_string(),
            );
        }
    }

    let centrality: [(&str, Accessor); 3] = [
        ("centrality_degree", |a| a.centrality_degree),
        ("centrality_closeness", |a| a.centrality_closeness),
        ("centrality_betweenness", |a| a.centrality_betweenness),
    ];
    let centrality_fills = centrality.map(|(column, get)| {
        let fill = NumericFill::compute(column, &rows, get);
        record(
            &mut summary,
            column,
            ImputationStrategy::Median,
            fill.missing,
            fill.value.to_string(),
        );
        fill.value
    });

    let demographics: [(&str, Accessor); 5] = [
        ("acs_pop", |a| a.acs_pop),
        ("acs_median_income", |a| a.acs_median_income),
        ("acs_households_with_vehicle", |a| a.acs_households_with_vehicle),
        ("acs_poverty_universe", |a| a.acs_poverty_universe),
        ("acs_vehicle_access_rate", |a| a.acs_vehicle_access_rate),
    ];
    let demographic_fills = demographics.map(|(column, get)| {
        let fill = NumericFill::compute(column, &rows, get);
        record(
            &mut summary,
            column,
            ImputationStrategy::MedianWithIndicator,
            fill.missing,
            fill.value.to_string(),
        );
        fill.value
    });

    for (column, missing) in [
        ("GEOID", count_missing(&rows, |r| r.attributes.geoid.is_some())),
        (
            "community_id",
            count_missing(&rows, |r| r.attributes.community_id.is_some()),
        ),
        (
            "community_name",
            count_missing(&rows, |r| r.attributes.community_name.is_some()),
        ),
    ] {
        record(
            &mut summary,
            column,
            ImputationStrategy::Unknown,
            missing,
            UNKNOWN.to_string(),
        );
    }

    let [degree, closeness, betweenness] = centrality_fills;
    let [pop, income, vehicles, poverty, access] = demographic_fills;
    let numeric =
        |value: Option<f64>, fill: f64| (value.unwrap_or(fill), u8::from(value.is_none()));
    let category = |value: Option<String>| value.unwrap_or_else(|| UNKNOWN.to_string());

    let out = rows
        .into_iter()
        .map(|row| {
            let t = row.temporal;
            let a = row.attributes;
            let hist = t.history.unwrap_or_default();
            let hist_inj = t.history_injuries.unwrap_or_default();
            let recent = t.recent.unwrap_or_default();
            let recent_inj = t.recent_injuries.unwrap_or_default();
            let future: CrashTotals = t.future.unwrap_or_default();

            let (acs_pop, acs_pop_missing) = numeric(a.acs_pop, pop);
            let (acs_median_income, acs_median_income_missing) =
                numeric(a.acs_median_income, income);
            let (acs_households_with_vehicle, acs_households_with_vehicle_missing) =
                numeric(a.acs_households_with_vehicle, vehicles);
            let (acs_poverty_universe, acs_poverty_universe_missing) =
                numeric(a.acs_poverty_universe, poverty);
            let (acs_vehicle_access_rate, acs_vehicle_access_rate_missing) =
                numeric(a.acs_vehicle_access_rate, access);

            FeatureRow {
                intersection_id: t.intersection_id,
                cutoff_date: t.cutoff_date,
                hist_crashes: hist.crashes,
                hist_severity: hist.severity,
                hist_injuries_total: hist_inj.total,
                hist_injuries_fatal: hist_inj.fatal,
                hist_injuries_incapacitating: hist_inj.incapacitating,
                hist_injuries_nonincap: hist_inj.nonincap,
                recent90_crashes: recent.crashes,
                recent90_severity: recent.severity,
                recent90_injuries_total: recent_inj.total,
                recent90_injuries_fatal: recent_inj.fatal,
                recent90_injuries_incapacitating: recent_inj.incapacitating,
                recent90_injuries_nonincap: recent_inj.nonincap,
                future_crashes: future.crashes,
                future_severity: future.severity,
                centrality_degree: a.centrality_degree.unwrap_or(degree),
                centrality_closeness: a.centrality_closeness.unwrap_or(closeness),
                centrality_betweenness: a.centrality_betweenness.unwrap_or(betweenness),
                geoid: category(a.geoid),
                acs_pop,
                acs_median_income,
                acs_households_with_vehicle,
                acs_poverty_universe,
                acs_vehicle_access_rate,
                acs_pop_missing,
                acs_median_income_missing,
                acs_households_with_vehicle_missing,
                acs_poverty_universe_missing,
                acs_vehicle_access_rate_missing,
                community_id: category(a.community_id),
                community_name: category(a.community_name),
                label_hotspot: 0,
            }
        })
        .collect();

    (out, summary)
}
