#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Census tract demographic types.
//!
//! [`AcsTractRow`] mirrors the American Community Survey API response as
//! written to `acs_il_tracts.csv`; [`TractDemographics`] is the cleaned,
//! GEOID-keyed form joined onto intersections.

use serde::{Deserialize, Serialize};

/// ACS 5-year variables requested per tract, in column order.
pub const ACS_VARIABLES: &[&str] = &[
    "B01003_001E", // total population
    "B19013_001E", // median household income
    "B08201_002E", // households with a vehicle
    "B17021_001E", // poverty status universe
];

/// One tract row of the raw ACS download.
///
/// Values are kept as published; the Census API uses large negative
/// sentinels (e.g. `-666666666`) for suppressed estimates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcsTractRow {
    #[serde(rename = "NAME", default)]
    pub name: Option<String>,
    #[serde(rename = "B01003_001E")]
    pub population: Option<f64>,
    #[serde(rename = "B19013_001E")]
    pub median_income: Option<f64>,
    #[serde(rename = "B08201_002E")]
    pub households_with_vehicle: Option<f64>,
    #[serde(rename = "B17021_001E")]
    pub poverty_universe: Option<f64>,
    pub state: String,
    pub county: String,
    pub tract: String,
}

impl AcsTractRow {
    /// The 11-digit tract GEOID (state + county + tract, zero-padded).
    #[must_use]
    pub fn geoid(&self) -> String {
        tract_geoid(&self.state, &self.county, &self.tract)
    }
}

/// Builds an 11-digit tract GEOID from its components.
///
/// Numeric components are zero-padded to 2, 3, and 6 digits.
#[must_use]
pub fn tract_geoid(state: &str, county: &str, tract: &str) -> String {
    format!(
        "{:0>2}{:0>3}{:0>6}",
        state.trim(),
        county.trim(),
        tract.trim()
    )
}

/// Cleaned demographics for one tract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TractDemographics {
    pub geoid: String,
    pub acs_pop: Option<f64>,
    pub acs_median_income: Option<f64>,
    pub acs_households_with_vehicle: Option<f64>,
    pub acs_poverty_universe: Option<f64>,
    /// Households with a vehicle per resident; `None` when population is
    /// missing or zero.
    pub acs_vehicle_access_rate: Option<f64>,
}

/// Drops negative sentinels and non-finite values.
fn estimate(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v >= 0.0)
}

impl From<&AcsTractRow> for TractDemographics {
    fn from(row: &AcsTractRow) -> Self {
        let acs_pop = estimate(row.population);
        let acs_households_with_vehicle = estimate(row.households_with_vehicle);
        let acs_vehicle_access_rate = match (acs_households_with_vehicle, acs_pop) {
            (Some(vehicles), Some(pop)) if pop > 0.0 => Some(vehicles / pop),
            _ => None,
        };

        Self {
            geoid: row.geoid(),
            acs_pop,
            acs_median_income: estimate(row.median_income),
            acs_households_with_vehicle,
            acs_poverty_universe: estimate(row.poverty_universe),
            acs_vehicle_access_rate,
        }
    }
}
