#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Crash, person, and crash-to-intersection record types.
//!
//! These are the row types of the cleaning and snapping stages. Every
//! stage reads and writes them as CSV, so field names double as column
//! names and timestamps use chrono's ISO 8601 form.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Injury severity category reported for a crash or a person.
///
/// The string forms match the Chicago data portal's
/// `most_severe_injury` / `injury_classification` values.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum InjurySeverity {
    /// A non-empty label outside the five portal categories. Still counts
    /// as a reported classification.
    #[serde(rename = "OTHER")]
    #[strum(serialize = "OTHER")]
    Other,
    /// No one was injured.
    #[serde(rename = "NO INDICATION OF INJURY")]
    #[strum(serialize = "NO INDICATION OF INJURY")]
    NoIndication,
    /// Injury reported but not visible.
    #[serde(rename = "REPORTED, NOT EVIDENT")]
    #[strum(serialize = "REPORTED, NOT EVIDENT")]
    ReportedNotEvident,
    /// Visible injury that does not prevent normal activity.
    #[serde(rename = "NONINCAPACITATING INJURY")]
    #[strum(serialize = "NONINCAPACITATING INJURY")]
    NonIncapacitating,
    /// Injury that prevents normal activity.
    #[serde(rename = "INCAPACITATING INJURY")]
    #[strum(serialize = "INCAPACITATING INJURY")]
    Incapacitating,
    /// At least one fatality.
    #[serde(rename = "FATAL")]
    #[strum(serialize = "FATAL")]
    Fatal,
}

impl InjurySeverity {
    /// Weight used for severity sums, from 1 (no injury) to 5 (fatal).
    #[must_use]
    pub const fn weight(self) -> u32 {
        match self {
            Self::Other | Self::NoIndication => 1,
            Self::ReportedNotEvident => 2,
            Self::NonIncapacitating => 3,
            Self::Incapacitating => 4,
            Self::Fatal => 5,
        }
    }

    /// Parses a portal label, ignoring case and surrounding whitespace.
    ///
    /// Returns `None` for empty labels and [`Self::Other`] for any other
    /// label outside the known categories.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        let trimmed = label.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(trimmed.parse().unwrap_or(Self::Other))
    }
}

/// Severity weight for an optional category. Unknown or missing
/// categories weigh the same as "no indication of injury".
#[must_use]
pub fn severity_weight(severity: Option<InjurySeverity>) -> u32 {
    severity.map_or(1, InjurySeverity::weight)
}

/// A cleaned crash record with projected coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrashRecord {
    /// Portal crash identifier (unique after cleaning).
    pub crash_record_id: String,
    /// When the crash occurred (local time, as published).
    pub occurred_at: NaiveDateTime,
    /// WGS84 latitude.
    pub latitude: f64,
    /// WGS84 longitude.
    pub longitude: f64,
    /// Projected easting in meters.
    pub x: f64,
    /// Projected northing in meters.
    pub y: f64,
    /// Most severe injury among everyone involved.
    pub most_severe_injury: Option<InjurySeverity>,
    /// Total injured people.
    pub injuries_total: u32,
    /// Fatalities.
    pub injuries_fatal: u32,
    /// Incapacitating injuries.
    pub injuries_incapacitating: u32,
}

impl CrashRecord {
    /// Severity weight of this crash.
    #[must_use]
    pub fn severity_weight(&self) -> u32 {
        severity_weight(self.most_severe_injury)
    }
}

/// A cleaned person record from the crash people table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonRecord {
    /// Portal person identifier (unique after cleaning).
    pub person_id: String,
    /// Crash this person was involved in.
    pub crash_record_id: String,
    /// Driver, passenger, pedestrian, ... (upper-cased).
    pub person_type: Option<String>,
    /// Injury category for this person.
    pub injury_classification: Option<InjurySeverity>,
    /// Age in years, when reported.
    pub age: Option<i32>,
    /// Reported sex.
    pub sex: Option<String>,
    /// Reported safety equipment.
    pub safety_equipment: Option<String>,
}

/// Result of snapping one crash to the road network.
///
/// `nearest_node_id` and `distance_m` are always the true nearest node,
/// even when it lies outside the tolerance; `matched` records whether
/// `distance_m <= tolerance` for the run that produced the row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnappedCrash {
    /// Portal crash identifier.
    pub crash_record_id: String,
    /// When the crash occurred.
    pub occurred_at: NaiveDateTime,
    /// Most severe injury among everyone involved.
    pub most_severe_injury: Option<InjurySeverity>,
    /// Total injured people.
    pub injuries_total: u32,
    /// Fatalities.
    pub injuries_fatal: u32,
    /// Incapacitating injuries.
    pub injuries_incapacitating: u32,
    /// Nearest road node, `None` only if the network was empty.
    pub nearest_node_id: Option<i64>,
    /// Distance to the nearest node in meters.
    pub distance_m: Option<f64>,
    /// Whether the crash is within the snap tolerance.
    pub matched: bool,
}

impl SnappedCrash {
    /// The intersection this crash is attributed to, if matched.
    #[must_use]
    pub const fn intersection_id(&self) -> Option<i64> {
        if self.matched {
            self.nearest_node_id
        } else {
            None
        }
    }

    /// Severity weight of this crash.
    #[must_use]
    pub fn severity_weight(&self) -> u32 {
        severity_weight(self.most_severe_injury)
    }
}

/// A person linked to an intersection through their crash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedPerson {
    /// Portal person identifier.
    pub person_id: String,
    /// Crash this person was involved in.
    pub crash_record_id: String,
    /// Injury category for this person.
    pub injury_classification: Option<InjurySeverity>,
    /// Crash timestamp, if the crash survived cleaning.
    pub occurred_at: Option<NaiveDateTime>,
    /// Intersection of the crash, if it was matched.
    pub intersection_id: Option<i64>,
}

/// Record of one snapping run, written next to the crash-to-node mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapRun {
    /// Match tolerance in meters.
    pub tolerance_m: f64,
    /// Crashes offered to the snapper.
    pub crash_count: usize,
    /// Crashes within tolerance.
    pub matched_count: usize,
    /// `matched_count / crash_count`, 0 when there were no crashes.
    pub match_rate: f64,
    /// Mean distance of matched crashes.
    pub mean_distance_m: Option<f64>,
    /// Median distance of matched crashes.
    pub median_distance_m: Option<f64>,
    /// 95th percentile distance of matched crashes.
    pub p95_distance_m: Option<f64>,
    /// Road nodes in the index.
    pub node_count: usize,
}
