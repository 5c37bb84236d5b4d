//! Crash and people cleaning.
//!
//! Raw portal rows are deduplicated by id, parsed, filtered to the
//! plausible Chicago box, and projected. Every dropped row is counted
//! under the first reason that applies.

use std::collections::HashSet;

use crash_hotspots_config::CleanConfig;
use crash_hotspots_crash_models::{CrashRecord, InjurySeverity, PersonRecord};
use crash_hotspots_spatial::projection::TransverseMercator;
use serde::{Deserialize, Serialize};

use crate::parsing::{
    normalize_label, parse_count, parse_lat_lng, parse_optional_int, parse_portal_timestamp,
};

/// The crash table columns the pipeline reads. Other columns are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawCrashRow {
    pub crash_record_id: Option<String>,
    pub crash_date: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub most_severe_injury: Option<String>,
    pub injuries_total: Option<String>,
    pub injuries_fatal: Option<String>,
    pub injuries_incapacitating: Option<String>,
}

/// The people table columns the pipeline reads.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawPersonRow {
    pub person_id: Option<String>,
    pub crash_record_id: Option<String>,
    pub person_type: Option<String>,
    pub injury_classification: Option<String>,
    pub age: Option<String>,
    pub sex: Option<String>,
    pub safety_equipment: Option<String>,
}

/// Row counts from crash cleaning, by drop reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashCleanReport {
    pub input_rows: usize,
    pub missing_id: usize,
    pub duplicate_id: usize,
    pub bad_timestamp: usize,
    pub missing_coordinates: usize,
    pub out_of_bounds: usize,
    pub kept: usize,
}

impl CrashCleanReport {
    /// Rows dropped for any reason.
    #[must_use]
    pub const fn dropped(&self) -> usize {
        self.input_rows - self.kept
    }

    fn log(&self) {
        log::info!(
            "Crash cleaning: {} in, {} kept, {} dropped",
            self.input_rows,
            self.kept,
            self.dropped()
        );
        log::info!("  missing id:          {}", self.missing_id);
        log::info!("  duplicate id:        {}", self.duplicate_id);
        log::info!("  bad timestamp:       {}", self.bad_timestamp);
        log::info!("  missing coordinates: {}", self.missing_coordinates);
        log::info!("  out of bounds:       {}", self.out_of_bounds);
    }
}

/// Row counts from people cleaning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeopleCleanReport {
    pub input_rows: usize,
    pub missing_id: usize,
    pub duplicate_id: usize,
    pub kept: usize,
}

/// Cleans raw crash rows, keeping the first occurrence of each id and
/// preserving input order.
#[must_use]
pub fn clean_crashes(
    rows: impl IntoIterator<Item = RawCrashRow>,
    bounds: &CleanConfig,
    projection: &TransverseMercator,
) -> (Vec<CrashRecord>, CrashCleanReport) {
    let mut report = CrashCleanReport::default();
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for row in rows {
        report.input_rows += 1;

        let Some(id) = row
            .crash_record_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        else {
            report.missing_id += 1;
            continue;
        };
        if !seen.insert(id.to_string()) {
            report.duplicate_id += 1;
            continue;
        }
        let Some(occurred_at) = row.crash_date.as_deref().and_then(parse_portal_timestamp) else {
            report.bad_timestamp += 1;
            continue;
        };
        let Some((latitude, longitude)) =
            parse_lat_lng(row.latitude.as_deref(), row.longitude.as_deref())
        else {
            report.missing_coordinates += 1;
            continue;
        };
        if !bounds.contains(latitude, longitude) {
            report.out_of_bounds += 1;
            continue;
        }

        let (x, y) = projection.project(longitude, latitude);
        out.push(CrashRecord {
            crash_record_id: id.to_string(),
            occurred_at,
            latitude,
            longitude,
            x,
            y,
            most_severe_injury: row
                .most_severe_injury
                .as_deref()
                .and_then(InjurySeverity::from_label),
            injuries_total: parse_count(row.injuries_total.as_deref()),
            injuries_fatal: parse_count(row.injuries_fatal.as_deref()),
            injuries_incapacitating: parse_count(row.injuries_incapacitating.as_deref()),
        });
    }

    report.kept = out.len();
    report.log();
    (out, report)
}

/// Cleans raw people rows: dedup by person id, upper-case labels.
///
/// Rows without a crash id are kept; they simply never link.
#[must_use]
pub fn clean_people(
    rows: impl IntoIterator<Item = RawPersonRow>,
) -> (Vec<PersonRecord>, PeopleCleanReport) {
    let mut report = PeopleCleanReport::default();
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for row in rows {
        report.input_rows += 1;

        let Some(id) = row
            .person_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        else {
            report.missing_id += 1;
            continue;
        };
        if !seen.insert(id.to_string()) {
            report.duplicate_id += 1;
            continue;
        }

        out.push(PersonRecord {
            person_id: id.to_string(),
            crash_record_id: row
                .crash_record_id
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string(),
            person_type: normalize_label(row.person_type.as_deref()),
            injury_classification: row
                .injury_classification
                .as_deref()
                .and_then(InjurySeverity::from_label),
            age: parse_optional_int(row.age.as_deref()),
            sex: normalize_label(row.sex.as_deref()),
            safety_equipment: normalize_label(row.safety_equipment.as_deref()),
        });
    }

    report.kept = out.len();
    log::info!(
        "People cleaning: {} in, {} kept ({} missing id, {} duplicate id)",
        report.input_rows,
        report.kept,
        report.missing_id,
        report.duplicate_id
    );
    (out, report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crash(id: &str, date: &str, lat: &str, lng: &str) -> RawCrashRow {
        RawCrashRow {
            crash_record_id: Some(id.to_string()),
            crash_date: Some(date.to_string()),
            latitude: Some(lat.to_string()),
            longitude: Some(lng.to_string()),
            most_severe_injury: Some("INCAPACITATING INJURY".to_string()),
            injuries_total: Some("2".to_string()),
            injuries_fatal: Some("0".to_string()),
            injuries_incapacitating: Some("1".to_string()),
        }
    }

    #[test]
    fn drops_each_bad_row_under_one_reason() {
        let rows = vec![
            crash("a", "2024-01-01T08:00:00.000", "41.8781", "-87.6298"),
            crash("a", "2024-01-02T08:00:00.000", "41.8781", "-87.6298"),
            crash("", "2024-01-01T08:00:00.000", "41.8781", "-87.6298"),
            crash("b", "yesterday", "41.8781", "-87.6298"),
            crash("c", "2024-01-01T08:00:00.000", "", "-87.6298"),
            crash("d", "2024-01-01T08:00:00.000", "40.0", "-87.6298"),
            crash("e", "01/03/2024 05:15:00 PM", "41.9", "-87.7"),
        ];

        let (kept, report) = clean_crashes(
            rows,
            &CleanConfig::default(),
            &TransverseMercator::illinois_east(),
        );

        assert_eq!(
            report,
            CrashCleanReport {
                input_rows: 7,
                missing_id: 1,
                duplicate_id: 1,
                bad_timestamp: 1,
                missing_coordinates: 1,
                out_of_bounds: 1,
                kept: 2,
            }
        );
        assert_eq!(report.dropped(), 5);

        let ids: Vec<&str> = kept.iter().map(|c| c.crash_record_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "e"]);
        assert_eq!(kept[0].occurred_at.to_string(), "2024-01-01 08:00:00");
        assert_eq!(
            kept[0].most_severe_injury,
            Some(InjurySeverity::Incapacitating)
        );
        assert_eq!(kept[0].injuries_total, 2);
    }

    #[test]
    fn projects_to_planar_meters() {
        let rows = vec![crash("a", "2024-01-01T08:00:00", "41.8781", "-87.6298")];
        let (kept, _) = clean_crashes(
            rows,
            &CleanConfig::default(),
            &TransverseMercator::illinois_east(),
        );
        assert!((kept[0].x - 358_398.1).abs() < 1.0);
        assert!((kept[0].y - 578_802.6).abs() < 1.0);
    }

    #[test]
    fn people_dedup_and_upper_case() {
        let person = |id: &str, kind: &str| RawPersonRow {
            person_id: Some(id.to_string()),
            crash_record_id: Some("a".to_string()),
            person_type: Some(kind.to_string()),
            injury_classification: Some("fatal".to_string()),
            age: Some("41".to_string()),
            sex: Some("m".to_string()),
            safety_equipment: None,
        };
        let rows = vec![
            person("O1", "driver"),
            person("O1", "driver"),
            person("P2", "passenger"),
            RawPersonRow::default(),
        ];

        let (kept, report) = clean_people(rows);

        assert_eq!(report.kept, 2);
        assert_eq!(report.duplicate_id, 1);
        assert_eq!(report.missing_id, 1);
        assert_eq!(kept[0].person_type.as_deref(), Some("DRIVER"));
        assert_eq!(kept[0].sex.as_deref(), Some("M"));
        assert_eq!(kept[0].injury_classification, Some(InjurySeverity::Fatal));
        assert_eq!(kept[1].age, Some(41));
    }

    #[test]
    fn unlisted_classification_is_kept_as_other() {
        let rows = vec![
            RawPersonRow {
                person_id: Some("O1".to_string()),
                crash_record_id: Some("a".to_string()),
                injury_classification: Some("unknown".to_string()),
                ..RawPersonRow::default()
            },
            RawPersonRow {
                person_id: Some("O2".to_string()),
                crash_record_id: Some("a".to_string()),
                injury_classification: Some(" ".to_string()),
                ..RawPersonRow::default()
            },
        ];

        let (kept, _) = clean_people(rows);

        assert_eq!(kept[0].injury_classification, Some(InjurySeverity::Other));
        assert_eq!(kept[1].injury_classification, None);
    }
}
