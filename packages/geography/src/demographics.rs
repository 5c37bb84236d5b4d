//! Point-to-tract demographics lookup.

use std::collections::BTreeMap;
use std::path::Path;

use crash_hotspots_config::table;
use crash_hotspots_geography_models::{AcsTractRow, TractDemographics};
use crash_hotspots_spatial::BoundaryIndex;

use crate::GeoError;

/// Property holding the tract GEOID in the `TIGERweb` layer.
pub const TRACT_ID_PROPERTY: &str = "GEOID";

/// Loads the raw ACS CSV into GEOID-keyed demographics.
///
/// A missing file yields an empty map (the ACS download is optional).
///
/// # Errors
///
/// Returns [`GeoError`] if the file exists but cannot be parsed.
pub fn load_demographics(path: &Path) -> Result<BTreeMap<String, TractDemographics>, GeoError> {
    if !path.exists() {
        log::warn!(
            "ACS file {} not found, demographics will be imputed",
            path.display()
        );
        return Ok(BTreeMap::new());
    }

    let rows: Vec<AcsTractRow> = table::read_csv(path)?;
    let map: BTreeMap<String, TractDemographics> = rows
        .iter()
        .map(TractDemographics::from)
        .map(|d| (d.geoid.clone(), d))
        .collect();

    log::info!("Loaded ACS demographics for {} tracts", map.len());
    Ok(map)
}

/// Tract polygons joined with their demographics.
pub struct TractLookup {
    tracts: BoundaryIndex,
    demographics: BTreeMap<String, TractDemographics>,
}

impl TractLookup {
    /// Builds a lookup from an already loaded tract index and ACS table.
    #[must_use]
    pub const fn new(
        tracts: BoundaryIndex,
        demographics: BTreeMap<String, TractDemographics>,
    ) -> Self {
        Self {
            tracts,
            demographics,
        }
    }

    /// Loads tract polygons and ACS estimates from disk.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError`] if the tract layer cannot be loaded or the
    /// ACS file is malformed.
    pub fn load(tracts_geojson: &Path, acs_csv: &Path) -> Result<Self, GeoError> {
        let tracts = BoundaryIndex::load(tracts_geojson, TRACT_ID_PROPERTY, None)?;
        let demographics = load_demographics(acs_csv)?;
        Ok(Self::new(tracts, demographics))
    }

    /// GEOID of the tract enclosing a point.
    #[must_use]
    pub fn tract_at(&self, lon: f64, lat: f64) -> Option<&str> {
        self.tracts.lookup(lon, lat).map(|b| b.id.as_str())
    }

    /// Demographics for a GEOID, if the ACS table has the tract.
    #[must_use]
    pub fn demographics(&self, geoid: &str) -> Option<&TractDemographics> {
        self.demographics.get(geoid)
    }
}
