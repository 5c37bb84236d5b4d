#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Spatial primitives for the crash hotspot pipeline.
//!
//! Three pieces live here: the planar projection every distance is
//! measured in ([`projection`]), the nearest-intersection snapper
//! ([`snap`]), and an R-tree of boundary polygons for point-in-polygon
//! attribution of intersections to census tracts and community areas
//! ([`BoundaryIndex`]).

pub mod projection;
pub mod snap;

use std::path::Path;

use geo::{Intersects, MultiPolygon};
use geojson::GeoJson;
use rstar::{AABB, RTree, RTreeObject};

/// Errors from loading boundary layers.
#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    /// The boundary file could not be read.
    #[error("I/O error reading {path}: {source}")]
    Io {
        /// File that failed to load.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid `GeoJSON`.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// The `GeoJSON` is valid but not a usable boundary layer.
    #[error("Conversion error: {message}")]
    Conversion {
        /// What was wrong with the layer.
        message: String,
    },
}

/// Identifier and display name of a boundary polygon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundary {
    /// Stable id (tract GEOID, community-area number).
    pub id: String,
    /// Display name, when the layer carries one.
    pub name: Option<String>,
}

/// A boundary polygon stored in the R-tree with its metadata.
struct BoundaryEntry {
    boundary: Boundary,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl RTreeObject for BoundaryEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// R-tree of boundary polygons in WGS84 for point-in-polygon lookups.
pub struct BoundaryIndex {
    entries: RTree<BoundaryEntry>,
}

impl BoundaryIndex {
    /// Loads a `GeoJSON` `FeatureCollection` file.
    ///
    /// `id_property` names the feature property used as the boundary id;
    /// `name_property`, if given, supplies the display name.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError`] if the file cannot be read or is not a
    /// feature collection.
    pub fn load(
        path: &Path,
        id_property: &str,
        name_property: Option<&str>,
    ) -> Result<Self, SpatialError> {
        let text = std::fs::read_to_string(path).map_err(|source| SpatialError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let index = Self::from_geojson_str(&text, id_property, name_property)?;
        log::info!(
            "Loaded {} boundaries from {}",
            index.len(),
            path.display()
        );
        Ok(index)
    }

    /// Builds the index from `GeoJSON` text.
    ///
    /// Features without a usable polygon geometry or without the id
    /// property are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError`] if the text is not a `FeatureCollection`.
    pub fn from_geojson_str(
        text: &str,
        id_property: &str,
        name_property: Option<&str>,
    ) -> Result<Self, SpatialError> {
        let GeoJson::FeatureCollection(collection) = text.parse::<GeoJson>()? else {
            return Err(SpatialError::Conversion {
                message: "expected a GeoJSON FeatureCollection".to_string(),
            });
        };

        let mut entries = Vec::with_capacity(collection.features.len());
        let mut skipped = 0usize;

        for feature in collection.features {
            let Some(id) = feature.property(id_property).and_then(property_string) else {
                skipped += 1;
                continue;
            };
            let name = name_property
                .and_then(|key| feature.property(key))
                .and_then(property_string);

            let Some(polygon) = feature.geometry.and_then(geometry_to_multipolygon) else {
                log::warn!("Boundary {id} has no polygon geometry, skipping");
                skipped += 1;
                continue;
            };

            entries.push(BoundaryEntry {
                envelope: compute_envelope(&polygon),
                boundary: Boundary { id, name },
                polygon,
            });
        }

        if skipped > 0 {
            log::warn!("Skipped {skipped} boundary features without id or geometry");
        }

        Ok(Self {
            entries: RTree::bulk_load(entries),
        })
    }

    /// Number of indexed boundaries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.size()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.size() == 0
    }

    /// Looks up the boundary enclosing a point.
    ///
    /// Points on a shared edge belong to the boundary with the lowest id.
    #[must_use]
    pub fn lookup(&self, lon: f64, lat: f64) -> Option<&Boundary> {
        let point = geo::Point::new(lon, lat);
        let query_env = AABB::from_point([lon, lat]);

        self.entries
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| entry.polygon.intersects(&point))
            .map(|entry| &entry.boundary)
            .min_by(|a, b| a.id.cmp(&b.id))
    }
}

/// Renders a string or numeric property as a trimmed string.
fn property_string(value: &serde_json::Value) -> Option<String> {
    let text = match value {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Converts a `GeoJSON` geometry into a [`MultiPolygon`].
/// Handles both `Polygon` and `MultiPolygon` geometry types.
fn geometry_to_multipolygon(geometry: geojson::Geometry) -> Option<MultiPolygon<f64>> {
    let geo_geom: geo::Geometry<f64> = geometry.try_into().ok()?;
    match geo_geom {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    use geo::BoundingRect;

    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}
