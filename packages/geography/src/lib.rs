#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Census tract boundaries and demographics.
//!
//! Downloads Cook County tract polygons from the Census Bureau `TIGERweb`
//! REST API and tract-level ACS 5-year estimates from the Census data API,
//! then serves GEOID-keyed demographics for intersection enrichment.

pub mod demographics;
pub mod ingest;

use thiserror::Error;

/// Errors that can occur during geography operations.
#[derive(Debug, Error)]
pub enum GeoError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading or writing a local artifact failed.
    #[error(transparent)]
    Table(#[from] crash_hotspots_config::table::TableError),

    /// Loading the tract polygons failed.
    #[error(transparent)]
    Spatial(#[from] crash_hotspots_spatial::SpatialError),

    /// Writing a downloaded file failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Data conversion error.
    #[error("Conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}
