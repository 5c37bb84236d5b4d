#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Pipeline configuration for the crash hotspot toolchain.
//!
//! Every threshold that changes pipeline output (snap tolerance, window
//! lengths, hotspot percentile, validation bands, model and spatial
//! statistics parameters) lives in [`PipelineConfig`]. The config is read
//! from a TOML file once at invocation; every section falls back to its
//! defaults when omitted, so an empty file is a valid configuration.

pub mod paths;
pub mod progress;
pub mod stats;
pub mod table;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Environment variable that points at an alternate config file.
pub const CONFIG_ENV_VAR: &str = "CRASH_HOTSPOTS_CONFIG";

/// Config file looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "hotspots.toml";

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("I/O error reading {path}: {source}")]
    Io {
        /// Path that failed to load.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`PipelineConfig`].
    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be rendered back to TOML.
    #[error("Config render error: {0}")]
    Render(#[from] toml::ser::Error),

    /// A value is outside its allowed range.
    #[error("Invalid config: {message}")]
    Invalid {
        /// Description of the offending value.
        message: String,
    },
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Where artifacts are read from and written to.
    pub paths: PathsConfig,
    /// Remote data locations and download limits.
    pub download: DownloadConfig,
    /// Crash cleaning rules.
    pub clean: CleanConfig,
    /// Road network extraction and centrality.
    pub network: NetworkConfig,
    /// Crash-to-intersection snapping.
    pub snap: SnapConfig,
    /// Temporal feature windows.
    pub windows: WindowConfig,
    /// Hotspot label derivation.
    pub label: LabelConfig,
    /// Validation bands.
    pub validation: ValidationConfig,
    /// Classifier training.
    pub model: ModelConfig,
    /// Spatial autocorrelation.
    pub spatial: SpatialConfig,
}

/// Artifact locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root of the `raw/`, `processed/`, and `results/` directories.
    pub data_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

/// Remote data sources and download limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Socrata CSV endpoint for crash records.
    pub crashes_url: String,
    /// Socrata CSV endpoint for people records.
    pub people_url: String,
    /// Socrata `GeoJSON` export of community-area boundaries.
    pub community_areas_url: String,
    /// Tried when the primary community-area export fails. Empty
    /// disables the fallback.
    pub community_areas_fallback_url: String,
    /// OSM PBF extract covering Chicago.
    pub osm_pbf_url: String,
    /// Maximum number of crash records to fetch.
    pub crash_limit: u64,
    /// Page size for paginated Socrata requests.
    pub page_size: u64,
    /// ACS 5-year vintage.
    pub acs_year: u16,
    /// State FIPS code for ACS and tract downloads.
    pub state_fips: String,
    /// County FIPS code for tract downloads.
    pub county_fips: String,
    /// Environment variable holding the Census API key.
    pub census_api_key_env: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            crashes_url: "https://data.cityofchicago.org/resource/85ca-t3if.csv".to_string(),
            people_url: "https://data.cityofchicago.org/resource/u6pd-qa9d.csv".to_string(),
            community_areas_url:
                "https://data.cityofchicago.org/api/geospatial/cauq-8yn6?method=export&format=GeoJSON"
                    .to_string(),
            community_areas_fallback_url:
                "https://data.cityofchicago.org/resource/igwz-8jzy.geojson".to_string(),
            osm_pbf_url: "https://download.bbbike.org/osm/bbbike/Chicago/Chicago.osm.pbf"
                .to_string(),
            crash_limit: 2_000_000,
            page_size: 500_000,
            acs_year: 2022,
            state_fips: "17".to_string(),
            county_fips: "031".to_string(),
            census_api_key_env: "CENSUS_API_KEY".to_string(),
        }
    }
}

/// Crash cleaning rules: the plausible coordinate box for Chicago.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanConfig {
    /// Southern latitude bound (inclusive).
    pub lat_min: f64,
    /// Northern latitude bound (inclusive).
    pub lat_max: f64,
    /// Western longitude bound (inclusive).
    pub lon_min: f64,
    /// Eastern longitude bound (inclusive).
    pub lon_max: f64,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            lat_min: 41.4,
            lat_max: 42.3,
            lon_min: -88.5,
            lon_max: -87.3,
        }
    }
}

impl CleanConfig {
    /// Whether a coordinate falls inside the plausible box.
    #[must_use]
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.lat_min..=self.lat_max).contains(&lat) && (self.lon_min..=self.lon_max).contains(&lon)
    }
}

/// Road network extraction and centrality parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Number of source pivots for approximate betweenness.
    pub betweenness_samples: usize,
    /// Seed for pivot sampling.
    pub seed: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            betweenness_samples: 500,
            seed: 42,
        }
    }
}

/// Snapping parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapConfig {
    /// Maximum crash-to-node distance in meters for a match.
    pub tolerance_m: f64,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self { tolerance_m: 70.0 }
    }
}

/// Temporal window lengths in days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Trailing history window.
    pub history_days: i64,
    /// Trailing recent window.
    pub recent_days: i64,
    /// Forward label window; also the spacing between cutoffs.
    pub predict_days: i64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            history_days: 365,
            recent_days: 90,
            predict_days: 180,
        }
    }
}

/// Hotspot label parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    /// Fraction of intersections labeled hotspots per cutoff (top decile).
    pub hotspot_top_pct: f64,
    /// Lower bound on the future-count threshold.
    pub min_threshold: f64,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            hotspot_top_pct: 0.10,
            min_threshold: 1.0,
        }
    }
}

/// Validation acceptance bands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Match rate at or above which the snap check passes.
    pub match_rate_pass: f64,
    /// Match rate at or above which the snap check only warns.
    pub match_rate_warn: f64,
    /// Lowest acceptable label prevalence per cutoff.
    pub prevalence_min: f64,
    /// Highest acceptable label prevalence per cutoff.
    pub prevalence_max: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            match_rate_pass: 0.85,
            match_rate_warn: 0.75,
            prevalence_min: 0.08,
            prevalence_max: 0.15,
        }
    }
}

/// Classifier training parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Fraction of cutoff periods used for training.
    pub train_fraction: f64,
    /// Fraction of cutoff periods used for validation.
    pub validation_fraction: f64,
    /// Gradient descent step size.
    pub learning_rate: f64,
    /// Full-batch gradient descent iterations.
    pub epochs: usize,
    /// L2 penalty on non-intercept weights.
    pub l2: f64,
    /// Fraction of rows used for precision-at-k.
    pub top_k_fraction: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            train_fraction: 0.70,
            validation_fraction: 0.15,
            learning_rate: 0.1,
            epochs: 500,
            l2: 1e-3,
            top_k_fraction: 0.10,
        }
    }
}

/// Spatial autocorrelation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialConfig {
    /// Neighbors per intersection in the weights matrix.
    pub k_neighbors: usize,
    /// Conditional permutations for pseudo p-values.
    pub permutations: usize,
    /// Permutation seed.
    pub seed: u64,
    /// Pseudo p-value below which a LISA cluster is significant.
    pub significance: f64,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            k_neighbors: 8,
            permutations: 999,
            seed: 42,
            significance: 0.05,
        }
    }
}

impl PipelineConfig {
    /// Loads configuration.
    ///
    /// Resolution order: the explicit `path`, then the file named by
    /// [`CONFIG_ENV_VAR`], then [`DEFAULT_CONFIG_FILE`] if it exists, then
    /// built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a named file cannot be read or parsed, or
    /// if any value fails [`PipelineConfig::validate`].
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from))
            .or_else(|| {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                default.exists().then_some(default)
            });

        let config = match resolved {
            Some(path) => {
                log::info!("Loading configuration from {}", path.display());
                let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                Self::from_toml_str(&text)?
            }
            None => {
                log::info!("No config file found, using defaults");
                Self::default()
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the text is not valid TOML for
    /// this schema.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Renders the effective configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Render`] if serialization fails.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Checks that every threshold is inside its meaningful range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(message: String) -> Result<(), ConfigError> {
            Err(ConfigError::Invalid { message })
        }

        if !(self.snap.tolerance_m.is_finite() && self.snap.tolerance_m > 0.0) {
            return invalid(format!(
                "snap.tolerance_m must be positive, got {}",
                self.snap.tolerance_m
            ));
        }
        let w = &self.windows;
        if w.history_days <= 0 || w.recent_days <= 0 || w.predict_days <= 0 {
            return invalid("window lengths must be positive".to_string());
        }
        if w.recent_days > w.history_days {
            return invalid(format!(
                "windows.recent_days ({}) exceeds windows.history_days ({})",
                w.recent_days, w.history_days
            ));
        }
        if !(self.label.hotspot_top_pct > 0.0 && self.label.hotspot_top_pct < 1.0) {
            return invalid(format!(
                "label.hotspot_top_pct must be in (0, 1), got {}",
                self.label.hotspot_top_pct
            ));
        }
        let v = &self.validation;
        if v.match_rate_warn > v.match_rate_pass {
            return invalid("validation.match_rate_warn exceeds match_rate_pass".to_string());
        }
        if v.prevalence_min > v.prevalence_max {
            return invalid("validation.prevalence_min exceeds prevalence_max".to_string());
        }
        let m = &self.model;
        if m.train_fraction <= 0.0
            || m.validation_fraction < 0.0
            || m.train_fraction + m.validation_fraction >= 1.0
        {
            return invalid(format!(
                "model split fractions must leave a test share, got train={} validation={}",
                m.train_fraction, m.validation_fraction
            ));
        }
        if self.spatial.k_neighbors == 0 {
            return invalid("spatial.k_neighbors must be at least 1".to_string());
        }
        if self.network.betweenness_samples == 0 {
            return invalid("network.betweenness_samples must be at least 1".to_string());
        }
        Ok(())
    }
}
