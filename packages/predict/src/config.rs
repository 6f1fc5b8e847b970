//! Pipeline configuration.
//!
//! Defaults live in `config/default.toml`, embedded at compile time. A
//! user file only needs the keys it wants to change.

use std::path::Path;

use pricepaid_features::FeatureConfig;
use pricepaid_regression::RegressionConfig;
use serde::{Deserialize, Serialize};

use crate::PredictError;

/// The embedded default configuration.
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../config/default.toml");

const fn default_bbox_length_km() -> f64 {
    15.0
}

const fn default_date_window_days() -> u64 {
    300
}

const fn default_min_r_squared() -> f64 {
    0.5
}

/// Settings for [`crate::predict_price`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictConfig {
    /// Side of the square window around the property, in kilometres.
    #[serde(default = "default_bbox_length_km")]
    pub bbox_length_km: f64,
    /// Days either side of the valuation date.
    #[serde(default = "default_date_window_days")]
    pub date_window_days: u64,
    /// Held-out R² below which the estimate carries a warning.
    #[serde(default = "default_min_r_squared")]
    pub min_r_squared: f64,
    /// Emit correlation, distance and category charts for the window.
    #[serde(default)]
    pub render_diagnostics: bool,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub regression: RegressionConfig,
}

impl Default for PredictConfig {
    fn default() -> Self {
        Self {
            bbox_length_km: default_bbox_length_km(),
            date_window_days: default_date_window_days(),
            min_r_squared: default_min_r_squared(),
            render_diagnostics: false,
            features: FeatureConfig::default(),
            regression: RegressionConfig::default(),
        }
    }
}

impl PredictConfig {
    /// Parses a TOML document; missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`PredictError::Config`] if the document is malformed.
    pub fn from_toml_str(source: &str) -> Result<Self, PredictError> {
        toml::de::from_str(source).map_err(|e| PredictError::Config {
            message: e.to_string(),
        })
    }

    /// Loads a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`PredictError::Io`] if the file cannot be read or
    /// [`PredictError::Config`] if it is malformed.
    pub fn load(path: &Path) -> Result<Self, PredictError> {
        log::info!("Loading config from {}", path.display());
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// The embedded `config/default.toml`.
    ///
    /// # Panics
    ///
    /// Panics if the embedded TOML is malformed, which the tests rule out.
    #[must_use]
    pub fn embedded() -> Self {
        Self::from_toml_str(DEFAULT_CONFIG_TOML)
            .unwrap_or_else(|e| panic!("Failed to parse embedded default config: {e}"))
    }
}
