//! Pipeline configuration

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Names of the attribute fields the datasets must carry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetFields {
    /// Measured value on each sample point
    pub sample_value: String,
    /// Stable identifier of each region
    pub region_id: String,
    /// External attribute carried through to the region table
    pub region_attribute: String,
}

impl Default for DatasetFields {
    fn default() -> Self {
        Self {
            sample_value: "nitr_ran".into(),
            region_id: "GEOID10".into(),
            region_attribute: "canrate".into(),
        }
    }
}

/// Everything the orchestrator needs besides per-request parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root of the artifact cache. Keys name only k, cell and knn, so every
    /// samples/regions pair needs its own directory.
    pub cache_dir: PathBuf,
    /// Point samples (GeoJSON)
    pub samples: PathBuf,
    /// Region polygons (GeoJSON)
    pub regions: PathBuf,
    pub fields: DatasetFields,
    /// Grid rows interpolated and written per block
    pub block_rows: usize,
    /// Longest preview side when a caller does not choose one
    pub max_dim: usize,
    /// Preview value range, clamped
    pub preview_min: f64,
    pub preview_max: f64,
    /// Produce an all-nodata raster instead of failing when no sample survives ingestion
    pub allow_empty_samples: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("cache"),
            samples: PathBuf::from("data/well_nitrate.geojson"),
            regions: PathBuf::from("data/cancer_tracts.geojson"),
            fields: DatasetFields::default(),
            block_rows: 128,
            max_dim: 1400,
            preview_min: 0.0,
            preview_max: 16.0,
            allow_empty_samples: false,
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file; absent keys keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PipelineError::MissingInput(idwkit_core::Error::MissingInput(
                path.to_path_buf(),
            )));
        }
        let text = fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&text).map_err(idwkit_core::Error::from)?;
        Ok(config)
    }

    /// Write as pretty JSON
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self).map_err(idwkit_core::Error::from)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idwkit.json");
        fs::write(&path, r#"{"cache_dir": "/tmp/idw-cache", "fields": {"region_id": "tract"}}"#).unwrap();

        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/idw-cache"));
        assert_eq!(config.fields.region_id, "tract");
        assert_eq!(config.fields.sample_value, "nitr_ran");
        assert_eq!(config.block_rows, 128);
        assert_eq!(config.max_dim, 1400);
    }

    #[test]
    fn test_round_trip() {
        let config = PipelineConfig::default();
        let text = config.to_json_string().unwrap();
        let back: PipelineConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_missing_file() {
        let err = PipelineConfig::from_json_file("/nonexistent/idwkit.json").unwrap_err();
        assert!(matches!(err, PipelineError::MissingInput(_)));
    }
}
