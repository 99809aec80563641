//! Shared fixture: four quadrant regions and five wells on a 1 km square

#![allow(dead_code)]

use std::fs;
use std::path::Path;

use idwkit_pipeline::{InterpolationParams, PipelineConfig};
use tempfile::TempDir;

pub const SAMPLES: &str = r#"{
  "type": "FeatureCollection",
  "crs": {"type": "name", "properties": {"name": "EPSG:3071"}},
  "features": [
    {"type": "Feature", "properties": {"nitr_ran": 2.0}, "geometry": {"type": "Point", "coordinates": [100.0, 100.0]}},
    {"type": "Feature", "properties": {"nitr_ran": 8.0}, "geometry": {"type": "Point", "coordinates": [900.0, 100.0]}},
    {"type": "Feature", "properties": {"nitr_ran": 4.0}, "geometry": {"type": "Point", "coordinates": [100.0, 900.0]}},
    {"type": "Feature", "properties": {"nitr_ran": 12.0}, "geometry": {"type": "Point", "coordinates": [900.0, 900.0]}},
    {"type": "Feature", "properties": {"nitr_ran": -3.0}, "geometry": {"type": "Point", "coordinates": [500.0, 500.0]}}
  ]
}"#;

pub const REGIONS: &str = r#"{
  "type": "FeatureCollection",
  "crs": {"type": "name", "properties": {"name": "EPSG:3071"}},
  "features": [
    {"type": "Feature", "properties": {"GEOID10": "55001", "canrate": 0.10},
     "geometry": {"type": "Polygon", "coordinates": [[[0, 0], [500, 0], [500, 500], [0, 500], [0, 0]]]}},
    {"type": "Feature", "properties": {"GEOID10": "55003", "canrate": 0.30},
     "geometry": {"type": "Polygon", "coordinates": [[[500, 0], [1000, 0], [1000, 500], [500, 500], [500, 0]]]}},
    {"type": "Feature", "properties": {"GEOID10": "55005", "canrate": 0.20},
     "geometry": {"type": "Polygon", "coordinates": [[[0, 500], [500, 500], [500, 1000], [0, 1000], [0, 500]]]}},
    {"type": "Feature", "properties": {"GEOID10": "55007", "canrate": 0.50},
     "geometry": {"type": "Polygon", "coordinates": [[[500, 500], [1000, 500], [1000, 1000], [500, 1000], [500, 500]]]}},
    {"type": "Feature", "properties": {"GEOID10": "55009", "canrate": 0.40},
     "geometry": {"type": "Polygon", "coordinates": [[[200, 200], [300, 200], [300, 200], [200, 200]]]}}
  ]
}"#;

/// Region with zero area; it never receives a cell
pub const SLIVER: &str = "55009";

/// Writes the datasets into a fresh directory and points a config at them.
pub fn fixture() -> (TempDir, PipelineConfig) {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    fs::write(&config.samples, SAMPLES).unwrap();
    fs::write(&config.regions, REGIONS).unwrap();
    (dir, config)
}

pub fn config_in(dir: &Path) -> PipelineConfig {
    PipelineConfig {
        cache_dir: dir.join("cache"),
        samples: dir.join("wells.geojson"),
        regions: dir.join("tracts.geojson"),
        block_rows: 3,
        max_dim: 8,
        ..PipelineConfig::default()
    }
}

/// 10 x 10 grid, key `k2p0_cs100m_knn4`
pub fn params() -> InterpolationParams {
    InterpolationParams::new(2.0, 100.0, 4)
}
