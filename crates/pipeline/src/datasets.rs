//! Input datasets shared by every cache key

use idwkit_algorithms::interpolation::{KdTree, SampleSet};
use idwkit_core::io::read_geojson;
use idwkit_core::vector::{total_bounds, FeatureCollection, Region};
use idwkit_core::{Error, Result, CRS};
use tracing::info;

use crate::config::{DatasetFields, PipelineConfig};

/// Samples indexed for interpolation plus the region polygons.
///
/// Loaded once and read-only afterwards.
#[derive(Debug)]
pub struct Datasets {
    pub samples: SampleSet,
    pub index: KdTree,
    pub values: Vec<f64>,
    pub regions: Vec<Region>,
    /// CRS of the analysis grid
    pub crs: Option<CRS>,
    /// Grid extent: total bounds of the regions
    pub extent: (f64, f64, f64, f64),
}

impl Datasets {
    /// Read both datasets named in `config`.
    pub fn load(config: &PipelineConfig) -> Result<Self> {
        let samples = read_geojson(&config.samples)?;
        let regions = read_geojson(&config.regions)?;
        Self::from_collections(&samples, &regions, &config.fields, config.allow_empty_samples)
    }

    /// Validate fields, extract samples and regions, and build the index.
    ///
    /// Both collections must share a CRS when both declare one.
    pub fn from_collections(
        samples: &FeatureCollection,
        regions: &FeatureCollection,
        fields: &DatasetFields,
        allow_empty: bool,
    ) -> Result<Self> {
        let sample_set = SampleSet::from_features(samples, &fields.sample_value)?;
        if !allow_empty {
            sample_set.require_non_empty()?;
        }
        let regions_vec = Region::from_features(regions, &fields.region_id, &fields.region_attribute)?;

        let crs = match (&regions.crs, &samples.crs) {
            (Some(r), Some(s)) if !r.is_equivalent(s) => {
                return Err(Error::CrsMismatch(r.to_string(), s.to_string()));
            }
            (Some(r), _) => Some(r.clone()),
            (None, s) => s.clone(),
        };

        let extent = total_bounds(&regions_vec)
            .ok_or_else(|| Error::Algorithm("Regions dataset has no polygon coordinates".into()))?;

        let index = KdTree::build(&sample_set.positions());
        let values = sample_set.values();
        info!(
            samples = sample_set.len(),
            regions = regions_vec.len(),
            crs = %crs.as_ref().map(|c| c.to_string()).unwrap_or_else(|| "unknown".into()),
            "datasets loaded"
        );

        Ok(Self {
            samples: sample_set,
            index,
            values,
            regions: regions_vec,
            crs,
            extent,
        })
    }
}
