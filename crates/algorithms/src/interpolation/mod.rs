//! Spatial interpolation
//!
//! - `KdTree`: 2D k-d tree answering bulk k-nearest-neighbor queries
//! - IDW: inverse distance weighting over the k nearest samples, computed in
//!   row blocks so memory stays bounded for any grid size

mod idw;
pub mod kdtree;

pub use idw::{idw, idw_block, idw_blocks, Idw, IdwBlocks, IdwParams, IdwSummary, RowBlock, NODATA};
pub use kdtree::{KdTree, KnnResult};

use geo::Geometry;
use idwkit_core::vector::{AttributeValue, FeatureCollection};
use idwkit_core::{Error, Result};
use tracing::{info, warn};

/// A sample point with x, y coordinates and a value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplePoint {
    pub x: f64,
    pub y: f64,
    pub value: f64,
}

impl SamplePoint {
    pub fn new(x: f64, y: f64, value: f64) -> Self {
        Self { x, y, value }
    }

    /// Squared Euclidean distance to another point
    #[inline]
    pub fn dist_sq(&self, other_x: f64, other_y: f64) -> f64 {
        let dx = self.x - other_x;
        let dy = self.y - other_y;
        dx * dx + dy * dy
    }
}

/// Samples extracted from a point dataset, plus what ingestion did to them
#[derive(Debug, Clone, Default)]
pub struct SampleSet {
    pub points: Vec<SamplePoint>,
    /// Negative values raised to 0
    pub clamped: usize,
    /// Features skipped for missing/non-finite values or non-point geometry
    pub dropped: usize,
}

impl SampleSet {
    /// Extract point samples carrying `value_field`.
    ///
    /// The field must exist in the collection. Negative values are clamped to
    /// 0; features whose value or position is unusable are dropped. MultiPoint
    /// features contribute one sample per member.
    pub fn from_features(fc: &FeatureCollection, value_field: &str) -> Result<Self> {
        fc.require_fields(&[value_field], "SAMPLES")?;

        let mut set = SampleSet::default();
        for feature in fc.iter() {
            let value = feature.get_property(value_field).and_then(AttributeValue::as_f64);
            let positions: Vec<(f64, f64)> = match &feature.geometry {
                Some(Geometry::Point(p)) => vec![(p.x(), p.y())],
                Some(Geometry::MultiPoint(mp)) => mp.iter().map(|p| (p.x(), p.y())).collect(),
                _ => Vec::new(),
            };
            match value {
                Some(v) if v.is_finite() && !positions.is_empty() => {
                    if v < 0.0 {
                        set.clamped += positions.len();
                    }
                    for (x, y) in positions {
                        if x.is_finite() && y.is_finite() {
                            set.points.push(SamplePoint::new(x, y, v.max(0.0)));
                        } else {
                            set.dropped += 1;
                        }
                    }
                }
                _ => set.dropped += positions.len().max(1),
            }
        }

        info!(
            "Clamped sample values < 0 to 0: {} / {} samples",
            set.clamped,
            set.points.len()
        );
        if set.dropped > 0 {
            warn!("Dropped {} unusable sample features", set.dropped);
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Positions in sample order
    pub fn positions(&self) -> Vec<[f64; 2]> {
        self.points.iter().map(|p| [p.x, p.y]).collect()
    }

    /// Values in sample order
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    /// Fail unless at least one sample survived ingestion
    pub fn require_non_empty(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::Algorithm("No usable sample points".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{MultiPoint, Point, Polygon, LineString};
    use idwkit_core::vector::Feature;

    fn feature(g: Geometry<f64>, v: AttributeValue) -> Feature {
        Feature::new(g).with_property("nitr_ran", v)
    }

    #[test]
    fn test_samples_clamp_and_drop() {
        let mut fc = FeatureCollection::new();
        fc.push(feature(Point::new(0.0, 0.0).into(), AttributeValue::Float(2.5)));
        fc.push(feature(Point::new(1.0, 0.0).into(), AttributeValue::Float(-1.0)));
        fc.push(feature(Point::new(2.0, 0.0).into(), AttributeValue::Null));
        fc.push(feature(
            MultiPoint::from(vec![Point::new(3.0, 0.0), Point::new(4.0, 0.0)]).into(),
            AttributeValue::Int(7),
        ));
        fc.push(feature(
            Polygon::new(LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)]), vec![]).into(),
            AttributeValue::Float(1.0),
        ));

        let set = SampleSet::from_features(&fc, "nitr_ran").unwrap();
        assert_eq!(set.len(), 4);
        assert_eq!(set.clamped, 1);
        assert_eq!(set.dropped, 2);
        assert_eq!(set.values(), vec![2.5, 0.0, 7.0, 7.0]);
        assert_eq!(set.positions()[3], [4.0, 0.0]);
    }

    #[test]
    fn test_samples_require_field() {
        let mut fc = FeatureCollection::new();
        fc.push(Feature::new(Point::new(0.0, 0.0).into()).with_property("other", AttributeValue::Int(1)));
        let err = SampleSet::from_features(&fc, "nitr_ran").unwrap_err();
        assert!(err.is_missing_input());
    }

    #[test]
    fn test_empty_set_is_rejected() {
        assert!(SampleSet::default().require_non_empty().is_err());
    }
}
