//! Vector data structures
//!
//! - `Feature` / `FeatureCollection`: geometry plus named attributes, as read
//!   from a vector dataset
//! - `Region`: a labeled polygon with one external attribute
//! - `RegionTable`: one aggregated row per region

use geo_types::{Geometry, MultiPolygon};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::crs::CRS;
use crate::error::{Error, Result};

/// Attribute value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    /// Numeric view of the value. Numeric strings are parsed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(v) => Some(*v as f64),
            AttributeValue::Float(v) => Some(*v),
            AttributeValue::String(s) => s.trim().parse().ok(),
            AttributeValue::Null | AttributeValue::Bool(_) => None,
        }
    }

    /// Identifier view of the value. Whole floats render without a fraction.
    pub fn as_id(&self) -> Option<String> {
        match self {
            AttributeValue::String(s) => Some(s.clone()),
            AttributeValue::Int(v) => Some(v.to_string()),
            AttributeValue::Float(v) if v.fract() == 0.0 && v.is_finite() => {
                Some(format!("{}", *v as i64))
            }
            AttributeValue::Float(v) => Some(v.to_string()),
            AttributeValue::Null | AttributeValue::Bool(_) => None,
        }
    }
}

/// A geographic feature with geometry and attributes
#[derive(Debug, Clone)]
pub struct Feature {
    pub geometry: Option<Geometry<f64>>,
    pub properties: HashMap<String, AttributeValue>,
    pub id: Option<String>,
}

impl Feature {
    pub fn new(geometry: Geometry<f64>) -> Self {
        Self {
            geometry: Some(geometry),
            properties: HashMap::new(),
            id: None,
        }
    }

    /// Builder-style attribute setter
    pub fn with_property(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: AttributeValue) {
        self.properties.insert(key.into(), value);
    }

    pub fn get_property(&self, key: &str) -> Option<&AttributeValue> {
        self.properties.get(key)
    }
}

/// Collection of features sharing one coordinate system
#[derive(Debug, Clone, Default)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
    pub crs: Option<CRS>,
}

impl FeatureCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    /// All attribute names present on any feature, sorted
    pub fn field_names(&self) -> BTreeSet<String> {
        self.features
            .iter()
            .flat_map(|f| f.properties.keys().cloned())
            .collect()
    }

    /// Fail unless every `required` field exists in the collection.
    ///
    /// The error names the missing fields and the available ones.
    pub fn require_fields(&self, required: &[&str], label: &str) -> Result<()> {
        let available = self.field_names();
        let missing: Vec<String> = required
            .iter()
            .filter(|f| !available.contains(**f))
            .map(|f| f.to_string())
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        Err(Error::MissingFields {
            label: label.to_string(),
            missing,
            available: available.into_iter().collect(),
        })
    }
}

impl IntoIterator for FeatureCollection {
    type Item = Feature;
    type IntoIter = std::vec::IntoIter<Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.into_iter()
    }
}

/// A labeled region polygon with an externally supplied attribute
#[derive(Debug, Clone)]
pub struct Region {
    /// Stable identifier
    pub id: String,
    /// External scalar (e.g. an incidence rate); NaN when absent
    pub attribute: f64,
    pub geometry: MultiPolygon<f64>,
}

impl Region {
    pub fn new(id: impl Into<String>, attribute: f64, geometry: impl Into<MultiPolygon<f64>>) -> Self {
        Self {
            id: id.into(),
            attribute,
            geometry: geometry.into(),
        }
    }

    /// Build regions from polygon features.
    ///
    /// Both fields must exist in the collection. Features without an id or
    /// without polygonal geometry are rejected; a missing attribute value
    /// becomes NaN.
    pub fn from_features(fc: &FeatureCollection, id_field: &str, attribute_field: &str) -> Result<Vec<Region>> {
        fc.require_fields(&[id_field, attribute_field], "REGIONS")?;

        fc.iter()
            .enumerate()
            .map(|(i, f)| {
                let id = f
                    .get_property(id_field)
                    .and_then(AttributeValue::as_id)
                    .ok_or_else(|| Error::Other(format!("REGIONS: feature {i} has no '{id_field}' value")))?;
                let attribute = f
                    .get_property(attribute_field)
                    .and_then(AttributeValue::as_f64)
                    .unwrap_or(f64::NAN);
                let geometry = match &f.geometry {
                    Some(Geometry::Polygon(p)) => MultiPolygon(vec![p.clone()]),
                    Some(Geometry::MultiPolygon(mp)) => mp.clone(),
                    Some(Geometry::Rect(r)) => MultiPolygon(vec![r.to_polygon()]),
                    other => {
                        return Err(Error::UnsupportedDataType(format!(
                            "REGIONS: feature {i} ('{id}') has non-polygon geometry {:?}",
                            other.as_ref().map(geometry_name)
                        )));
                    }
                };
                Ok(Region { id, attribute, geometry })
            })
            .collect()
    }
}

/// Total bounds `(min_x, min_y, max_x, max_y)` of the regions' polygons
pub fn total_bounds(regions: &[Region]) -> Option<(f64, f64, f64, f64)> {
    regions
        .iter()
        .flat_map(|r| r.geometry.0.iter())
        .flat_map(|p| p.exterior().coords())
        .fold(None, |acc, c| {
            Some(match acc {
                None => (c.x, c.y, c.x, c.y),
                Some((x0, y0, x1, y1)) => (x0.min(c.x), y0.min(c.y), x1.max(c.x), y1.max(c.y)),
            })
        })
}

pub(crate) fn geometry_name(g: &Geometry<f64>) -> &'static str {
    match g {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

/// One aggregated region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionRow {
    pub region_id: String,
    pub attribute: f64,
    /// Mean of valid raster cells; `None` when no valid cell overlaps the region
    pub mean_value: Option<f64>,
}

/// One row per region, in region input order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionTable {
    pub rows: Vec<RegionRow>,
}

impl RegionTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of regions with a defined mean
    pub fn covered(&self) -> usize {
        self.rows.iter().filter(|r| r.mean_value.is_some()).count()
    }

    pub fn get(&self, region_id: &str) -> Option<&RegionRow> {
        self.rows.iter().find(|r| r.region_id == region_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{Point, Rect, coord};

    fn square(x0: f64, y0: f64, size: f64) -> Geometry<f64> {
        Geometry::Rect(Rect::new(coord! { x: x0, y: y0 }, coord! { x: x0 + size, y: y0 + size }))
    }

    #[test]
    fn test_require_fields_reports_missing_and_available() {
        let mut fc = FeatureCollection::new();
        fc.push(
            Feature::new(Point::new(0.0, 0.0).into())
                .with_property("value", AttributeValue::Float(1.0))
                .with_property("name", AttributeValue::String("a".into())),
        );

        assert!(fc.require_fields(&["value"], "WELLS").is_ok());
        let err = fc.require_fields(&["value", "depth", "rate"], "WELLS").unwrap_err();
        match err {
            Error::MissingFields { label, missing, available } => {
                assert_eq!(label, "WELLS");
                assert_eq!(missing, vec!["depth".to_string(), "rate".to_string()]);
                assert_eq!(available, vec!["name".to_string(), "value".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_regions_from_features() {
        let mut fc = FeatureCollection::new();
        fc.push(
            Feature::new(square(0.0, 0.0, 10.0))
                .with_property("GEOID", AttributeValue::Int(55001))
                .with_property("rate", AttributeValue::Float(0.25)),
        );
        fc.push(
            Feature::new(square(10.0, 0.0, 10.0))
                .with_property("GEOID", AttributeValue::String("55002".into()))
                .with_property("rate", AttributeValue::Null),
        );

        let regions = Region::from_features(&fc, "GEOID", "rate").unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].id, "55001");
        assert_eq!(regions[0].attribute, 0.25);
        assert_eq!(regions[1].id, "55002");
        assert!(regions[1].attribute.is_nan());

        assert_eq!(total_bounds(&regions), Some((0.0, 0.0, 20.0, 10.0)));
    }

    #[test]
    fn test_regions_reject_points() {
        let mut fc = FeatureCollection::new();
        fc.push(
            Feature::new(Point::new(1.0, 1.0).into())
                .with_property("id", AttributeValue::Int(1))
                .with_property("rate", AttributeValue::Float(1.0)),
        );
        assert!(Region::from_features(&fc, "id", "rate").is_err());
    }

    #[test]
    fn test_attribute_conversions() {
        assert_eq!(AttributeValue::String(" 2.5 ".into()).as_f64(), Some(2.5));
        assert_eq!(AttributeValue::Float(55001.0).as_id(), Some("55001".into()));
        assert_eq!(AttributeValue::Null.as_id(), None);
    }
}
