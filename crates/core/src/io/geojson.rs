//! Minimal GeoJSON FeatureCollection reader and writer
//!
//! Supports Point, MultiPoint, LineString, Polygon and MultiPolygon
//! geometries. Coordinates are taken as-is: datasets must already be in the
//! analysis CRS, named by the legacy `crs` member when present.

use geo_types::{Coord, Geometry, LineString, MultiPoint, MultiPolygon, Point, Polygon};
use serde_json::{json, Map, Number, Value};
use std::io::Write;
use std::path::Path;

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::vector::{AttributeValue, Feature, FeatureCollection};

/// Read a GeoJSON FeatureCollection from a file
pub fn read_geojson<P: AsRef<Path>>(path: P) -> Result<FeatureCollection> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::MissingInput(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path)?;
    read_geojson_str(&text)
}

/// Parse a GeoJSON FeatureCollection
pub fn read_geojson_str(text: &str) -> Result<FeatureCollection> {
    let root: Value = serde_json::from_str(text)?;
    if root.get("type").and_then(Value::as_str) != Some("FeatureCollection") {
        return Err(invalid("top-level object is not a FeatureCollection"));
    }

    let crs = root
        .pointer("/crs/properties/name")
        .and_then(Value::as_str)
        .and_then(CRS::parse);

    let features = root
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid("missing 'features' array"))?
        .iter()
        .enumerate()
        .map(|(i, f)| parse_feature(f).map_err(|e| invalid(&format!("feature {i}: {e}"))))
        .collect::<Result<Vec<_>>>()?;

    Ok(FeatureCollection { features, crs })
}

/// Write a FeatureCollection as GeoJSON.
///
/// An EPSG CRS goes into the legacy `crs` member. Non-finite numbers
/// become `null`.
pub fn write_geojson<W: Write>(writer: W, fc: &FeatureCollection) -> Result<()> {
    let features = fc.iter().map(feature_value).collect::<Result<Vec<_>>>()?;
    let mut root = Map::new();
    root.insert("type".into(), "FeatureCollection".into());
    if let Some(code) = fc.crs.as_ref().and_then(CRS::epsg) {
        root.insert(
            "crs".into(),
            json!({ "type": "name", "properties": { "name": format!("EPSG:{code}") } }),
        );
    }
    root.insert("features".into(), Value::Array(features));
    serde_json::to_writer(writer, &Value::Object(root))?;
    Ok(())
}

fn feature_value(feature: &Feature) -> Result<Value> {
    let geometry = match &feature.geometry {
        Some(g) => geometry_value(g)?,
        None => Value::Null,
    };
    let properties: Map<String, Value> = feature
        .properties
        .iter()
        .map(|(k, v)| (k.clone(), attribute_value(v)))
        .collect();
    let mut out = Map::new();
    out.insert("type".into(), "Feature".into());
    if let Some(id) = &feature.id {
        out.insert("id".into(), id.clone().into());
    }
    out.insert("geometry".into(), geometry);
    out.insert("properties".into(), Value::Object(properties));
    Ok(Value::Object(out))
}

fn attribute_value(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::Null => Value::Null,
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Int(i) => Value::from(*i),
        AttributeValue::Float(f) => number(*f),
        AttributeValue::String(s) => Value::String(s.clone()),
    }
}

fn number(v: f64) -> Value {
    Number::from_f64(v).map_or(Value::Null, Value::Number)
}

fn position(c: Coord<f64>) -> Value {
    Value::Array(vec![number(c.x), number(c.y)])
}

fn ring(line: &LineString<f64>) -> Value {
    Value::Array(line.coords().map(|c| position(*c)).collect())
}

fn rings(polygon: &Polygon<f64>) -> Value {
    Value::Array(
        std::iter::once(polygon.exterior())
            .chain(polygon.interiors())
            .map(ring)
            .collect(),
    )
}

fn geometry_value(geometry: &Geometry<f64>) -> Result<Value> {
    let (kind, coordinates) = match geometry {
        Geometry::Point(p) => ("Point", position(p.0)),
        Geometry::MultiPoint(mp) => ("MultiPoint", Value::Array(mp.iter().map(|p| position(p.0)).collect())),
        Geometry::LineString(l) => ("LineString", ring(l)),
        Geometry::Polygon(p) => ("Polygon", rings(p)),
        Geometry::Rect(r) => ("Polygon", rings(&r.to_polygon())),
        Geometry::MultiPolygon(mp) => ("MultiPolygon", Value::Array(mp.iter().map(rings).collect())),
        other => {
            return Err(Error::UnsupportedDataType(format!(
                "GeoJSON: cannot write {} geometry",
                crate::vector::geometry_name(other)
            )));
        }
    };
    Ok(json!({ "type": kind, "coordinates": coordinates }))
}

fn invalid(msg: &str) -> Error {
    Error::Other(format!("GeoJSON: {msg}"))
}

fn parse_feature(value: &Value) -> Result<Feature> {
    let geometry = match value.get("geometry") {
        None | Some(Value::Null) => None,
        Some(g) => Some(parse_geometry(g)?),
    };
    let properties = value
        .get("properties")
        .and_then(Value::as_object)
        .map(parse_properties)
        .unwrap_or_default();
    let id = value.get("id").and_then(|v| match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    });
    Ok(Feature { geometry, properties, id })
}

fn parse_properties(map: &Map<String, Value>) -> std::collections::HashMap<String, AttributeValue> {
    map.iter()
        .map(|(k, v)| {
            let attr = match v {
                Value::Null => AttributeValue::Null,
                Value::Bool(b) => AttributeValue::Bool(*b),
                Value::Number(n) => match n.as_i64() {
                    Some(i) => AttributeValue::Int(i),
                    None => AttributeValue::Float(n.as_f64().unwrap_or(f64::NAN)),
                },
                Value::String(s) => AttributeValue::String(s.clone()),
                other => AttributeValue::String(other.to_string()),
            };
            (k.clone(), attr)
        })
        .collect()
}

fn parse_geometry(value: &Value) -> Result<Geometry<f64>> {
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("geometry without type"))?;
    let coords = value
        .get("coordinates")
        .ok_or_else(|| invalid("geometry without coordinates"))?;

    Ok(match kind {
        "Point" => Geometry::Point(Point(coord(coords)?)),
        "MultiPoint" => Geometry::MultiPoint(MultiPoint(
            array(coords)?.iter().map(|c| coord(c).map(Point)).collect::<Result<_>>()?,
        )),
        "LineString" => Geometry::LineString(line(coords)?),
        "Polygon" => Geometry::Polygon(polygon(coords)?),
        "MultiPolygon" => Geometry::MultiPolygon(MultiPolygon(
            array(coords)?.iter().map(polygon).collect::<Result<_>>()?,
        )),
        other => return Err(invalid(&format!("unsupported geometry type '{other}'"))),
    })
}

fn array(value: &Value) -> Result<&Vec<Value>> {
    value.as_array().ok_or_else(|| invalid("expected coordinate array"))
}

fn coord(value: &Value) -> Result<Coord<f64>> {
    let xy = array(value)?;
    match (xy.first().and_then(Value::as_f64), xy.get(1).and_then(Value::as_f64)) {
        (Some(x), Some(y)) => Ok(Coord { x, y }),
        _ => Err(invalid("position needs two numbers")),
    }
}

fn line(value: &Value) -> Result<LineString<f64>> {
    Ok(LineString(array(value)?.iter().map(coord).collect::<Result<_>>()?))
}

fn polygon(value: &Value) -> Result<Polygon<f64>> {
    let mut rings = array(value)?.iter().map(line);
    let exterior = rings.next().ok_or_else(|| invalid("polygon without rings"))??;
    let interiors = rings.collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}
