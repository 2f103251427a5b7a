//! GeoJSON input and output.
//!
//! Input is a FeatureCollection of point features whose properties become the
//! source fields. Output is a FeatureCollection of MultiLineString or
//! MultiPolygon features carrying the generator's attribute schema.

use std::collections::BTreeMap;
use std::io::Read;

use anyhow::{Context, Result};
use classify_engine::{
    AttributeValue, ClassifyFeature, ClassifyResult, Crs, FeatureSink, FieldDef, FieldType,
    Geometry, InputGeometry, MemorySource, Point,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A GeoJSON position; only the first two ordinates are used.
pub type Position = Vec<f64>;

/// GeoJSON geometry objects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum GeoJsonGeometry {
    Point { coordinates: Position },
    MultiPoint { coordinates: Vec<Position> },
    LineString { coordinates: Vec<Position> },
    MultiLineString { coordinates: Vec<Vec<Position>> },
    Polygon { coordinates: Vec<Vec<Position>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Position>>> },
}

/// Legacy named CRS member (`{"type": "name", "properties": {"name": ...}}`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NamedCrs {
    #[serde(rename = "type")]
    pub type_: String,
    pub properties: CrsName,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrsName {
    pub name: String,
}

impl NamedCrs {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            type_: "name".to_string(),
            properties: CrsName { name: name.into() },
        }
    }

    /// Authority id from names such as "EPSG:2193" or "urn:ogc:def:crs:EPSG::2193".
    pub fn authid(&self) -> String {
        let name = self.properties.name.trim();
        match name.strip_prefix("urn:ogc:def:crs:") {
            Some(urn) => {
                let parts: Vec<&str> = urn.split(':').filter(|p| !p.is_empty()).collect();
                match parts.as_slice() {
                    [authority, .., code] => format!("{}:{}", authority, code),
                    _ => name.to_string(),
                }
            }
            None => name.to_string(),
        }
    }
}

/// A GeoJSON Feature.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeoJsonFeature {
    /// Type identifier (always "Feature").
    #[serde(rename = "type")]
    pub type_: String,

    pub geometry: Option<GeoJsonGeometry>,

    #[serde(default)]
    pub properties: Option<Map<String, Value>>,
}

/// A GeoJSON FeatureCollection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeoJsonFeatureCollection {
    /// Type identifier (always "FeatureCollection").
    #[serde(rename = "type")]
    pub type_: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crs: Option<NamedCrs>,

    #[serde(default)]
    pub features: Vec<GeoJsonFeature>,
}

impl GeoJsonFeatureCollection {
    pub fn new() -> Self {
        Self {
            type_: "FeatureCollection".to_string(),
            name: None,
            crs: None,
            features: Vec::new(),
        }
    }
}

impl Default for GeoJsonFeatureCollection {
    fn default() -> Self {
        Self::new()
    }
}

fn point(position: &[f64]) -> Result<Point> {
    match position {
        [x, y, ..] => Ok(Point::new(*x, *y)),
        _ => anyhow::bail!("Position {:?} has fewer than two ordinates", position),
    }
}

fn points(positions: &[Position]) -> Result<Vec<Point>> {
    positions.iter().map(|p| point(p)).collect()
}

fn input_geometry(geometry: Option<&GeoJsonGeometry>) -> Result<InputGeometry> {
    Ok(match geometry {
        None => InputGeometry::Empty,
        Some(GeoJsonGeometry::Point { coordinates }) => InputGeometry::Point(point(coordinates)?),
        Some(GeoJsonGeometry::MultiPoint { coordinates }) => {
            InputGeometry::MultiPoint(points(coordinates)?)
        }
        Some(GeoJsonGeometry::LineString { coordinates }) => {
            InputGeometry::LineString(points(coordinates)?)
        }
        Some(GeoJsonGeometry::MultiLineString { coordinates }) => {
            InputGeometry::LineString(points(coordinates.first().map_or(&[][..], |l| l.as_slice()))?)
        }
        Some(GeoJsonGeometry::Polygon { coordinates }) => InputGeometry::Polygon(
            coordinates
                .iter()
                .map(|ring| points(ring))
                .collect::<Result<_>>()?,
        ),
        Some(GeoJsonGeometry::MultiPolygon { coordinates }) => InputGeometry::Polygon(
            coordinates
                .first()
                .map_or(&[][..], |p| p.as_slice())
                .iter()
                .map(|ring| points(ring))
                .collect::<Result<_>>()?,
        ),
    })
}

/// Field schema from every property seen: numeric when all non-null values are numbers.
fn infer_fields(features: &[GeoJsonFeature]) -> Vec<FieldDef> {
    let mut numeric: BTreeMap<&str, bool> = BTreeMap::new();
    for properties in features.iter().filter_map(|f| f.properties.as_ref()) {
        for (name, value) in properties {
            let is_numeric = numeric.entry(name.as_str()).or_insert(true);
            *is_numeric &= value.is_null() || value.is_number();
        }
    }
    numeric
        .into_iter()
        .map(|(name, is_numeric)| {
            FieldDef::new(
                name,
                if is_numeric {
                    FieldType::Double
                } else {
                    FieldType::String
                },
            )
        })
        .collect()
}

fn attribute(value: Option<&Value>, field_type: FieldType) -> AttributeValue {
    match value {
        None | Some(Value::Null) => AttributeValue::Null,
        Some(Value::Number(n)) if field_type == FieldType::Double => {
            n.as_f64().map_or(AttributeValue::Null, AttributeValue::Double)
        }
        Some(Value::String(s)) => AttributeValue::Text(s.clone()),
        Some(other) => AttributeValue::Text(other.to_string()),
    }
}

/// Read a point FeatureCollection into an in-memory source.
///
/// Feature ids are the zero-based positions of the features in the file.
/// `crs` overrides the collection's own CRS member; without either the
/// GeoJSON default of WGS 84 is assumed.
pub fn read_points<R: Read>(reader: R, crs: Option<&str>) -> Result<MemorySource> {
    let collection: GeoJsonFeatureCollection =
        serde_json::from_reader(reader).context("Failed to parse GeoJSON input")?;
    anyhow::ensure!(
        collection.type_ == "FeatureCollection",
        "Expected a GeoJSON FeatureCollection, found {}",
        collection.type_
    );

    let authid = match (crs, &collection.crs) {
        (Some(crs), _) => crs.to_string(),
        (None, Some(named)) => named.authid(),
        (None, None) => "EPSG:4326".to_string(),
    };

    let fields = infer_fields(&collection.features);
    let mut source = MemorySource::new(fields.clone(), Crs::from_authid(&authid));
    for (i, feature) in collection.features.iter().enumerate() {
        let geometry = input_geometry(feature.geometry.as_ref())
            .with_context(|| format!("Invalid geometry in feature {}", i))?;
        let attributes = fields
            .iter()
            .map(|field| {
                attribute(
                    feature.properties.as_ref().and_then(|p| p.get(&field.name)),
                    field.field_type,
                )
            })
            .collect();
        source.push(geometry, attributes);
    }

    Ok(source)
}

fn position(point: &Point) -> Position {
    vec![point.x, point.y]
}

/// Closed GeoJSON ring from an open ring.
fn closed_ring(ring: &[Point]) -> Vec<Position> {
    let mut positions: Vec<Position> = ring.iter().map(position).collect();
    if let Some(first) = positions.first().cloned() {
        positions.push(first);
    }
    positions
}

fn output_geometry(geometry: &Geometry) -> GeoJsonGeometry {
    match geometry {
        Geometry::MultiLineString(lines) => GeoJsonGeometry::MultiLineString {
            coordinates: lines
                .iter()
                .map(|line| line.iter().map(position).collect())
                .collect(),
        },
        Geometry::MultiPolygon(polygons) => GeoJsonGeometry::MultiPolygon {
            coordinates: polygons
                .iter()
                .map(|polygon| {
                    std::iter::once(&polygon.exterior)
                        .chain(&polygon.interiors)
                        .map(|ring| closed_ring(ring))
                        .collect()
                })
                .collect(),
        },
    }
}

fn json_value(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::Null => Value::Null,
        AttributeValue::Int(v) => Value::from(*v),
        AttributeValue::Double(v) => serde_json::Number::from_f64(*v).map_or(Value::Null, Value::Number),
        AttributeValue::Text(s) => Value::String(s.clone()),
    }
}

/// Collects generated features into a FeatureCollection.
#[derive(Debug, Clone)]
pub struct GeoJsonSink {
    fields: Vec<FieldDef>,
    collection: GeoJsonFeatureCollection,
}

impl GeoJsonSink {
    pub fn new(fields: Vec<FieldDef>, crs: &Crs, name: Option<String>) -> Self {
        let mut collection = GeoJsonFeatureCollection::new();
        collection.name = name;
        if !crs.authid.is_empty() {
            collection.crs = Some(NamedCrs::new(crs.authid.clone()));
        }
        Self { fields, collection }
    }

    pub fn len(&self) -> usize {
        self.collection.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collection.features.is_empty()
    }

    pub fn into_collection(self) -> GeoJsonFeatureCollection {
        self.collection
    }
}

impl FeatureSink for GeoJsonSink {
    fn add_feature(
        &mut self,
        feature: &ClassifyFeature,
        attributes: &[AttributeValue],
    ) -> ClassifyResult<()> {
        let properties = self
            .fields
            .iter()
            .zip(attributes)
            .map(|(field, value)| (field.name.clone(), json_value(value)))
            .collect();
        self.collection.features.push(GeoJsonFeature {
            type_: "Feature".to_string(),
            geometry: Some(output_geometry(&feature.geometry)),
            properties: Some(properties),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use classify_engine::{FeatureSource, FeatureValue, Polygon};

    const POINTS: &str = r#"{
        "type": "FeatureCollection",
        "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::2193"}},
        "features": [
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [0, 0, 5]},
             "properties": {"depth": 1.5, "site": "a"}},
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [1, 0]},
             "properties": {"depth": null, "site": 7}},
            {"type": "Feature", "geometry": null, "properties": {"depth": 2}}
        ]
    }"#;

    #[test]
    fn test_read_points() {
        let source = read_points(POINTS.as_bytes(), None).unwrap();
        assert_eq!(source.crs().authid, "EPSG:2193");
        assert!(!source.crs().is_geographic());
        assert_eq!(
            source.fields(),
            &[
                FieldDef::new("depth", FieldType::Double),
                FieldDef::new("site", FieldType::String)
            ]
        );

        let features: Vec<_> = source.features(None).collect();
        assert_eq!(features.len(), 3);
        assert_eq!(features[0].geometry, InputGeometry::Point(Point::new(0.0, 0.0)));
        assert_eq!(features[0].attributes[0], AttributeValue::Double(1.5));
        assert_eq!(features[1].attributes[0], AttributeValue::Null);
        assert_eq!(features[1].attributes[1], AttributeValue::Text("7".to_string()));
        assert_eq!(features[2].geometry, InputGeometry::Empty);
        assert_eq!(features[2].attributes[1], AttributeValue::Null);
    }

    #[test]
    fn test_crs_override_and_default() {
        let source = read_points(POINTS.as_bytes(), Some("EPSG:4326")).unwrap();
        assert!(source.crs().is_geographic());

        let bare = r#"{"type": "FeatureCollection", "features": []}"#;
        let source = read_points(bare.as_bytes(), None).unwrap();
        assert_eq!(source.crs().authid, "EPSG:4326");
    }

    #[test]
    fn test_rejects_non_collection() {
        let err = read_points(r#"{"type": "Feature", "features": []}"#.as_bytes(), None).unwrap_err();
        assert!(err.to_string().contains("FeatureCollection"));
        assert!(read_points("[1, 2]".as_bytes(), None).is_err());
    }

    #[test]
    fn test_sink_writes_closed_rings() {
        let fields = vec![
            FieldDef::new("index", FieldType::Int),
            FieldDef::new("z_min", FieldType::Double),
            FieldDef::new("z_max", FieldType::Double),
            FieldDef::new("label", FieldType::String),
        ];
        let mut sink = GeoJsonSink::new(fields, &Crs::from_authid("EPSG:2193"), None);
        let square = vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 1.0),
        ];
        let feature = ClassifyFeature {
            index: 0,
            value: FeatureValue::Range {
                min: f64::NEG_INFINITY,
                max: 1.0,
            },
            label: "< 1".to_string(),
            geometry: Geometry::MultiPolygon(vec![Polygon::new(square, vec![])]),
        };
        sink.add_feature(&feature, &feature.attributes()).unwrap();
        assert_eq!(sink.len(), 1);

        let json = serde_json::to_value(sink.into_collection()).unwrap();
        let out = &json["features"][0];
        assert_eq!(out["geometry"]["type"], "MultiPolygon");
        let ring = out["geometry"]["coordinates"][0][0].as_array().unwrap();
        assert_eq!(ring.len(), 5);
        assert_eq!(ring[0], ring[4]);
        assert_eq!(out["properties"]["z_min"], Value::Null);
        assert_eq!(out["properties"]["z_max"], 1.0);
        assert_eq!(out["properties"]["label"], "< 1");
        assert_eq!(json["crs"]["properties"]["name"], "EPSG:2193");
    }
}
