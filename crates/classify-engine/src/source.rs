//! Feature source contract consumed by the point loader.

use std::collections::BTreeSet;

use classify_common::{AttributeValue, Crs, FieldDef, FieldType, Point};

/// Identifier of a feature within its source.
pub type FeatureId = u64;

/// Geometry of an input feature. Only single points can be classified.
#[derive(Debug, Clone, PartialEq)]
pub enum InputGeometry {
    Point(Point),
    MultiPoint(Vec<Point>),
    LineString(Vec<Point>),
    Polygon(Vec<Vec<Point>>),
    Empty,
}

impl InputGeometry {
    pub fn type_name(&self) -> &'static str {
        match self {
            InputGeometry::Point(_) => "Point",
            InputGeometry::MultiPoint(_) => "MultiPoint",
            InputGeometry::LineString(_) => "LineString",
            InputGeometry::Polygon(_) => "Polygon",
            InputGeometry::Empty => "Empty",
        }
    }
}

/// One feature read from a source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFeature {
    pub id: FeatureId,
    pub geometry: InputGeometry,
    /// Attribute values aligned with [`FeatureSource::fields`]
    pub attributes: Vec<AttributeValue>,
}

/// A vector source of features with a fixed attribute schema.
pub trait FeatureSource {
    fn fields(&self) -> &[FieldDef];

    fn feature_count(&self) -> usize;

    /// Iterate features, restricted to `filter` ids when given.
    fn features<'a>(
        &'a self,
        filter: Option<&'a BTreeSet<FeatureId>>,
    ) -> Box<dyn Iterator<Item = SourceFeature> + 'a>;

    fn crs(&self) -> &Crs;

    /// Index of the named field, if present.
    fn field_index(&self, name: &str) -> Option<usize> {
        self.fields().iter().position(|f| f.name == name)
    }
}

/// A feature source held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    fields: Vec<FieldDef>,
    features: Vec<SourceFeature>,
    crs: Crs,
}

impl MemorySource {
    pub fn new(fields: Vec<FieldDef>, crs: Crs) -> Self {
        Self {
            fields,
            features: Vec::new(),
            crs,
        }
    }

    /// Build a source with a single double field from parallel coordinate arrays.
    pub fn from_xyz(field: &str, x: &[f64], y: &[f64], z: &[f64], crs: Crs) -> Self {
        let mut source = Self::new(vec![FieldDef::new(field, FieldType::Double)], crs);
        for ((&x, &y), &z) in x.iter().zip(y).zip(z) {
            source.push_point(x, y, vec![AttributeValue::Double(z)]);
        }
        source
    }

    /// Append a feature, assigning the next sequential id.
    pub fn push(&mut self, geometry: InputGeometry, attributes: Vec<AttributeValue>) -> FeatureId {
        let id = self.features.len() as FeatureId;
        self.features.push(SourceFeature {
            id,
            geometry,
            attributes,
        });
        id
    }

    pub fn push_point(&mut self, x: f64, y: f64, attributes: Vec<AttributeValue>) -> FeatureId {
        self.push(InputGeometry::Point(Point::new(x, y)), attributes)
    }
}

impl FeatureSource for MemorySource {
    fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    fn feature_count(&self) -> usize {
        self.features.len()
    }

    fn features<'a>(
        &'a self,
        filter: Option<&'a BTreeSet<FeatureId>>,
    ) -> Box<dyn Iterator<Item = SourceFeature> + 'a> {
        Box::new(
            self.features
                .iter()
                .filter(move |f| filter.map_or(true, |ids| ids.contains(&f.id)))
                .cloned(),
        )
    }

    fn crs(&self) -> &Crs {
        &self.crs
    }
}
