//! Classification variants and attribute schema types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ClassifyError;

/// The kind of geometry produced for a classification run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifyType {
    /// Iso-value lines, one feature per level
    #[default]
    Line,
    /// Closed bands between consecutive levels
    Filled,
    /// Single-threshold regions where the value is at or above each level
    Layer,
}

impl ClassifyType {
    pub fn all() -> [ClassifyType; 3] {
        [ClassifyType::Line, ClassifyType::Filled, ClassifyType::Layer]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClassifyType::Line => "line",
            ClassifyType::Filled => "filled",
            ClassifyType::Layer => "layer",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ClassifyType::Line => "Classify lines",
            ClassifyType::Filled => "Filled classify polygons",
            ClassifyType::Layer => "Layer classify polygons",
        }
    }

    /// Output geometry type for features of this classification.
    pub fn geometry_type(&self) -> GeometryType {
        match self {
            ClassifyType::Line => GeometryType::MultiLineString,
            ClassifyType::Filled | ClassifyType::Layer => GeometryType::MultiPolygon,
        }
    }
}

impl FromStr for ClassifyType {
    type Err = ClassifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "line" => Ok(ClassifyType::Line),
            "filled" => Ok(ClassifyType::Filled),
            "layer" => Ok(ClassifyType::Layer),
            _ => Err(ClassifyError::InvalidClassifyType(s.to_string())),
        }
    }
}

impl fmt::Display for ClassifyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether filled output extends beyond the first/last level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtendOption {
    #[default]
    #[serde(rename = "both")]
    Both,
    #[serde(rename = "min", alias = "below")]
    Below,
    #[serde(rename = "max", alias = "above")]
    Above,
    #[serde(rename = "neither", alias = "none")]
    Neither,
}

impl ExtendOption {
    pub fn all() -> [ExtendOption; 4] {
        [
            ExtendOption::Both,
            ExtendOption::Below,
            ExtendOption::Above,
            ExtendOption::Neither,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExtendOption::Both => "both",
            ExtendOption::Below => "min",
            ExtendOption::Above => "max",
            ExtendOption::Neither => "neither",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ExtendOption::Both => "Fill below minimum and above maximum classify",
            ExtendOption::Below => "Fill below minimum classify",
            ExtendOption::Above => "Fill above maximum classify",
            ExtendOption::Neither => "Don't fill below or above maximum classify",
        }
    }

    pub fn extends_below(&self) -> bool {
        matches!(self, ExtendOption::Both | ExtendOption::Below)
    }

    pub fn extends_above(&self) -> bool {
        matches!(self, ExtendOption::Both | ExtendOption::Above)
    }
}

impl FromStr for ExtendOption {
    type Err = ClassifyError;

    /// Accepts the canonical ids plus the "none"/"below"/"above" aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "both" => Ok(ExtendOption::Both),
            "min" | "below" => Ok(ExtendOption::Below),
            "max" | "above" => Ok(ExtendOption::Above),
            "neither" | "none" => Ok(ExtendOption::Neither),
            _ => Err(ClassifyError::InvalidExtendOption(s.to_string())),
        }
    }
}

impl fmt::Display for ExtendOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output geometry type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryType {
    MultiLineString,
    MultiPolygon,
}

/// Attribute field type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Int,
    Double,
    String,
}

/// A named, typed attribute field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// An attribute value read from a source or written to a sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    Int(i64),
    Double(f64),
    Text(String),
}

impl AttributeValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    /// Numeric view of the value, parsing text when possible.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Null => None,
            AttributeValue::Int(v) => Some(*v as f64),
            AttributeValue::Double(v) => Some(*v),
            AttributeValue::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Null => write!(f, "NULL"),
            AttributeValue::Int(v) => write!(f, "{}", v),
            AttributeValue::Double(v) => write!(f, "{}", v),
            AttributeValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Double(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::Text(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::Text(v)
    }
}
