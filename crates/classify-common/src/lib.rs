//! Common types and utilities shared by the classification engine and its services.

pub mod crs;
pub mod error;
pub mod feedback;
pub mod geometry;
pub mod types;

pub use crs::Crs;
pub use error::{ClassifyError, ClassifyResult, ErrorKind};
pub use feedback::{Feedback, RecordingFeedback, TracingFeedback};
pub use geometry::{point_in_ring, ring_area, Geometry, Point, Polygon};
pub use types::{AttributeValue, ClassifyType, ExtendOption, FieldDef, FieldType, GeometryType};
