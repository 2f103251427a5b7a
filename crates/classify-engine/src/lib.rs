//! Point classification and contouring engine.
//!
//! Turns `(x, y, z)` point data into classified contour features:
//! - [`loader`]: reads and validates points from a [`FeatureSource`]
//! - [`grid`]: detects points lying on a regular grid
//! - [`levels`]: class boundaries from a [`ClassifyMethod`]
//! - [`triangulation`]: Delaunay mesh for scattered points, optionally in a worker process
//! - [`contour`]: line, band and threshold extraction
//! - [`builder`]: geometry repair and assembly
//! - [`labels`]: value and range labels
//!
//! [`ClassifyGenerator`] ties the stages together and caches each one.

pub mod builder;
pub mod config;
pub mod contour;
pub mod expression;
pub mod generator;
pub mod grid;
pub mod labels;
pub mod levels;
pub mod loader;
pub mod source;
pub mod triangulation;

pub use classify_common::{
    AttributeValue, ClassifyError, ClassifyResult, ClassifyType, Crs, ErrorKind, ExtendOption,
    Feedback, FieldDef, FieldType, Geometry, GeometryType, Point, Polygon, RecordingFeedback,
    TracingFeedback,
};
pub use config::{GeneratorConfig, LocalOrigin, TriangulationConfig, TriangulationMode};
pub use contour::Band;
pub use generator::{
    ClassifyFeature, ClassifyGenerator, FeatureIter, FeatureSink, FeatureValue, SharedFeedback,
    SharedSource,
};
pub use grid::{GridDetector, GridLayout};
pub use labels::{LabelFormat, LabelFormatter};
pub use levels::{calculate_levels, ClassifyMethod, ClassifyParams, LevelList, MAX_CLASSIFYS};
pub use loader::{load_points, LoadOptions, PointSet};
pub use source::{FeatureId, FeatureSource, InputGeometry, MemorySource, SourceFeature};
pub use triangulation::{SpadeTriangulator, Triangulator, WorkerTriangulator, TRIG_WORKER_ENV};
