//! Generator configuration.
//!
//! Every option can be set from YAML (or any serde format). Missing keys take
//! their defaults, so a config only needs the options it changes.

use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::path::PathBuf;

use classify_common::{ClassifyType, ExtendOption};
use serde::{Deserialize, Serialize};

use crate::grid::DEFAULT_GRID_TOLERANCE;
use crate::labels::LabelFormat;
use crate::levels::{ClassifyMethod, ClassifyParams};
use crate::source::FeatureId;
use crate::triangulation::{
    SpadeTriangulator, Triangulator, WorkerTriangulator, DEFAULT_MIN_CIRCLE_RATIO, TRIG_WORKER_ENV,
};

/// Complete configuration of a [`crate::ClassifyGenerator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Field name or value expression giving z
    pub expression: String,
    /// Name used for the output value field instead of the expression
    pub field_name: Option<String>,
    /// Only load these feature ids
    pub feature_ids: Option<BTreeSet<FeatureId>>,
    /// Points closer than this are merged (metres for geographic sources)
    pub duplicate_tolerance: f64,
    pub method: Option<ClassifyMethod>,
    pub params: ClassifyParams,
    pub classify_type: ClassifyType,
    pub extend: ExtendOption,
    /// Contour gridded data on its grid rather than a triangulation
    pub use_grid: bool,
    /// Grid detection tolerance as a fraction of point spacing
    pub grid_tolerance: f64,
    pub labels: LabelFormat,
    pub origin: LocalOrigin,
    pub triangulation: TriangulationConfig,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            expression: String::new(),
            field_name: None,
            feature_ids: None,
            duplicate_tolerance: 0.0,
            method: None,
            params: ClassifyParams::default(),
            classify_type: ClassifyType::default(),
            extend: ExtendOption::default(),
            use_grid: true,
            grid_tolerance: DEFAULT_GRID_TOLERANCE,
            labels: LabelFormat::default(),
            origin: LocalOrigin::default(),
            triangulation: TriangulationConfig::default(),
        }
    }
}

/// Offset subtracted from coordinates while contouring and added back to output.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalOrigin {
    /// Work in source coordinates
    #[default]
    None,
    /// Use the minimum corner of the data bounding box
    Auto,
    Fixed { x: f64, y: f64 },
}

/// Where triangulation runs.
///
/// Defaults to [`TriangulationMode::Worker`] when `CLASSIFY_TRIG_WORKER` names a
/// worker executable and to [`TriangulationMode::InProcess`] otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriangulationMode {
    InProcess,
    /// Separate `trig-worker` process
    Worker,
}

impl TriangulationMode {
    /// Mode implied by the value of `CLASSIFY_TRIG_WORKER`.
    pub fn from_worker_env(value: Option<&OsStr>) -> Self {
        match value {
            Some(path) if !path.is_empty() => TriangulationMode::Worker,
            _ => TriangulationMode::InProcess,
        }
    }
}

impl Default for TriangulationMode {
    fn default() -> Self {
        Self::from_worker_env(std::env::var_os(TRIG_WORKER_ENV).as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriangulationConfig {
    pub mode: TriangulationMode,
    /// Worker executable; falls back to `CLASSIFY_TRIG_WORKER`, then the PATH
    pub worker_path: Option<PathBuf>,
    /// Hull triangles flatter than this inscribed/circumscribed ratio are masked
    pub min_circle_ratio: f64,
}

impl Default for TriangulationConfig {
    fn default() -> Self {
        Self {
            mode: TriangulationMode::default(),
            worker_path: None,
            min_circle_ratio: DEFAULT_MIN_CIRCLE_RATIO,
        }
    }
}

impl TriangulationConfig {
    /// Triangulator for the configured mode.
    pub fn triangulator(&self) -> Box<dyn Triangulator + Send + Sync> {
        match self.mode {
            TriangulationMode::InProcess => Box::new(SpadeTriangulator),
            TriangulationMode::Worker => match &self.worker_path {
                Some(path) => Box::new(WorkerTriangulator::new(path)),
                None => Box::new(WorkerTriangulator::from_env()),
            },
        }
    }
}
