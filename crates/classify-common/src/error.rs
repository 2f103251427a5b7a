//! Error types for the classification engine.

use thiserror::Error;

/// Result type alias using ClassifyError.
pub type ClassifyResult<T> = Result<T, ClassifyError>;

/// The three broad kinds of failure the engine reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input data or configuration supplied by the user.
    UserData,
    /// Invalid classification method parameters.
    Classification,
    /// Unexpected failure in the triangulation/extraction numerical step.
    Generation,
}

/// Primary error type for classification operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClassifyError {
    // === User Data Errors ===
    #[error("Cannot parse {0}")]
    ExpressionParse(String),

    #[error("Cannot evaluate value {0}")]
    ExpressionPrepare(String),

    #[error("Z value {0} is not number")]
    NotNumber(String),

    #[error("Invalid geometry type for classifying - must be point geometry (found {0})")]
    InvalidGeometry(String),

    #[error("Too few points to classify ({count} found, at least 3 required)")]
    TooFewPoints { count: usize },

    #[error("Cancelled by user")]
    Cancelled,

    #[error("Invalid classify type {0}")]
    InvalidClassifyType(String),

    #[error("Invalid filled classify extend option {0}")]
    InvalidExtendOption(String),

    #[error("Invalid classifying method {0}")]
    UnknownMethod(String),

    #[error("Classify data not defined")]
    DataNotDefined,

    #[error("Classifying method not defined")]
    MethodNotDefined,

    // === Classification Method Errors ===
    #[error("Parameter {param} missing in {method}")]
    MissingParameter { method: String, param: String },

    #[error("Invalid value for parameter '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error("Number of levels ({count}) exceeds maximum allowed ({max})")]
    TooManyLevels { count: usize, max: usize },

    #[error("Cannot calculate levels: {0}")]
    DegenerateData(String),

    #[error("Levels are not strictly increasing: {0}")]
    NonMonotonicLevels(String),

    // === Generation Errors ===
    #[error("Classify generation failed: {0}")]
    Generation(String),

    #[error("Triangulation worker failed: {0}")]
    Worker(String),
}

impl ClassifyError {
    /// Get the error kind for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClassifyError::MissingParameter { .. }
            | ClassifyError::InvalidParameter { .. }
            | ClassifyError::TooManyLevels { .. }
            | ClassifyError::DegenerateData(_)
            | ClassifyError::NonMonotonicLevels(_) => ErrorKind::Classification,

            ClassifyError::Generation(_) | ClassifyError::Worker(_) => ErrorKind::Generation,

            _ => ErrorKind::UserData,
        }
    }

    pub fn is_user_data(&self) -> bool {
        self.kind() == ErrorKind::UserData
    }

    pub fn is_classification(&self) -> bool {
        self.kind() == ErrorKind::Classification
    }

    pub fn is_generation(&self) -> bool {
        self.kind() == ErrorKind::Generation
    }

    /// Wrap an arbitrary failure message from a numerical step.
    pub fn generation(message: impl std::fmt::Display) -> Self {
        ClassifyError::Generation(message.to_string())
    }

    pub fn invalid_parameter(param: &str, message: impl Into<String>) -> Self {
        ClassifyError::InvalidParameter {
            param: param.to_string(),
            message: message.into(),
        }
    }
}

// Conversions only arise at the worker process boundary.
impl From<std::io::Error> for ClassifyError {
    fn from(err: std::io::Error) -> Self {
        ClassifyError::Worker(err.to_string())
    }
}

impl From<serde_json::Error> for ClassifyError {
    fn from(err: serde_json::Error) -> Self {
        ClassifyError::Worker(format!("JSON error: {}", err))
    }
}
