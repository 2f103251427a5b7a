//! Level and range label formatting.

use serde::{Deserialize, Serialize};

/// Largest number of decimal places chosen automatically.
pub const MAX_AUTO_PRECISION: usize = 10;

/// Largest number of decimal places a formatter renders; an f64 carries no more.
pub const MAX_PRECISION: usize = 17;

/// User-facing label options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelFormat {
    /// Decimal places; negative selects a precision from the level spacing
    pub precision: i32,
    /// Render the shortest representation instead of fixed decimals
    pub trim_zeros: bool,
    /// Suffix appended to every label
    pub units: String,
}

impl Default for LabelFormat {
    fn default() -> Self {
        Self {
            precision: -1,
            trim_zeros: false,
            units: String::new(),
        }
    }
}

/// Decimal places needed to distinguish and represent `levels`.
///
/// Enough digits that the smallest gap between consecutive levels is at least
/// one unit in the last place, increased until every level is shown exactly.
pub fn default_precision(levels: &[f64]) -> usize {
    let min_gap = levels
        .windows(2)
        .map(|w| (w[1] - w[0]).abs())
        .filter(|gap| *gap > 0.0 && gap.is_finite())
        .fold(f64::INFINITY, f64::min);

    let mut decimals = 0;
    if min_gap.is_finite() {
        while decimals < MAX_AUTO_PRECISION && min_gap * 10f64.powi(decimals as i32) < 1.0 - 1e-9 {
            decimals += 1;
        }
    }
    while decimals < MAX_AUTO_PRECISION && !levels.iter().all(|&v| representable(v, decimals)) {
        decimals += 1;
    }
    decimals
}

fn representable(value: f64, decimals: usize) -> bool {
    if !value.is_finite() {
        return true;
    }
    (round_to(value, decimals) - value).abs() <= 1e-9 * value.abs().max(1.0)
}

fn round_to(value: f64, decimals: usize) -> f64 {
    let scale = 10f64.powi(decimals.min(MAX_PRECISION) as i32);
    let scaled = value * scale;
    if scaled.is_finite() {
        scaled.round() / scale
    } else {
        value
    }
}

/// Formats values and ranges with a fixed precision.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelFormatter {
    decimals: usize,
    trim_zeros: bool,
    units: String,
}

impl LabelFormatter {
    /// Decimal places above [`MAX_PRECISION`] are clamped.
    pub fn new(decimals: usize, trim_zeros: bool, units: impl Into<String>) -> Self {
        Self {
            decimals: decimals.min(MAX_PRECISION),
            trim_zeros,
            units: units.into(),
        }
    }

    /// Resolve `format` against the levels it will label.
    pub fn for_levels(format: &LabelFormat, levels: &[f64]) -> Self {
        let decimals = if format.precision >= 0 {
            format.precision as usize
        } else {
            default_precision(levels)
        };
        Self::new(decimals, format.trim_zeros, format.units.clone())
    }

    pub fn decimals(&self) -> usize {
        self.decimals
    }

    /// Format a value without units.
    pub fn format_value(&self, value: f64) -> String {
        let mut rounded = round_to(value, self.decimals);
        if rounded == 0.0 {
            rounded = 0.0;
        }
        if self.trim_zeros {
            format!("{}", rounded)
        } else {
            format!("{:.*}", self.decimals, rounded)
        }
    }

    /// Label for a single level.
    pub fn level_label(&self, value: f64) -> String {
        format!("{}{}", self.format_value(value), self.units)
    }

    /// Label for the band `[min, max)`, open ended when a bound is infinite.
    pub fn range_label(&self, min: f64, max: f64) -> String {
        if !min.is_finite() {
            format!("< {}{}", self.format_value(max), self.units)
        } else if !max.is_finite() {
            format!("> {}{}", self.format_value(min), self.units)
        } else {
            format!(
                "{} - {}{}",
                self.format_value(min),
                self.format_value(max),
                self.units
            )
        }
    }
}
