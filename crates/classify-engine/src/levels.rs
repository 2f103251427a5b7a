//! Level classification: derive ordered class boundaries from z values.
//!
//! Each [`ClassifyMethod`] declares which parameter keys it requires and which
//! it accepts. Keys outside that set are ignored, missing required keys fail
//! with [`ClassifyError::MissingParameter`].

use std::fmt;
use std::str::FromStr;

use classify_common::{ClassifyError, ClassifyResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::loader::value_range;

/// Upper bound on the number of generated levels.
pub const MAX_CLASSIFYS: usize = 100;

/// Default mantissas for logarithmic intervals.
pub const DEFAULT_MANTISSA: [f64; 3] = [1.0, 2.0, 5.0];

/// Parameter keys understood by the classification methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKey {
    Min,
    Max,
    Interval,
    NClassify,
    MaxClassify,
    Mantissa,
    Levels,
}

impl ParamKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKey::Min => "min",
            ParamKey::Max => "max",
            ParamKey::Interval => "interval",
            ParamKey::NClassify => "nClassify",
            ParamKey::MaxClassify => "maxClassify",
            ParamKey::Mantissa => "mantissa",
            ParamKey::Levels => "levels",
        }
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed set of classification rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifyMethod {
    Equal,
    Interval,
    Quantile,
    Log,
    Pretty,
    Manual,
}

impl ClassifyMethod {
    pub fn all() -> [ClassifyMethod; 6] {
        [
            ClassifyMethod::Equal,
            ClassifyMethod::Interval,
            ClassifyMethod::Quantile,
            ClassifyMethod::Log,
            ClassifyMethod::Pretty,
            ClassifyMethod::Manual,
        ]
    }

    pub fn id(&self) -> &'static str {
        match self {
            ClassifyMethod::Equal => "equal",
            ClassifyMethod::Interval => "interval",
            ClassifyMethod::Quantile => "quantile",
            ClassifyMethod::Log => "log",
            ClassifyMethod::Pretty => "pretty",
            ClassifyMethod::Manual => "manual",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClassifyMethod::Equal => "N equal intervals",
            ClassifyMethod::Interval => "Fixed classify interval",
            ClassifyMethod::Quantile => "N quantiles",
            ClassifyMethod::Log => "Logarithmic intervals",
            ClassifyMethod::Pretty => "Pretty intervals",
            ClassifyMethod::Manual => "User selected levels",
        }
    }

    pub fn required(&self) -> &'static [ParamKey] {
        match self {
            ClassifyMethod::Equal | ClassifyMethod::Quantile | ClassifyMethod::Pretty => {
                &[ParamKey::NClassify]
            }
            ClassifyMethod::Interval => &[ParamKey::Interval],
            ClassifyMethod::Log => &[],
            ClassifyMethod::Manual => &[ParamKey::Levels],
        }
    }

    pub fn optional(&self) -> &'static [ParamKey] {
        match self {
            ClassifyMethod::Equal | ClassifyMethod::Quantile => &[ParamKey::Min, ParamKey::Max],
            ClassifyMethod::Interval | ClassifyMethod::Pretty => {
                &[ParamKey::Min, ParamKey::Max, ParamKey::MaxClassify]
            }
            ClassifyMethod::Log => &[
                ParamKey::Min,
                ParamKey::Max,
                ParamKey::Mantissa,
                ParamKey::MaxClassify,
            ],
            ClassifyMethod::Manual => &[],
        }
    }

    pub fn accepts(&self, key: ParamKey) -> bool {
        self.required().contains(&key) || self.optional().contains(&key)
    }
}

impl FromStr for ClassifyMethod {
    type Err = ClassifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClassifyMethod::all()
            .into_iter()
            .find(|m| m.id().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ClassifyError::UnknownMethod(s.to_string()))
    }
}

impl fmt::Display for ClassifyMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// A list of values given either as numbers or as a separated string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LevelList {
    Values(Vec<f64>),
    Text(String),
}

impl LevelList {
    /// Parse the values; `param` names the parameter in error messages.
    pub fn values(&self, param: &str) -> ClassifyResult<Vec<f64>> {
        let values = match self {
            LevelList::Values(values) => values.clone(),
            LevelList::Text(text) => text
                .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<f64>().map_err(|_| {
                        ClassifyError::invalid_parameter(param, format!("'{}' is not a number", s))
                    })
                })
                .collect::<ClassifyResult<Vec<_>>>()?,
        };
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(ClassifyError::invalid_parameter(
                param,
                format!("{} is not a finite number", bad),
            ));
        }
        Ok(values)
    }
}

impl From<Vec<f64>> for LevelList {
    fn from(values: Vec<f64>) -> Self {
        LevelList::Values(values)
    }
}

impl From<&str> for LevelList {
    fn from(text: &str) -> Self {
        LevelList::Text(text.to_string())
    }
}

/// Parameter set for a classification method. Unset keys are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClassifyParams {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub interval: Option<f64>,
    pub n_classify: Option<usize>,
    pub max_classify: Option<usize>,
    pub mantissa: Option<LevelList>,
    pub levels: Option<LevelList>,
}

impl ClassifyParams {
    pub fn has(&self, key: ParamKey) -> bool {
        match key {
            ParamKey::Min => self.min.is_some(),
            ParamKey::Max => self.max.is_some(),
            ParamKey::Interval => self.interval.is_some(),
            ParamKey::NClassify => self.n_classify.is_some(),
            ParamKey::MaxClassify => self.max_classify.is_some(),
            ParamKey::Mantissa => self.mantissa.is_some(),
            ParamKey::Levels => self.levels.is_some(),
        }
    }

    /// Copy holding only the keys `method` declares.
    pub fn restricted_to(&self, method: ClassifyMethod) -> ClassifyParams {
        ClassifyParams {
            min: self.min.filter(|_| method.accepts(ParamKey::Min)),
            max: self.max.filter(|_| method.accepts(ParamKey::Max)),
            interval: self.interval.filter(|_| method.accepts(ParamKey::Interval)),
            n_classify: self.n_classify.filter(|_| method.accepts(ParamKey::NClassify)),
            max_classify: self
                .max_classify
                .filter(|_| method.accepts(ParamKey::MaxClassify)),
            mantissa: self
                .mantissa
                .clone()
                .filter(|_| method.accepts(ParamKey::Mantissa)),
            levels: self.levels.clone().filter(|_| method.accepts(ParamKey::Levels)),
        }
    }
}

/// Compute strictly increasing class boundaries for `z`.
pub fn calculate_levels(
    z: &[f64],
    method: ClassifyMethod,
    params: &ClassifyParams,
) -> ClassifyResult<Vec<f64>> {
    if z.is_empty() {
        return Err(ClassifyError::DataNotDefined);
    }
    for &key in method.required() {
        if !params.has(key) {
            return Err(ClassifyError::MissingParameter {
                method: method.name().to_string(),
                param: key.to_string(),
            });
        }
    }
    let params = params.restricted_to(method);
    let bounds = || Bounds::resolve(z, &params);

    let levels = match method {
        ClassifyMethod::Manual => {
            let mut levels = params
                .levels
                .as_ref()
                .map(|l| l.values(ParamKey::Levels.as_str()))
                .transpose()?
                .unwrap_or_default();
            levels.sort_by(f64::total_cmp);
            levels.dedup();
            levels
        }
        ClassifyMethod::Equal => {
            let Bounds { min, max, limit } = bounds()?;
            let n = n_classify(&params)?;
            require_range(min, max)?;
            check_count(n.saturating_add(1), limit)?;
            (0..=n)
                .map(|i| if i == n { max } else { min + (max - min) * i as f64 / n as f64 })
                .collect()
        }
        ClassifyMethod::Interval => {
            let Bounds { min, max, limit } = bounds()?;
            let interval = params.interval.unwrap_or_default();
            if !(interval > 0.0 && interval.is_finite()) {
                return Err(ClassifyError::invalid_parameter(
                    "interval",
                    "must be a positive number",
                ));
            }
            stepped(min, max, interval, limit)?
        }
        ClassifyMethod::Quantile => {
            let Bounds { min, max, limit } = bounds()?;
            let n = n_classify(&params)?;
            require_range(min, max)?;
            check_count(n.saturating_add(1), limit)?;
            quantiles(z, min, max, n)?
        }
        ClassifyMethod::Log => {
            let Bounds { min, max, limit } = bounds()?;
            let mantissa = match &params.mantissa {
                Some(list) => list.values(ParamKey::Mantissa.as_str())?,
                None => DEFAULT_MANTISSA.to_vec(),
            };
            logarithmic(z, min, max, &mantissa, limit)?
        }
        ClassifyMethod::Pretty => {
            let Bounds { min, max, limit } = bounds()?;
            let n = n_classify(&params)?;
            require_range(min, max)?;
            stepped(min, max, pretty_step((max - min) / n as f64), limit)?
        }
    };

    ensure_increasing(&levels)?;
    debug!(method = method.id(), count = levels.len(), "Calculated levels");
    Ok(levels)
}

/// Value range and level limit for the generating methods.
struct Bounds {
    min: f64,
    max: f64,
    limit: usize,
}

impl Bounds {
    fn resolve(z: &[f64], params: &ClassifyParams) -> ClassifyResult<Self> {
        let (zmin, zmax) = value_range(z);
        let min = params.min.unwrap_or(zmin);
        let max = params.max.unwrap_or(zmax);
        if !min.is_finite() || !max.is_finite() {
            return Err(ClassifyError::invalid_parameter("min", "range bounds must be finite"));
        }
        if min > max {
            return Err(ClassifyError::invalid_parameter(
                "min",
                format!("minimum {} is greater than maximum {}", min, max),
            ));
        }
        let limit = params.max_classify.unwrap_or(MAX_CLASSIFYS);
        if limit < 1 {
            return Err(ClassifyError::invalid_parameter("maxClassify", "must be at least 1"));
        }
        Ok(Self { min, max, limit })
    }
}

fn n_classify(params: &ClassifyParams) -> ClassifyResult<usize> {
    match params.n_classify {
        Some(n) if n >= 1 => Ok(n),
        _ => Err(ClassifyError::invalid_parameter("nClassify", "must be at least 1")),
    }
}

fn require_range(min: f64, max: f64) -> ClassifyResult<()> {
    if max > min {
        Ok(())
    } else {
        Err(ClassifyError::DegenerateData(format!(
            "all values equal {} so there is no range to divide",
            min
        )))
    }
}

fn check_count(count: usize, limit: usize) -> ClassifyResult<()> {
    if count > limit {
        Err(ClassifyError::TooManyLevels { count, max: limit })
    } else {
        Ok(())
    }
}

/// Multiples of `step` covering `[min, max]`.
fn stepped(min: f64, max: f64, step: f64, limit: usize) -> ClassifyResult<Vec<f64>> {
    let first = (min / step).floor();
    let last = (max / step).ceil();
    let count = last - first + 1.0;
    if !count.is_finite() || count > limit as f64 {
        return Err(ClassifyError::TooManyLevels {
            count: if count.is_finite() { count as usize } else { usize::MAX },
            max: limit,
        });
    }
    let first = first as i64;
    let last = last as i64;
    Ok((first..=last).map(|k| k as f64 * step).collect())
}

/// Step of the form 1, 2, 2.5 or 5 times a power of ten closest to `raw`.
pub fn pretty_step(raw: f64) -> f64 {
    let magnitude = 10f64.powf(raw.log10().floor());
    [1.0, 2.0, 2.5, 5.0, 10.0]
        .iter()
        .map(|m| m * magnitude)
        .min_by(|a, b| (a - raw).abs().total_cmp(&(b - raw).abs()))
        .unwrap_or(magnitude)
}

/// Linearly interpolated quantiles of the values within `[min, max]`.
fn quantiles(z: &[f64], min: f64, max: f64, n: usize) -> ClassifyResult<Vec<f64>> {
    let mut values: Vec<f64> = z.iter().copied().filter(|v| *v >= min && *v <= max).collect();
    if values.is_empty() {
        return Err(ClassifyError::DegenerateData(format!(
            "no values between {} and {}",
            min, max
        )));
    }
    values.sort_by(f64::total_cmp);
    let last = values.len() - 1;
    let mut levels: Vec<f64> = (0..=n)
        .map(|k| {
            let pos = last as f64 * k as f64 / n as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            let frac = pos - lo as f64;
            values[lo] + (values[hi] - values[lo]) * frac
        })
        .collect();
    levels.dedup();
    if levels.len() < 2 {
        return Err(ClassifyError::DegenerateData(
            "quantiles collapse to a single value".to_string(),
        ));
    }
    Ok(levels)
}

/// Values `m * 10^e` for each mantissa `m` that fall within the positive part of `[min, max]`.
fn logarithmic(
    z: &[f64],
    min: f64,
    max: f64,
    mantissa: &[f64],
    limit: usize,
) -> ClassifyResult<Vec<f64>> {
    if let Some(bad) = mantissa.iter().find(|m| **m <= 0.0) {
        return Err(ClassifyError::invalid_parameter(
            "mantissa",
            format!("{} is not positive", bad),
        ));
    }
    if mantissa.is_empty() {
        return Err(ClassifyError::invalid_parameter("mantissa", "no values given"));
    }
    let lower = if min > 0.0 {
        min
    } else {
        z.iter()
            .copied()
            .filter(|v| *v > 0.0 && *v <= max)
            .fold(f64::INFINITY, f64::min)
    };
    if max <= 0.0 || !lower.is_finite() {
        return Err(ClassifyError::DegenerateData(
            "logarithmic intervals require positive values".to_string(),
        ));
    }

    let e_lo = lower.log10().floor() as i32 - 1;
    let e_hi = max.log10().ceil() as i32 + 1;
    let mut levels = Vec::new();
    for e in e_lo..=e_hi {
        for &m in mantissa {
            let v = if e < 0 {
                m / 10f64.powi(-e)
            } else {
                m * 10f64.powi(e)
            };
            if v >= lower && v <= max {
                levels.push(v);
            }
        }
    }
    levels.sort_by(f64::total_cmp);
    levels.dedup();
    if levels.is_empty() {
        return Err(ClassifyError::DegenerateData(format!(
            "no logarithmic levels between {} and {}",
            lower, max
        )));
    }
    check_count(levels.len(), limit)?;
    Ok(levels)
}

fn ensure_increasing(levels: &[f64]) -> ClassifyResult<()> {
    match levels.windows(2).find(|w| !(w[1] > w[0])) {
        Some(w) => Err(ClassifyError::NonMonotonicLevels(format!(
            "{} is followed by {}",
            w[0], w[1]
        ))),
        None => Ok(()),
    }
}
