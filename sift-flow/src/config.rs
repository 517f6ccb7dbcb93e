use crate::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Largest accepted search radius, in pixels.
///
/// A radius `w` means `(2w + 1)^2` candidate displacements per pixel.
pub const MAX_WINDOW_SIZE: i64 = 64;

/// The nine solver parameters exactly as a host supplies them.
///
/// Counts are signed so that a negative value coming from a loosely typed
/// host can be reported instead of wrapping around. A record is always read
/// as a whole: either every field comes from the caller or the
/// [`Default`] record is used.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(deny_unknown_fields))]
pub struct ParameterRecord {
    /// Smoothness weight per pixel of displacement difference.
    pub alpha: f64,
    /// Truncation threshold of the data and smoothness penalties.
    pub d: f64,
    /// Weight of the small displacement term.
    pub gamma: f64,
    /// Number of pyramid levels.
    pub nlevels: i64,
    /// Search radius at the coarsest level.
    pub topwsize: i64,
    /// Search radius at every finer level.
    pub wsize: i64,
    /// Message passing sweeps at the coarsest level.
    #[cfg_attr(feature = "serde", serde(rename = "nTopIterations"))]
    pub n_top_iterations: i64,
    /// Message passing sweeps at every finer level.
    #[cfg_attr(feature = "serde", serde(rename = "nIterations"))]
    pub n_iterations: i64,
    /// Number of merged coarse graphs solved before each level's own graph.
    #[cfg_attr(feature = "serde", serde(rename = "nHierarchy"))]
    pub n_hierarchy: i64,
}

impl Default for ParameterRecord {
    fn default() -> Self {
        Self {
            alpha: 0.01,
            d: 1.0,
            gamma: 0.001,
            nlevels: 4,
            topwsize: 10,
            wsize: 5,
            n_top_iterations: 60,
            n_iterations: 40,
            n_hierarchy: 2,
        }
    }
}

/// Validated, immutable solver configuration.
///
/// The only ways to obtain one are [`Parameters::from_record`],
/// [`Parameters::resolve`] and [`Default`], so every instance in circulation
/// has passed validation.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Parameters {
    alpha: f32,
    d: f32,
    gamma: f32,
    nlevels: usize,
    topwsize: usize,
    wsize: usize,
    n_top_iterations: usize,
    n_iterations: usize,
    n_hierarchy: usize,
}

impl Parameters {
    /// Validate every field of `record` and freeze the result.
    pub fn from_record(record: ParameterRecord) -> Result<Self> {
        Ok(Self {
            alpha: non_negative("alpha", record.alpha)?,
            d: positive("d", record.d)?,
            gamma: non_negative("gamma", record.gamma)?,
            nlevels: count("nlevels", record.nlevels, 1, None)?,
            topwsize: count("topwsize", record.topwsize, 1, Some(MAX_WINDOW_SIZE))?,
            wsize: count("wsize", record.wsize, 1, Some(MAX_WINDOW_SIZE))?,
            n_top_iterations: count("nTopIterations", record.n_top_iterations, 0, None)?,
            n_iterations: count("nIterations", record.n_iterations, 0, None)?,
            n_hierarchy: count("nHierarchy", record.n_hierarchy, 0, None)?,
        })
    }

    /// All-or-nothing override: `None` gives the defaults, `Some` is read
    /// completely from the supplied record.
    pub fn resolve(record: Option<ParameterRecord>) -> Result<Self> {
        Self::from_record(record.unwrap_or_default())
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn d(&self) -> f32 {
        self.d
    }

    pub fn gamma(&self) -> f32 {
        self.gamma
    }

    pub fn nlevels(&self) -> usize {
        self.nlevels
    }

    pub fn topwsize(&self) -> usize {
        self.topwsize
    }

    pub fn wsize(&self) -> usize {
        self.wsize
    }

    pub fn n_top_iterations(&self) -> usize {
        self.n_top_iterations
    }

    pub fn n_iterations(&self) -> usize {
        self.n_iterations
    }

    pub fn n_hierarchy(&self) -> usize {
        self.n_hierarchy
    }

    /// The record that reproduces this configuration.
    pub fn to_record(&self) -> ParameterRecord {
        ParameterRecord {
            alpha: f64::from(self.alpha),
            d: f64::from(self.d),
            gamma: f64::from(self.gamma),
            nlevels: self.nlevels as i64,
            topwsize: self.topwsize as i64,
            wsize: self.wsize as i64,
            n_top_iterations: self.n_top_iterations as i64,
            n_iterations: self.n_iterations as i64,
            n_hierarchy: self.n_hierarchy as i64,
        }
    }
}

impl Default for Parameters {
    fn default() -> Self {
        let record = ParameterRecord::default();
        Self {
            alpha: record.alpha as f32,
            d: record.d as f32,
            gamma: record.gamma as f32,
            nlevels: record.nlevels as usize,
            topwsize: record.topwsize as usize,
            wsize: record.wsize as usize,
            n_top_iterations: record.n_top_iterations as usize,
            n_iterations: record.n_iterations as usize,
            n_hierarchy: record.n_hierarchy as usize,
        }
    }
}

pub(crate) fn non_negative(name: &'static str, value: f64) -> Result<f32> {
    if !value.is_finite() || value < 0.0 {
        return Err(Error::invalid(name, format!("{value} is not a finite value >= 0")));
    }
    Ok(value as f32)
}

pub(crate) fn positive(name: &'static str, value: f64) -> Result<f32> {
    if !value.is_finite() || value <= 0.0 {
        return Err(Error::invalid(name, format!("{value} is not a finite value > 0")));
    }
    Ok(value as f32)
}

fn count(name: &'static str, value: i64, min: i64, max: Option<i64>) -> Result<usize> {
    if value < min {
        return Err(Error::invalid(name, format!("{value} is below the minimum of {min}")));
    }
    if let Some(max) = max {
        if value > max {
            return Err(Error::invalid(name, format!("{value} exceeds the maximum of {max}")));
        }
    }
    usize::try_from(value).map_err(|_| Error::invalid(name, format!("{value} does not fit in usize")))
}
