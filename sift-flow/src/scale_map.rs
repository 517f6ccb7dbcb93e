use crate::config::{non_negative, positive};
use crate::image::{gaussian_blur, GrayFloatImage};
use crate::{Error, FeatureSet, Result};
use log::*;
use ndarray::Array2;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Per-pixel descriptor support scale, shaped `(height, width)`.
///
/// Values are finite and never negative.
pub type ScaleMap = Array2<f32>;

/// Sentinel for "no feature here" in the squared distance transform. Larger
/// than any squared distance inside an image with sides below a million pixels.
const FAR: f64 = 1e12;

/// How the distance to the nearest feature turns into a scale.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum WeightFunction {
    /// `min` at the features rising along a Gaussian profile towards `max`.
    Smooth,
    /// `min` within one feature spacing of a feature, `max` beyond it.
    HardCutoff,
}

#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScaleMapConfig {
    pub weight_function: WeightFunction,
    /// Scale at (and near) a feature.
    pub min_scale: f32,
    /// Scale far away from every feature.
    pub max_scale: f32,
    /// Uniform scale used when an image has no usable features.
    pub default_scale: f32,
    /// Sigma of the Gaussian applied to the finished map; 0 disables it.
    pub smoothing_sigma: f32,
}

impl Default for ScaleMapConfig {
    fn default() -> Self {
        Self {
            weight_function: WeightFunction::Smooth,
            min_scale: 1.0,
            max_scale: 2.0,
            default_scale: 1.0,
            smoothing_sigma: 2.0,
        }
    }
}

/// Derives a [`ScaleMap`] for an image from its sparse matched features.
///
/// Dense feature regions get small scales (fine descriptor support) and
/// regions far from any feature get large scales.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct ScaleMapEstimator {
    config: ScaleMapConfig,
}

impl ScaleMapEstimator {
    pub fn new(config: ScaleMapConfig) -> Result<Self> {
        let min_scale = positive("min_scale", f64::from(config.min_scale))?;
        let max_scale = positive("max_scale", f64::from(config.max_scale))?;
        positive("default_scale", f64::from(config.default_scale))?;
        non_negative("smoothing_sigma", f64::from(config.smoothing_sigma))?;
        if max_scale < min_scale {
            return Err(Error::invalid(
                "max_scale",
                format!("{max_scale} is below min_scale {min_scale}"),
            ));
        }
        Ok(Self { config })
    }

    /// Builder-style switch of the weighting function.
    pub fn with_weight_function(mut self, weight_function: WeightFunction) -> Self {
        self.config.weight_function = weight_function;
        self
    }

    pub fn config(&self) -> &ScaleMapConfig {
        &self.config
    }

    /// Compute the scale map of `image` given its matched `features`.
    ///
    /// Features outside the image are ignored. With no usable feature the
    /// map is uniformly `default_scale`.
    pub fn estimate(&self, image: &GrayFloatImage, features: &FeatureSet) -> ScaleMap {
        let (width, height) = image.dimensions();
        let mut seeds = Array2::from_elem((height, width), FAR);
        let mut usable = 0usize;
        for feature in features {
            match feature.pixel(width, height) {
                Some((x, y)) => {
                    // Repeated points seed one pixel and count once.
                    if seeds[(y, x)] != 0.0 {
                        seeds[(y, x)] = 0.0;
                        usable += 1;
                    }
                }
                None => warn!(
                    "Ignoring feature at ({}, {}) outside the {}x{} image",
                    feature.x, feature.y, width, height
                ),
            }
        }
        if usable == 0 {
            debug!("No usable features, using a uniform scale map");
            return Array2::from_elem((height, width), self.config.default_scale);
        }

        let squared = squared_distance_transform(seeds);
        let spacing = ((width * height) as f64 / usable as f64).sqrt();
        debug!(
            "Scale map from {} seeded pixels, spacing {:.2} px, {:?}",
            usable, spacing, self.config.weight_function
        );
        let ScaleMapConfig {
            min_scale,
            max_scale,
            ..
        } = self.config;
        let span = f64::from(max_scale - min_scale);
        let weighted = squared.mapv(|r2| {
            let t = match self.config.weight_function {
                WeightFunction::Smooth => 1.0 - (-r2 / (2.0 * spacing * spacing)).exp(),
                WeightFunction::HardCutoff => {
                    if r2 <= spacing * spacing {
                        0.0
                    } else {
                        1.0
                    }
                }
            };
            (f64::from(min_scale) + span * t) as f32
        });

        let smoothed = gaussian_blur(
            &GrayFloatImage::from_array2(weighted),
            self.config.smoothing_sigma,
        );
        smoothed.to_array2().mapv(|s| s.max(0.0))
    }
}

/// Exact squared Euclidean distance to the nearest zero of `seeds`.
///
/// Separable lower-envelope transform of Felzenszwalb and Huttenlocher,
/// applied to the columns and then the rows.
fn squared_distance_transform(mut grid: Array2<f64>) -> Array2<f64> {
    let (height, width) = grid.dim();
    let longest = width.max(height);
    let mut input = vec![0f64; longest];
    let mut output = vec![0f64; longest];
    let mut envelope = Envelope::new(longest);
    for mut column in grid.columns_mut() {
        for (dst, &src) in input.iter_mut().zip(column.iter()) {
            *dst = src;
        }
        envelope.transform(&input[..height], &mut output[..height]);
        for (dst, &src) in column.iter_mut().zip(output.iter()) {
            *dst = src;
        }
    }
    for mut row in grid.rows_mut() {
        for (dst, &src) in input.iter_mut().zip(row.iter()) {
            *dst = src;
        }
        envelope.transform(&input[..width], &mut output[..width]);
        for (dst, &src) in row.iter_mut().zip(output.iter()) {
            *dst = src;
        }
    }
    grid
}

/// Scratch space for the 1-D transform: parabola vertices and the
/// boundaries between them.
struct Envelope {
    vertices: Vec<usize>,
    boundaries: Vec<f64>,
}

impl Envelope {
    fn new(len: usize) -> Self {
        Self {
            vertices: vec![0; len],
            boundaries: vec![0.0; len + 1],
        }
    }

    fn transform(&mut self, f: &[f64], out: &mut [f64]) {
        let n = f.len();
        let v = &mut self.vertices;
        let z = &mut self.boundaries;
        let intersection = |q: usize, p: usize| {
            let (qf, pf) = (q as f64, p as f64);
            ((f[q] + qf * qf) - (f[p] + pf * pf)) / (2.0 * qf - 2.0 * pf)
        };
        let mut k = 0usize;
        v[0] = 0;
        z[0] = f64::NEG_INFINITY;
        z[1] = f64::INFINITY;
        for q in 1..n {
            let mut s = intersection(q, v[k]);
            while s <= z[k] {
                k -= 1;
                s = intersection(q, v[k]);
            }
            k += 1;
            v[k] = q;
            z[k] = s;
            z[k + 1] = f64::INFINITY;
        }
        k = 0;
        for (q, out) in out.iter_mut().enumerate().take(n) {
            while z[k + 1] < q as f64 {
                k += 1;
            }
            let offset = q as f64 - v[k] as f64;
            *out = offset * offset + f[v[k]];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::texture;
    use crate::Feature;

    fn brute_force(seeds: &[(usize, usize)], width: usize, height: usize) -> Array2<f64> {
        Array2::from_shape_fn((height, width), |(y, x)| {
            seeds
                .iter()
                .map(|&(sx, sy)| {
                    let dx = x as f64 - sx as f64;
                    let dy = y as f64 - sy as f64;
                    dx * dx + dy * dy
                })
                .fold(f64::INFINITY, f64::min)
        })
    }

    #[test]
    fn distance_transform_matches_brute_force() {
        let seeds = [(0, 0), (7, 3), (2, 8), (9, 9), (4, 4)];
        let (width, height) = (11, 10);
        let mut grid = Array2::from_elem((height, width), FAR);
        for &(x, y) in &seeds {
            grid[(y, x)] = 0.0;
        }
        let fast = squared_distance_transform(grid);
        assert_eq!(fast, brute_force(&seeds, width, height));
    }

    #[test]
    fn empty_features_give_uniform_default_scale() {
        let image = texture(13, 9, 1);
        let estimator = ScaleMapEstimator::default();
        let map = estimator.estimate(&image, &FeatureSet::default());
        assert_eq!(map.dim(), (9, 13));
        assert!(map.iter().all(|&s| s == estimator.config().default_scale));
    }

    #[test]
    fn out_of_bounds_features_fall_back_to_uniform() {
        let image = texture(8, 8, 1);
        let features = FeatureSet::new(vec![Feature::new(-5.0, 2.0), Feature::new(2.0, 40.0)]);
        let map = ScaleMapEstimator::default().estimate(&image, &features);
        assert!(map.iter().all(|&s| s == 1.0));
    }

    #[test]
    fn scale_grows_away_from_features() {
        let image = texture(40, 40, 2);
        let features = FeatureSet::new(vec![Feature::new(5.0, 5.0), Feature::new(6.0, 5.0)]);
        for weight_function in [WeightFunction::Smooth, WeightFunction::HardCutoff] {
            let estimator = ScaleMapEstimator::default().with_weight_function(weight_function);
            let map = estimator.estimate(&image, &features);
            assert_eq!(map.dim(), (40, 40));
            assert!(map.iter().all(|&s| s.is_finite() && s >= 0.0));
            assert!(map[(5, 5)] < map[(39, 39)], "{weight_function:?}");
            assert!(map.iter().all(|&s| s <= 2.0 + 1e-4));
        }
        // Beyond one feature spacing the cutoff jumps straight to the maximum.
        let hard = ScaleMapEstimator::default()
            .with_weight_function(WeightFunction::HardCutoff)
            .estimate(&image, &features);
        approx::assert_abs_diff_eq!(hard[(39, 39)], 2.0, epsilon = 1e-4);
        approx::assert_abs_diff_eq!(hard[(5, 5)], 1.0, epsilon = 1e-4);
    }

    #[test]
    fn repeated_features_count_once() {
        let image = texture(32, 32, 3);
        let unique = FeatureSet::new(vec![Feature::new(8.0, 8.0), Feature::new(24.0, 20.0)]);
        let repeated = FeatureSet::new(vec![
            Feature::new(8.0, 8.0),
            Feature::new(8.0, 8.0),
            Feature::new(8.2, 7.9),
            Feature::new(24.0, 20.0),
        ]);
        for weight_function in [WeightFunction::Smooth, WeightFunction::HardCutoff] {
            let estimator = ScaleMapEstimator::default().with_weight_function(weight_function);
            assert_eq!(
                estimator.estimate(&image, &unique),
                estimator.estimate(&image, &repeated),
                "{weight_function:?}"
            );
        }
    }

    #[test]
    fn weight_functions_differ() {
        let image = texture(32, 32, 2);
        let features: FeatureSet = (0..6)
            .map(|i| Feature::new(4.0 + 4.0 * i as f32, 10.0))
            .collect();
        let smooth = ScaleMapEstimator::default().estimate(&image, &features);
        let hard = ScaleMapEstimator::default()
            .with_weight_function(WeightFunction::HardCutoff)
            .estimate(&image, &features);
        assert_ne!(smooth, hard);
    }

    #[test]
    fn estimation_is_deterministic() {
        let image = texture(24, 17, 5);
        let features = FeatureSet::from_one_based([(3.0, 4.0), (20.0, 15.0), (11.5, 2.0)]);
        let estimator = ScaleMapEstimator::default();
        assert_eq!(
            estimator.estimate(&image, &features),
            estimator.estimate(&image, &features)
        );
    }

    #[test]
    fn rejects_inverted_scale_range() {
        let config = ScaleMapConfig {
            min_scale: 3.0,
            max_scale: 2.0,
            ..Default::default()
        };
        assert!(matches!(
            ScaleMapEstimator::new(config),
            Err(Error::InvalidParameter {
                name: "max_scale",
                ..
            })
        ));
    }
}
