use crate::config::{non_negative, positive};
use crate::derivatives::gradients;
use crate::image::{gaussian_blur, GrayFloatImage};
use crate::{Error, Result, ScaleMap};
use log::*;
use ndarray::{Array2, ArrayView3};
use std::f32::consts::PI;

#[cfg(feature = "rayon")]
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Orientation bins per cell.
const ORIENTATIONS: usize = 8;
/// Cells along each side of the descriptor grid.
const CELLS: usize = 4;
/// Length of every descriptor in a [`DescriptorField`].
pub const DESCRIPTOR_LEN: usize = CELLS * CELLS * ORIENTATIONS;
/// Normalized bins are clipped to this before renormalizing.
const CLIP: f32 = 0.2;
/// Descriptors with a smaller norm are left at zero.
const MIN_NORM: f32 = 1e-6;

#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DescriptorConfig {
    /// Side of one spatial cell at scale 1, in pixels.
    pub base_cell_size: f32,
    /// Upper bound on the side of a cell whatever the scale.
    pub max_cell_size: usize,
    /// Gaussian applied before taking gradients; 0 disables it.
    pub presmooth_sigma: f32,
}

impl Default for DescriptorConfig {
    fn default() -> Self {
        Self {
            base_cell_size: 3.0,
            max_cell_size: 8,
            presmooth_sigma: 0.8,
        }
    }
}

/// A dense grid of SIFT descriptors, one per pixel, stored contiguously.
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorField {
    width: usize,
    height: usize,
    values: Vec<f32>,
}

impl DescriptorField {
    /// Wrap `width * height * DESCRIPTOR_LEN` values laid out row by row.
    pub fn from_raw(width: usize, height: usize, values: Vec<f32>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::EmptyImage);
        }
        let expected = width * height * DESCRIPTOR_LEN;
        if values.len() != expected {
            return Err(Error::BufferSize {
                expected,
                actual: values.len(),
            });
        }
        Ok(Self {
            width,
            height,
            values,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// The descriptor of pixel `(x, y)`.
    pub fn descriptor(&self, x: usize, y: usize) -> &[f32] {
        let start = (y * self.width + x) * DESCRIPTOR_LEN;
        &self.values[start..start + DESCRIPTOR_LEN]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    /// View as `(height, width, DESCRIPTOR_LEN)`.
    pub fn as_array(&self) -> ArrayView3<f32> {
        ArrayView3::from_shape((self.height, self.width, DESCRIPTOR_LEN), &self.values)
            .expect("field holds width * height descriptors")
    }
}

/// Builds a [`DescriptorField`] whose per-pixel support follows a [`ScaleMap`].
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct DescriptorFieldBuilder {
    config: DescriptorConfig,
}

impl DescriptorFieldBuilder {
    pub fn new(config: DescriptorConfig) -> Result<Self> {
        positive("base_cell_size", f64::from(config.base_cell_size))?;
        non_negative("presmooth_sigma", f64::from(config.presmooth_sigma))?;
        if config.max_cell_size == 0 {
            return Err(Error::invalid("max_cell_size", "must be at least 1"));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &DescriptorConfig {
        &self.config
    }

    /// Side of a cell at `scale`, in `1..=max_cell_size`.
    fn cell_size(&self, scale: f32) -> usize {
        let size = (self.config.base_cell_size * scale).round();
        if size.is_finite() && size >= 1.0 {
            (size as usize).min(self.config.max_cell_size)
        } else {
            1
        }
    }

    /// Compute the descriptor of every pixel of `image`, sizing the cells by
    /// `scale_map`.
    pub fn build(&self, image: &GrayFloatImage, scale_map: &ScaleMap) -> Result<DescriptorField> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(Error::EmptyImage);
        }
        let (map_height, map_width) = scale_map.dim();
        if (map_width, map_height) != (width, height) {
            return Err(Error::InputDimensionMismatch {
                first: (width, height),
                second: (map_width, map_height),
            });
        }

        trace!("Presmoothing with sigma {}", self.config.presmooth_sigma);
        let smoothed = gaussian_blur(image, self.config.presmooth_sigma);
        let (lx, ly) = gradients(&smoothed);
        let planes = orientation_planes(&lx, &ly);
        let pad = 2 * self.config.max_cell_size;
        let tables: Vec<SummedArea> = planes
            .iter()
            .map(|plane| SummedArea::padded(plane, pad))
            .collect();
        trace!("Built {} summed-area tables", tables.len());

        let mut values = vec![0f32; width * height * DESCRIPTOR_LEN];
        let row_len = width * DESCRIPTOR_LEN;
        let fill_row = |(y, row): (usize, &mut [f32])| {
            for (x, descriptor) in row.chunks_exact_mut(DESCRIPTOR_LEN).enumerate() {
                let cell = self.cell_size(scale_map[(y, x)]);
                describe(&tables, x, y, cell, descriptor);
            }
        };
        #[cfg(not(feature = "rayon"))]
        values.chunks_mut(row_len).enumerate().for_each(fill_row);
        #[cfg(feature = "rayon")]
        values.par_chunks_mut(row_len).enumerate().for_each(fill_row);

        debug!("Built a {} x {} descriptor field", width, height);
        DescriptorField::from_raw(width, height, values)
    }
}

/// Split gradient magnitude between the two orientation bins nearest to the
/// gradient angle.
fn orientation_planes(lx: &GrayFloatImage, ly: &GrayFloatImage) -> Vec<Array2<f32>> {
    let (width, height) = lx.dimensions();
    let mut planes = vec![Array2::<f32>::zeros((height, width)); ORIENTATIONS];
    let bin_width = 2.0 * PI / ORIENTATIONS as f32;
    for y in 0..height {
        for x in 0..width {
            let (gx, gy) = (lx.get(x, y), ly.get(x, y));
            let magnitude = (gx * gx + gy * gy).sqrt();
            if magnitude == 0.0 {
                continue;
            }
            let angle = gy.atan2(gx).rem_euclid(2.0 * PI);
            let bin = angle / bin_width;
            let lower = bin.floor();
            let frac = bin - lower;
            let b0 = lower as usize % ORIENTATIONS;
            let b1 = (b0 + 1) % ORIENTATIONS;
            planes[b0][(y, x)] += magnitude * (1.0 - frac);
            planes[b1][(y, x)] += magnitude * frac;
        }
    }
    planes
}

/// Summed-area table of a plane extended by `pad` replicated pixels on every
/// side, so rectangles reaching up to `pad` pixels outside the plane can be
/// summed.
struct SummedArea {
    table: Array2<f64>,
    pad: isize,
}

impl SummedArea {
    fn padded(plane: &Array2<f32>, pad: usize) -> Self {
        let (height, width) = plane.dim();
        let mut table = Array2::<f64>::zeros((height + 2 * pad + 1, width + 2 * pad + 1));
        for py in 0..height + 2 * pad {
            let sy = py.saturating_sub(pad).min(height - 1);
            let mut row_sum = 0f64;
            for px in 0..width + 2 * pad {
                let sx = px.saturating_sub(pad).min(width - 1);
                row_sum += f64::from(plane[(sy, sx)]);
                table[(py + 1, px + 1)] = table[(py, px + 1)] + row_sum;
            }
        }
        Self {
            table,
            pad: pad as isize,
        }
    }

    /// Sum over `[x0, x1) x [y0, y1)` in unpadded coordinates.
    fn sum(&self, x0: isize, y0: isize, x1: isize, y1: isize) -> f64 {
        let index = |v: isize| (v + self.pad) as usize;
        let (x0, y0, x1, y1) = (index(x0), index(y0), index(x1), index(y1));
        self.table[(y1, x1)] - self.table[(y0, x1)] - self.table[(y1, x0)]
            + self.table[(y0, x0)]
    }
}

/// Fill `out` with the normalized descriptor of pixel `(x, y)` using cells of
/// side `cell`.
fn describe(tables: &[SummedArea], x: usize, y: usize, cell: usize, out: &mut [f32]) {
    let cell = cell as isize;
    let origin_x = x as isize + 1 - 2 * cell;
    let origin_y = y as isize + 1 - 2 * cell;
    for cy in 0..CELLS as isize {
        let y0 = origin_y + cy * cell;
        for cx in 0..CELLS as isize {
            let x0 = origin_x + cx * cell;
            let base = (cy as usize * CELLS + cx as usize) * ORIENTATIONS;
            for (bin, table) in tables.iter().enumerate() {
                out[base + bin] = table.sum(x0, y0, x0 + cell, y0 + cell) as f32;
            }
        }
    }
    normalize(out);
}

/// L2 normalize, clip, renormalize. Near-zero vectors become exactly zero.
fn normalize(descriptor: &mut [f32]) {
    let norm = descriptor.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm <= MIN_NORM {
        descriptor.fill(0.0);
        return;
    }
    for v in descriptor.iter_mut() {
        *v = (*v / norm).min(CLIP);
    }
    let norm = descriptor.iter().map(|v| v * v).sum::<f32>().sqrt();
    for v in descriptor.iter_mut() {
        *v /= norm;
    }
}
