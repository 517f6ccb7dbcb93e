use crate::image::sample_bilinear;
use crate::{Error, Result};
use ndarray::{azip, Array2};

/// Per-pixel displacement from image 1 into image 2.
///
/// Pixel `(x, y)` of the first image corresponds to
/// `(x + vx[(y, x)], y + vy[(y, x)])` in the second.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowField {
    pub vx: Array2<f32>,
    pub vy: Array2<f32>,
}

impl FlowField {
    pub fn new(vx: Array2<f32>, vy: Array2<f32>) -> Result<Self> {
        if vx.dim() != vy.dim() {
            let (vx_height, vx_width) = vx.dim();
            let (vy_height, vy_width) = vy.dim();
            return Err(Error::InputDimensionMismatch {
                first: (vx_width, vx_height),
                second: (vy_width, vy_height),
            });
        }
        Ok(Self { vx, vy })
    }

    pub fn zeros(width: usize, height: usize) -> Self {
        Self {
            vx: Array2::zeros((height, width)),
            vy: Array2::zeros((height, width)),
        }
    }

    pub fn width(&self) -> usize {
        self.vx.ncols()
    }

    pub fn height(&self) -> usize {
        self.vx.nrows()
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width(), self.height())
    }

    /// `(vx, vy)` at pixel `(x, y)`.
    pub fn get(&self, x: usize, y: usize) -> (f32, f32) {
        (self.vx[(y, x)], self.vy[(y, x)])
    }

    /// Bilinearly resample to `width x height` and scale the vectors by the
    /// change in size along each axis.
    pub fn resize(&self, width: usize, height: usize) -> Self {
        let (source_width, source_height) = self.dimensions();
        let sx = width as f32 / source_width as f32;
        let sy = height as f32 / source_height as f32;
        let sample = |field: &Array2<f32>, scale: f32| {
            Array2::from_shape_fn((height, width), |(y, x)| {
                let u = (x as f32 + 0.5) / sx - 0.5;
                let v = (y as f32 + 0.5) / sy - 0.5;
                sample_bilinear(field.view(), u, v) * scale
            })
        };
        Self {
            vx: sample(&self.vx, sx),
            vy: sample(&self.vy, sy),
        }
    }

    /// Euclidean length of every vector.
    pub fn magnitude(&self) -> Array2<f32> {
        let mut out = Array2::zeros(self.vx.dim());
        azip!((out in &mut out, &u in &self.vx, &v in &self.vy) *out = (u * u + v * v).sqrt());
        out
    }

    /// `(vx, vy)` pairs in row-major pixel order.
    pub fn interleaved(&self) -> Vec<f32> {
        self.vx
            .iter()
            .zip(self.vy.iter())
            .flat_map(|(&u, &v)| [u, v])
            .collect()
    }
}
