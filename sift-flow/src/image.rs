use crate::{Error, Result};
use derive_more::{Deref, DerefMut};
use image::{DynamicImage, ImageBuffer, Luma};
use log::*;
use ndarray::{azip, s, Array2, ArrayView2};
use wide::f32x4;

pub type GrayImageBuffer = ImageBuffer<Luma<f32>, Vec<f32>>;

/// A single-channel `f32` image, row-major.
///
/// This wraps the image crate's buffer so that loading, saving and pixel
/// access come for free, while the filters below work directly on the raw
/// slice. The separable filters are SIMD and clamp at the borders, which is
/// what every stage of the pipeline expects.
#[derive(Debug, Clone, PartialEq, Deref, DerefMut)]
pub struct GrayFloatImage(pub GrayImageBuffer);

impl GrayFloatImage {
    /// Wrap a row-major buffer of exactly `width * height` intensities.
    pub fn from_raw(width: usize, height: usize, data: Vec<f32>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::EmptyImage);
        }
        if data.len() != width * height {
            return Err(Error::BufferSize {
                expected: width * height,
                actual: data.len(),
            });
        }
        GrayImageBuffer::from_raw(width as u32, height as u32, data)
            .map(Self)
            .ok_or(Error::BufferSize {
                expected: width * height,
                actual: 0,
            })
    }

    /// Convert any decoded image to luminance with values between 0 and 1.
    pub fn from_dynamic(input_image: &DynamicImage) -> Self {
        let gray = input_image.to_luma32f();
        info!("Loaded a {} x {} image", gray.width(), gray.height());
        Self(gray)
    }

    pub fn from_array2(arr: Array2<f32>) -> Self {
        let (height, width) = arr.dim();
        let data = if arr.is_standard_layout() {
            arr.into_raw_vec()
        } else {
            arr.iter().copied().collect()
        };
        Self(
            ImageBuffer::from_raw(width as u32, height as u32, data)
                .expect("array shape always matches its element count"),
        )
    }

    pub fn ref_array2(&self) -> ArrayView2<f32> {
        let (width, height) = (self.width(), self.height());
        ArrayView2::from_shape((height, width), &self.0.as_raw()[..width * height])
            .expect("image buffer holds width * height pixels")
    }

    pub fn to_array2(&self) -> Array2<f32> {
        self.ref_array2().to_owned()
    }

    pub fn width(&self) -> usize {
        self.0.width() as usize
    }

    pub fn height(&self) -> usize {
        self.0.height() as usize
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width(), self.height())
    }

    pub fn new(width: usize, height: usize) -> Self {
        Self(ImageBuffer::from_pixel(
            width as u32,
            height as u32,
            Luma([0.0]),
        ))
    }

    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.0.as_raw()[y * self.width() + x]
    }

    pub fn put(&mut self, x: usize, y: usize, pixel_value: f32) {
        self.0[(x as u32, y as u32)] = Luma([pixel_value]);
    }

    /// Halve both dimensions by averaging 2x2 tiles.
    ///
    /// An odd last row or column is folded into the final output row or
    /// column. Images narrower than two pixels are averaged along their long
    /// side only.
    pub fn half_size(&self) -> Self {
        let width = (self.width() / 2).max(1);
        let height = (self.height() / 2).max(1);
        let input = self.ref_array2();
        let mut half = Array2::zeros((height, width));

        if self.width() >= 2 && self.height() >= 2 {
            azip!((
                out in &mut half,
                window in input.slice(s![..height * 2, ..width * 2]).exact_chunks((2, 2)),
            ) {
                *out = window.sum() * 0.25;
            });
        } else {
            // Degenerate strip: average whatever is there along the long side.
            for ((y, x), out) in half.indexed_iter_mut() {
                let ys = (y * 2)..((y * 2 + 2).min(self.height()));
                let xs = (x * 2)..((x * 2 + 2).min(self.width()));
                let window = input.slice(s![ys, xs]);
                *out = window.mean().unwrap_or(0.0);
            }
            return Self::from_array2(half);
        }

        // Odd height: blend the leftover row into the last output row.
        if height * 2 != self.height() {
            azip!((
                out in half.slice_mut(s![-1.., ..]),
                window in input.slice(s![-1.., ..width * 2]).exact_chunks((1, 2)),
            ) {
                *out = (*out * 2.0 + window.sum() * 0.5) / 3.0;
            });
        }

        // Odd width: same for the leftover column.
        if width * 2 != self.width() {
            azip!((
                out in half.slice_mut(s![.., -1..]),
                window in input.slice(s![..height * 2, -1..]).exact_chunks((2, 1)),
            ) {
                *out = (*out * 2.0 + window.sum() * 0.5) / 3.0;
            });
        }

        Self::from_array2(half)
    }
}

/// Pad the kernel with zeros up to a multiple of 4 lanes.
fn simd_kernel(kernel: &[f32]) -> Vec<f32x4> {
    kernel
        .chunks(4)
        .map(|chunk| {
            let mut lanes = [0f32; 4];
            lanes[..chunk.len()].copy_from_slice(chunk);
            f32x4::new(lanes)
        })
        .collect()
}

fn simd_dot(window: &[f32], kernel_simd: &[f32x4]) -> f32 {
    window
        .chunks_exact(4)
        .map(|chunk| f32x4::new([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .zip(kernel_simd.iter())
        .fold(f32x4::splat(0.), |acc, (a, b)| a.mul_add(*b, acc))
        .reduce_add()
}

/// Correlate every row with `kernel`, replicating the edge pixels.
pub fn horizontal_filter(image: &GrayFloatImage, kernel: &[f32]) -> GrayFloatImage {
    let kernel_size = kernel.len();
    debug_assert!(kernel_size % 2 == 1);
    let kernel_half_size = kernel_size / 2;
    let (width, height) = image.dimensions();
    let mut output = vec![0.0; width * height];
    let kernel_simd = simd_kernel(kernel);
    let kernel_simd_size = kernel_simd.len() * 4;
    let extra = kernel_simd_size - kernel_size;
    let mut scratch = vec![0f32; width + kernel_half_size * 2 + extra];
    for (row_in, row_out) in image
        .as_raw()
        .chunks_exact(width)
        .zip(output.chunks_exact_mut(width))
    {
        scratch[..kernel_half_size].fill(row_in[0]);
        scratch[kernel_half_size..kernel_half_size + width].copy_from_slice(row_in);
        scratch[kernel_half_size + width..2 * kernel_half_size + width].fill(row_in[width - 1]);
        scratch[2 * kernel_half_size + width..].fill(0.);
        for (window, out) in scratch.windows(kernel_simd_size).zip(row_out) {
            *out = simd_dot(window, &kernel_simd);
        }
    }
    GrayFloatImage(
        GrayImageBuffer::from_raw(width as u32, height as u32, output)
            .expect("output has width * height pixels"),
    )
}

/// Correlate every column with `kernel`, replicating the edge pixels.
pub fn vertical_filter(image: &GrayFloatImage, kernel: &[f32]) -> GrayFloatImage {
    let kernel_size = kernel.len();
    debug_assert!(kernel_size % 2 == 1);
    let kernel_half_size = kernel_size / 2;
    let (width, height) = image.dimensions();
    let mut output = vec![0.0; width * height];
    let kernel_simd = simd_kernel(kernel);
    let kernel_simd_size = kernel_simd.len() * 4;
    let extra = kernel_simd_size - kernel_size;
    // Columns are staged in blocks of one cache line (16 floats).
    const BLOCK: usize = 16;
    let column_len = height + kernel_half_size * 2 + extra;
    let mut scratch = vec![0f32; BLOCK * column_len];
    let pixels = image.as_raw();
    for x_start in (0..width).step_by(BLOCK) {
        let x_end = (x_start + BLOCK).min(width);
        for x in x_start..x_end {
            let column = &mut scratch[(x - x_start) * column_len..(x - x_start + 1) * column_len];
            column[..kernel_half_size].fill(pixels[x]);
            for y in 0..height {
                column[kernel_half_size + y] = pixels[y * width + x];
            }
            column[kernel_half_size + height..2 * kernel_half_size + height]
                .fill(pixels[(height - 1) * width + x]);
            column[2 * kernel_half_size + height..].fill(0.);
        }
        for (dx, column) in scratch
            .chunks(column_len)
            .take(x_end - x_start)
            .enumerate()
        {
            for (y, window) in column.windows(kernel_simd_size).take(height).enumerate() {
                output[y * width + x_start + dx] = simd_dot(window, &kernel_simd);
            }
        }
    }
    GrayFloatImage(
        GrayImageBuffer::from_raw(width as u32, height as u32, output)
            .expect("output has width * height pixels"),
    )
}

pub fn separable_filter(
    image: &GrayFloatImage,
    h_kernel: &[f32],
    v_kernel: &[f32],
) -> GrayFloatImage {
    vertical_filter(&horizontal_filter(image, h_kernel), v_kernel)
}

/// Normalized Gaussian kernel of odd length `kernel_size` and deviation `sigma`.
pub fn gaussian_kernel(sigma: f32, kernel_size: usize) -> Vec<f32> {
    assert!(kernel_size % 2 == 1, "kernel_size must be odd");
    let half_width = (kernel_size / 2) as i32;
    let mut kernel: Vec<f32> = (-half_width..=half_width)
        .map(|i| (-(i as f32).powi(2) / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    for val in kernel.iter_mut() {
        *val /= sum;
    }
    kernel
}

/// Gaussian blur with a kernel radius of `ceil(2 sigma)`.
///
/// A non-positive `sigma` returns the image unchanged.
pub fn gaussian_blur(image: &GrayFloatImage, sigma: f32) -> GrayFloatImage {
    if sigma <= 0.0 {
        return image.clone();
    }
    let kernel_radius = (2.0 * sigma).ceil() as usize;
    let kernel = gaussian_kernel(sigma, kernel_radius * 2 + 1);
    separable_filter(image, &kernel, &kernel)
}

/// Bilinear lookup with the coordinates clamped to the array.
pub fn sample_bilinear(values: ArrayView2<f32>, x: f32, y: f32) -> f32 {
    let (height, width) = values.dim();
    let x = x.clamp(0.0, (width - 1) as f32);
    let y = y.clamp(0.0, (height - 1) as f32);
    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;
    let top = values[(y0, x0)] * (1.0 - fx) + values[(y0, x1)] * fx;
    let bottom = values[(y1, x0)] * (1.0 - fx) + values[(y1, x1)] * fx;
    top * (1.0 - fy) + bottom * fy
}
