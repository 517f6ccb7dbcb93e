use crate::descriptor::{DescriptorField, DESCRIPTOR_LEN};
use crate::image::{gaussian_blur, GrayFloatImage};
use crate::Result;
use log::*;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Sigma of the anti-aliasing blur applied to every channel before halving.
const LEVEL_SIGMA: f32 = 1.0;
/// A level is only added if both of its sides are at least this long.
const MIN_LEVEL_SIDE: usize = 4;

/// Successively halved copies of a descriptor field, finest level first.
#[derive(Debug, Clone)]
pub struct DescriptorPyramid {
    levels: Vec<DescriptorField>,
}

impl DescriptorPyramid {
    /// Build up to `nlevels` levels, starting with `field` itself.
    ///
    /// Fewer levels are produced when the next one would drop below
    /// `MIN_LEVEL_SIDE` pixels on a side.
    pub fn build(field: &DescriptorField, nlevels: usize) -> Result<Self> {
        let mut levels = vec![field.clone()];
        while levels.len() < nlevels {
            let previous = &levels[levels.len() - 1];
            let (width, height) = previous.dimensions();
            if width / 2 < MIN_LEVEL_SIDE || height / 2 < MIN_LEVEL_SIDE {
                debug!(
                    "Stopping the pyramid at {} of {} levels, {} x {} is the smallest",
                    levels.len(),
                    nlevels,
                    width,
                    height
                );
                break;
            }
            let next = reduce(previous)?;
            trace!(
                "Pyramid level {} is {} x {}",
                levels.len(),
                next.width(),
                next.height()
            );
            levels.push(next);
        }
        Ok(Self { levels })
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Level `index`, where 0 is the full resolution field.
    pub fn level(&self, index: usize) -> &DescriptorField {
        &self.levels[index]
    }

    pub fn levels(&self) -> &[DescriptorField] {
        &self.levels
    }
}

/// Blur and halve every channel of `field` independently.
fn reduce(field: &DescriptorField) -> Result<DescriptorField> {
    let array = field.as_array();
    let reduce_channel = |channel: usize| {
        let plane = array.index_axis(ndarray::Axis(2), channel).to_owned();
        gaussian_blur(&GrayFloatImage::from_array2(plane), LEVEL_SIGMA).half_size()
    };
    #[cfg(not(feature = "rayon"))]
    let channels: Vec<GrayFloatImage> = (0..DESCRIPTOR_LEN).map(reduce_channel).collect();
    #[cfg(feature = "rayon")]
    let channels: Vec<GrayFloatImage> = (0..DESCRIPTOR_LEN)
        .into_par_iter()
        .map(reduce_channel)
        .collect();

    let (width, height) = channels[0].dimensions();
    let mut values = vec![0f32; width * height * DESCRIPTOR_LEN];
    for (channel, plane) in channels.iter().enumerate() {
        for (pixel, &value) in plane.as_raw().iter().enumerate() {
            values[pixel * DESCRIPTOR_LEN + channel] = value;
        }
    }
    DescriptorField::from_raw(width, height, values)
}
