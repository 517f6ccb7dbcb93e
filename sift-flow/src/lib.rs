//! Dense correspondence between two images with SIFT Flow.
//!
//! The pipeline turns each image and its sparse matched features into a
//! [`ScaleMap`], builds a dense [`DescriptorField`] whose support follows that
//! map, then matches the two fields coarse-to-fine into a [`FlowField`].
//!
//! ```no_run
//! use sift_flow::{FeatureSet, SiftFlow};
//!
//! let engine = SiftFlow::default();
//! let features1 = FeatureSet::from_one_based([(12.0, 40.0), (80.0, 33.5)]);
//! let features2 = FeatureSet::from_one_based([(14.0, 41.0), (83.0, 35.0)]);
//! let flow = engine
//!     .compute_path("first.png", "second.png", &features1, &features2)
//!     .unwrap();
//! println!("vx at the origin: {}", flow.vx[(0, 0)]);
//! ```

mod config;
mod derivatives;
mod descriptor;
mod error;
mod features;
mod flow;
pub mod image;
mod progress;
mod pyramid;
mod scale_map;
mod solver;

pub use crate::config::{ParameterRecord, Parameters, MAX_WINDOW_SIZE};
pub use crate::descriptor::{
    DescriptorConfig, DescriptorField, DescriptorFieldBuilder, DESCRIPTOR_LEN,
};
pub use crate::error::{Error, Result};
pub use crate::features::{Feature, FeatureSet};
pub use crate::flow::FlowField;
pub use crate::image::{GrayFloatImage, GrayImageBuffer};
pub use crate::progress::{ImageIndex, LogProgress, Progress, Stage};
pub use crate::pyramid::DescriptorPyramid;
pub use crate::scale_map::{ScaleMap, ScaleMapConfig, ScaleMapEstimator, WeightFunction};
pub use crate::solver::FlowSolver;

use log::*;
use std::path::Path;

/// The whole pipeline: scale maps, descriptor fields and the flow solver.
///
/// Every stage is configured up front; a computation only reads them, so
/// one engine can serve any number of image pairs.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct SiftFlow {
    pub parameters: Parameters,
    pub scale_maps: ScaleMapEstimator,
    pub descriptors: DescriptorFieldBuilder,
}

impl SiftFlow {
    /// An engine with the given solver parameters and default stages.
    pub fn new(parameters: Parameters) -> Self {
        Self {
            parameters,
            ..Default::default()
        }
    }

    /// Compute the flow from `image1` to `image2`, logging each milestone.
    pub fn compute(
        &self,
        image1: &GrayFloatImage,
        image2: &GrayFloatImage,
        features1: &FeatureSet,
        features2: &FeatureSet,
    ) -> Result<FlowField> {
        self.compute_with_progress(image1, image2, features1, features2, &mut LogProgress)
    }

    /// Compute the flow from `image1` to `image2`, reporting each milestone
    /// to `progress`.
    ///
    /// Inputs are checked before the first milestone, so a rejected call
    /// reports nothing.
    pub fn compute_with_progress(
        &self,
        image1: &GrayFloatImage,
        image2: &GrayFloatImage,
        features1: &FeatureSet,
        features2: &FeatureSet,
        progress: &mut impl Progress,
    ) -> Result<FlowField> {
        for image in [image1, image2] {
            if image.width() == 0 || image.height() == 0 {
                return Err(Error::EmptyImage);
            }
        }
        if image1.dimensions() != image2.dimensions() {
            return Err(Error::InputDimensionMismatch {
                first: image1.dimensions(),
                second: image2.dimensions(),
            });
        }

        progress.stage(Stage::ScaleMap(ImageIndex::First));
        let scale_map1 = self.scale_maps.estimate(image1, features1);
        progress.stage(Stage::ScaleMap(ImageIndex::Second));
        let scale_map2 = self.scale_maps.estimate(image2, features2);

        progress.stage(Stage::DescriptorField(ImageIndex::First));
        let field1 = self.descriptors.build(image1, &scale_map1)?;
        progress.stage(Stage::DescriptorField(ImageIndex::Second));
        let field2 = self.descriptors.build(image2, &scale_map2)?;

        progress.stage(Stage::Flow);
        let flow = FlowSolver::new(self.parameters).solve(&field1, &field2)?;
        debug!(
            "Mean flow magnitude {:.3}",
            flow.magnitude().mean().unwrap_or(0.0)
        );
        Ok(flow)
    }

    /// Load both images from disk and compute the flow between them.
    pub fn compute_path(
        &self,
        path1: impl AsRef<Path>,
        path2: impl AsRef<Path>,
        features1: &FeatureSet,
        features2: &FeatureSet,
    ) -> Result<FlowField> {
        let image1 = GrayFloatImage::from_dynamic(&::image::open(path1)?);
        let image2 = GrayFloatImage::from_dynamic(&::image::open(path2)?);
        self.compute(&image1, &image2, features1, features2)
    }
}

#[cfg(test)]
pub(crate) mod test_utils {
    use crate::image::{gaussian_blur, GrayFloatImage};
    use rand::{Rng, SeedableRng};
    use rand_pcg::Pcg64;

    /// Blurred uniform noise in `[0, 1]`.
    pub fn texture(width: usize, height: usize, seed: u64) -> GrayFloatImage {
        let mut rng = Pcg64::seed_from_u64(seed);
        let data = (0..width * height).map(|_| rng.gen_range(0.0..1.0)).collect();
        gaussian_blur(&GrayFloatImage::from_raw(width, height, data).unwrap(), 1.0)
    }

    /// Two crops of one texture where pixel `(x, y)` of the first shows the
    /// same content as pixel `(x + dx, y + dy)` of the second.
    pub fn shifted_pair(
        width: usize,
        height: usize,
        dx: i32,
        dy: i32,
        seed: u64,
    ) -> (GrayFloatImage, GrayFloatImage) {
        let margin = dx.abs().max(dy.abs()) as usize;
        let base = texture(width + 2 * margin, height + 2 * margin, seed);
        let crop = |ox: usize, oy: usize| {
            let data = (0..height)
                .flat_map(|y| (0..width).map(move |x| (x, y)))
                .map(|(x, y)| base.get(x + ox, y + oy))
                .collect();
            GrayFloatImage::from_raw(width, height, data).unwrap()
        };
        let second_x = (margin as i32 - dx) as usize;
        let second_y = (margin as i32 - dy) as usize;
        (crop(margin, margin), crop(second_x, second_y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{shifted_pair, texture};

    fn quick() -> SiftFlow {
        SiftFlow::new(
            Parameters::from_record(ParameterRecord {
                nlevels: 2,
                topwsize: 3,
                wsize: 2,
                n_top_iterations: 4,
                n_iterations: 3,
                n_hierarchy: 1,
                ..Default::default()
            })
            .unwrap(),
        )
    }

    #[test]
    fn milestones_arrive_in_pipeline_order() {
        let _ = pretty_env_logger::try_init();
        let (first, second) = shifted_pair(20, 16, 1, 1, 4);
        let mut stages = vec![];
        quick()
            .compute_with_progress(
                &first,
                &second,
                &FeatureSet::default(),
                &FeatureSet::default(),
                &mut |stage: Stage| stages.push(stage),
            )
            .unwrap();
        assert_eq!(
            stages,
            vec![
                Stage::ScaleMap(ImageIndex::First),
                Stage::ScaleMap(ImageIndex::Second),
                Stage::DescriptorField(ImageIndex::First),
                Stage::DescriptorField(ImageIndex::Second),
                Stage::Flow,
            ]
        );
    }

    #[test]
    fn mismatched_images_report_no_milestone() {
        let mut stages = vec![];
        let result = quick().compute_with_progress(
            &texture(20, 16, 1),
            &texture(16, 20, 1),
            &FeatureSet::default(),
            &FeatureSet::default(),
            &mut |stage: Stage| stages.push(stage),
        );
        assert!(matches!(
            result,
            Err(Error::InputDimensionMismatch {
                first: (20, 16),
                second: (16, 20)
            })
        ));
        assert!(stages.is_empty());
    }

    #[test]
    fn empty_image_is_rejected() {
        let empty = GrayFloatImage::new(0, 0);
        assert!(matches!(
            quick().compute(&empty, &empty, &FeatureSet::default(), &FeatureSet::default()),
            Err(Error::EmptyImage)
        ));
    }

    #[test]
    fn compute_path_reads_images_from_disk() {
        let _ = pretty_env_logger::try_init();
        let dir = std::env::temp_dir().join(format!("sift-flow-paths-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let save = |image: &GrayFloatImage, name: &str| {
            let path = dir.join(name);
            ::image::GrayImage::from_fn(image.width() as u32, image.height() as u32, |x, y| {
                ::image::Luma([(image.get(x as usize, y as usize) * 255.0).round() as u8])
            })
            .save(&path)
            .unwrap();
            path
        };
        let (first, second) = shifted_pair(20, 16, 1, 0, 6);
        let path1 = save(&first, "first.png");
        let path2 = save(&second, "second.png");

        let engine = quick();
        let features = FeatureSet::default();
        let from_disk = engine
            .compute_path(&path1, &path2, &features, &features)
            .unwrap();
        let load = |path: &std::path::PathBuf| {
            GrayFloatImage::from_dynamic(&::image::open(path).unwrap())
        };
        let in_memory = engine
            .compute(&load(&path1), &load(&path2), &features, &features)
            .unwrap();
        assert_eq!(from_disk.dimensions(), (20, 16));
        assert_eq!(from_disk, in_memory);

        let missing = engine.compute_path(&path1, dir.join("missing.png"), &features, &features);
        assert!(matches!(missing, Err(Error::Image(_))));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn shifted_pair_is_consistent() {
        let (first, second) = shifted_pair(10, 8, 2, -1, 3);
        assert_eq!(first.get(4, 4), second.get(6, 3));
    }
}
