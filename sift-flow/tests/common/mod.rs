use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use sift_flow::image::gaussian_blur;
use sift_flow::{GrayFloatImage, ParameterRecord, Parameters};

/// Blurred uniform noise in `[0, 1]`.
pub fn texture(width: usize, height: usize, seed: u64) -> GrayFloatImage {
    let mut rng = Pcg64::seed_from_u64(seed);
    let data = (0..width * height).map(|_| rng.gen_range(0.0..1.0)).collect();
    gaussian_blur(&GrayFloatImage::from_raw(width, height, data).unwrap(), 1.0)
}

/// Crops of one texture such that `first(x, y) == second(x + dx, y + dy)`.
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
    (
        crop(margin, margin),
        crop((margin as i32 - dx) as usize, (margin as i32 - dy) as usize),
    )
}

/// Few levels, small windows and short schedules so tests stay fast.
pub fn quick_record() -> ParameterRecord {
    ParameterRecord {
        nlevels: 2,
        topwsize: 4,
        wsize: 2,
        n_top_iterations: 10,
        n_iterations: 6,
        n_hierarchy: 1,
        ..Default::default()
    }
}

pub fn quick_parameters() -> Parameters {
    Parameters::from_record(quick_record()).unwrap()
}
