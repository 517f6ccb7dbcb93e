use crate::image::{separable_filter, GrayFloatImage};

// Scharr smoothing taps scaled so the pair estimates a unit-spaced derivative.
const SCHARR_SMOOTH: [f32; 3] = [3. / 32., 10. / 32., 3. / 32.];
const CENTRAL_DIFFERENCE: [f32; 3] = [-1., 0., 1.];

/// Horizontal derivative, similar to `cv::Scharr` with `dx = 1` and scale 1/32.
pub fn scharr_horizontal(image: &GrayFloatImage) -> GrayFloatImage {
    separable_filter(image, &CENTRAL_DIFFERENCE, &SCHARR_SMOOTH)
}

/// Vertical derivative, similar to `cv::Scharr` with `dy = 1` and scale 1/32.
pub fn scharr_vertical(image: &GrayFloatImage) -> GrayFloatImage {
    separable_filter(image, &SCHARR_SMOOTH, &CENTRAL_DIFFERENCE)
}

/// Both first order derivatives of `image`.
///
/// # Return value
/// `(Lx, Ly)`, each the size of the input.
pub fn gradients(image: &GrayFloatImage) -> (GrayFloatImage, GrayFloatImage) {
    #[cfg(not(feature = "rayon"))]
    {
        (scharr_horizontal(image), scharr_vertical(image))
    }
    #[cfg(feature = "rayon")]
    {
        rayon::join(|| scharr_horizontal(image), || scharr_vertical(image))
    }
}
