/// A matched keypoint location in 0-based pixel coordinates.
///
/// +x faces right starting from the left edge of the image, +y faces down
/// starting from the top edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Feature {
    pub x: f32,
    pub y: f32,
}

impl Feature {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Ingest a coordinate given in 1-based convention, so `(1, 1)` is the
    /// top left pixel `(0, 0)`.
    pub fn from_one_based(x: f32, y: f32) -> Self {
        Self::new(x - 1.0, y - 1.0)
    }

    /// The pixel this feature falls on, if it lies inside a
    /// `width` x `height` image.
    pub fn pixel(&self, width: usize, height: usize) -> Option<(usize, usize)> {
        let x = self.x.round();
        let y = self.y.round();
        let inside = x.is_finite()
            && y.is_finite()
            && x >= 0.0
            && y >= 0.0
            && x < width as f32
            && y < height as f32;
        inside.then(|| (x as usize, y as usize))
    }
}

/// The matched features of one image, in the order they were supplied.
///
/// Duplicates are allowed and an empty set is valid input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureSet {
    features: Vec<Feature>,
}

impl FeatureSet {
    pub fn new(features: Vec<Feature>) -> Self {
        Self { features }
    }

    /// Build a set from 1-based `(x, y)` pairs.
    pub fn from_one_based(points: impl IntoIterator<Item = (f32, f32)>) -> Self {
        points
            .into_iter()
            .map(|(x, y)| Feature::from_one_based(x, y))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Feature> {
        self.features.iter()
    }

    pub fn as_slice(&self) -> &[Feature] {
        &self.features
    }
}

impl FromIterator<Feature> for FeatureSet {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a FeatureSet {
    type Item = &'a Feature;
    type IntoIter = std::slice::Iter<'a, Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_based_origin_maps_to_pixel_zero() {
        let feature = Feature::from_one_based(1.0, 1.0);
        assert_eq!(feature, Feature::new(0.0, 0.0));
        assert_eq!(feature.pixel(4, 4), Some((0, 0)));
    }

    #[test]
    fn set_keeps_order_and_duplicates() {
        let set = FeatureSet::from_one_based([(3.0, 2.0), (3.0, 2.0), (1.0, 5.0)]);
        let xs: Vec<_> = set.iter().map(|f| (f.x, f.y)).collect();
        assert_eq!(xs, vec![(2.0, 1.0), (2.0, 1.0), (0.0, 4.0)]);
    }

    #[test]
    fn pixel_rejects_points_outside_the_image() {
        assert_eq!(Feature::new(-0.6, 0.0).pixel(4, 4), None);
        assert_eq!(Feature::new(3.4, 3.4).pixel(4, 4), Some((3, 3)));
        assert_eq!(Feature::new(3.6, 0.0).pixel(4, 4), None);
        assert_eq!(Feature::new(f32::NAN, 0.0).pixel(4, 4), None);
    }
}
