use crate::enums::TissueClass;

use ndarray::{Array3, ArrayView2, s};

/// Denominator floor for the min-max rescaling step.
const MIN_INTENSITY_RANGE: f32 = 1e-5;

/// A 3D intensity volume with axes (height, width, depth) and voxel
/// spacing in millimeters per axis.
pub struct Volume {
    pub data: Array3<f32>,
    pub spacing: (f32, f32, f32),
}

impl Volume {
    pub fn new(data: Array3<f32>, spacing: (f32, f32, f32)) -> Self {
        Self { data, spacing }
    }

    /// Get the dimensions of the volume (height, width, depth)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    /// The 2D slice at the given depth index.
    pub fn slice_at(&self, index: usize) -> ArrayView2<'_, f32> {
        self.data.slice(s![.., .., index])
    }

    /// Physical volume of a single voxel in milliliters.
    pub fn voxel_volume_ml(&self) -> f64 {
        let (dx, dy, dz) = self.spacing;
        f64::from(dx) * f64::from(dy) * f64::from(dz) / 1000.0
    }

    /// Rescale intensities into [0, 1] using robust percentile clipping.
    ///
    /// Strictly positive voxels are treated as foreground; the volume is
    /// clipped to their 1st/99th percentile range and min-max scaled. A
    /// volume with no foreground comes back all zero, same shape.
    pub fn normalized(&self) -> Volume {
        let mut foreground: Vec<f32> = self
            .data
            .iter()
            .copied()
            .filter(|value| *value > 0.0)
            .collect();

        if foreground.is_empty() {
            return Volume::new(Array3::zeros(self.data.raw_dim()), self.spacing);
        }

        foreground.sort_by(f32::total_cmp);
        let lo = percentile(&foreground, 1.0);
        let hi = percentile(&foreground, 99.0);
        let range = (hi - lo).max(MIN_INTENSITY_RANGE);

        let mut data = self.data.clone();
        data.par_mapv_inplace(|value| ((value.clamp(lo, hi) - lo) / range).clamp(0.0, 1.0));
        Volume::new(data, self.spacing)
    }
}

/// Per-voxel class assignment for a [`Volume`], same axis convention.
pub struct LabelVolume {
    pub data: Array3<u8>,
}

impl LabelVolume {
    pub fn new(data: Array3<u8>) -> Self {
        Self { data }
    }

    pub fn zeros(dim: (usize, usize, usize)) -> Self {
        Self {
            data: Array3::zeros(dim),
        }
    }

    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// The 2D label map at the given depth index.
    pub fn slice_at(&self, index: usize) -> ArrayView2<'_, u8> {
        self.data.slice(s![.., .., index])
    }

    /// Number of voxels assigned to the given class.
    pub fn count(&self, class: TissueClass) -> usize {
        let label = class.index();
        self.data.iter().filter(|value| **value == label).count()
    }
}

/// Linear-interpolated percentile of pre-sorted values, `q` in [0, 100].
fn percentile(sorted: &[f32], q: f32) -> f32 {
    let last = sorted.len() - 1;
    let rank = q / 100.0 * last as f32;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f32;
    sorted[lower] * (1.0 - weight) + sorted[upper] * weight
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn ramp_volume() -> Volume {
        // 1..=1000 spread over a 10x10x10 grid
        let values: Vec<f32> = (1..=1000).map(|v| v as f32).collect();
        let data = Array3::from_shape_vec((10, 10, 10), values).unwrap();
        Volume::new(data, (1.0, 1.0, 1.0))
    }

    #[test]
    fn normalized_output_is_in_unit_range() {
        let normalized = ramp_volume().normalized();
        for value in normalized.data.iter() {
            assert!(*value >= 0.0 && *value <= 1.0, "value {value} out of range");
        }
        // percentile endpoints land near 0 and 1
        let min = normalized.data.iter().copied().fold(f32::INFINITY, f32::min);
        let max = normalized
            .data
            .iter()
            .copied()
            .fold(f32::NEG_INFINITY, f32::max);
        assert!(min.abs() < 1e-6);
        assert!((max - 1.0).abs() < 1e-6);
    }

    #[test]
    fn normalized_is_stable_under_reapplication() {
        let once = ramp_volume().normalized();
        let twice = once.normalized();
        let max_diff = once
            .data
            .iter()
            .zip(twice.data.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        assert!(max_diff < 0.05, "second pass moved values by {max_diff}");
    }

    #[test]
    fn all_zero_volume_stays_zero() {
        let volume = Volume::new(Array3::zeros((4, 5, 6)), (1.0, 1.0, 1.0));
        let normalized = volume.normalized();
        assert_eq!(normalized.dim(), (4, 5, 6));
        assert!(normalized.data.iter().all(|value| *value == 0.0));
    }

    #[test]
    fn uniform_volume_never_produces_nan() {
        let volume = Volume::new(
            Array3::from_elem((128, 128, 8), 100.0),
            (1.0, 1.0, 1.0),
        );
        let normalized = volume.normalized();
        for value in normalized.data.iter() {
            assert!(value.is_finite());
            assert!(*value >= 0.0 && *value <= 1.0);
        }
        // degenerate lo == hi collapses everything to zero
        assert!(normalized.data.iter().all(|value| *value == 0.0));
    }

    #[test]
    fn voxel_volume_converts_to_milliliters() {
        let volume = Volume::new(Array3::zeros((2, 2, 2)), (1.25, 1.25, 10.0));
        let expected = 1.25 * 1.25 * 10.0 / 1000.0;
        assert!((volume.voxel_volume_ml() - expected).abs() < 1e-9);
    }

    #[test]
    fn label_volume_counts_classes() {
        let mut labels = LabelVolume::zeros((4, 4, 2));
        labels.data[[0, 0, 0]] = TissueClass::LeftVentricle.index();
        labels.data[[1, 1, 0]] = TissueClass::LeftVentricle.index();
        labels.data[[2, 2, 1]] = TissueClass::Myocardium.index();
        assert_eq!(labels.count(TissueClass::LeftVentricle), 2);
        assert_eq!(labels.count(TissueClass::Myocardium), 1);
        assert_eq!(labels.count(TissueClass::Background), 4 * 4 * 2 - 3);
    }

    #[test]
    fn percentile_interpolates_between_order_statistics() {
        let sorted = [0.0, 10.0];
        assert!((percentile(&sorted, 50.0) - 5.0).abs() < 1e-6);
        assert!((percentile(&sorted, 0.0) - 0.0).abs() < 1e-6);
        assert!((percentile(&sorted, 100.0) - 10.0).abs() < 1e-6);
    }
}
