use ndarray::{Array2, ArrayView2, Zip};

pub(crate) struct Interpolator;

impl Interpolator {
    /// Resize an intensity slice with bilinear interpolation.
    ///
    /// Output coordinates are mapped with half-pixel centers so results
    /// stay aligned between down- and upscaling.
    pub(crate) fn resize_bilinear(
        slice: &ArrayView2<'_, f32>,
        width: usize,
        height: usize,
    ) -> Array2<f32> {
        let (src_height, src_width) = slice.dim();
        let mut output = Array2::<f32>::zeros((height, width));

        Zip::indexed(&mut output).par_for_each(|(y, x), value| {
            let (src_y, src_x) = Self::source_position(x, y, width, height, src_width, src_height);
            *value = Self::bilinear_interpolate(slice, src_y, src_x);
        });

        output
    }

    /// Resize a label map with nearest-neighbor lookup.
    ///
    /// Never interpolates, so the output value set is a subset of the
    /// input value set. Required for class labels.
    pub(crate) fn resize_nearest(
        slice: &ArrayView2<'_, u8>,
        width: usize,
        height: usize,
    ) -> Array2<u8> {
        let (src_height, src_width) = slice.dim();
        let mut output = Array2::<u8>::zeros((height, width));

        Zip::indexed(&mut output).par_for_each(|(y, x), value| {
            let (src_y, src_x) = Self::source_position(x, y, width, height, src_width, src_height);
            let nearest_y = src_y.round() as usize;
            let nearest_x = src_x.round() as usize;
            *value = slice[[nearest_y, nearest_x]];
        });

        output
    }

    /// Map an output pixel to its source coordinates, clamped in-bounds.
    #[inline]
    fn source_position(
        x: usize,
        y: usize,
        width: usize,
        height: usize,
        src_width: usize,
        src_height: usize,
    ) -> (f32, f32) {
        let norm_x = (x as f32 + 0.5) / width as f32;
        let norm_y = (y as f32 + 0.5) / height as f32;

        let src_x = (norm_x * src_width as f32 - 0.5).clamp(0.0, (src_width - 1) as f32);
        let src_y = (norm_y * src_height as f32 - 0.5).clamp(0.0, (src_height - 1) as f32);

        (src_y, src_x)
    }

    #[inline]
    pub(crate) fn bilinear_interpolate(slice: &ArrayView2<f32>, y: f32, x: f32) -> f32 {
        let (height, width) = slice.dim();

        let y0 = y.floor() as usize;
        let x0 = x.floor() as usize;
        let y1 = (y0 + 1).min(height - 1);
        let x1 = (x0 + 1).min(width - 1);

        let dy = y - y0 as f32;
        let dx = x - x0 as f32;
        let one_minus_dx = 1.0 - dx;
        let one_minus_dy = 1.0 - dy;

        let v00 = slice[[y0, x0]];
        let v01 = slice[[y0, x1]];
        let v10 = slice[[y1, x0]];
        let v11 = slice[[y1, x1]];

        let v0 = v00.mul_add(one_minus_dx, v01 * dx);
        let v1 = v10.mul_add(one_minus_dx, v11 * dx);

        v0.mul_add(one_minus_dy, v1 * dy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use std::collections::HashSet;

    #[test]
    fn bilinear_preserves_constant_fields() {
        let slice = Array2::from_elem((8, 12), 0.37f32);
        let resized = Interpolator::resize_bilinear(&slice.view(), 256, 256);
        assert_eq!(resized.dim(), (256, 256));
        for value in resized.iter() {
            assert!((value - 0.37).abs() < 1e-6);
        }
    }

    #[test]
    fn bilinear_identity_resize_is_exact() {
        let slice =
            Array2::from_shape_fn((16, 16), |(y, x)| (y * 16 + x) as f32 / 255.0);
        let resized = Interpolator::resize_bilinear(&slice.view(), 16, 16);
        for (a, b) in slice.iter().zip(resized.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn nearest_round_trip_preserves_label_set() {
        // quadrant pattern covering all four classes
        let labels = Array2::from_shape_fn((64, 64), |(y, x)| match (y < 32, x < 32) {
            (true, true) => 0u8,
            (true, false) => 1,
            (false, true) => 2,
            (false, false) => 3,
        });

        let up = Interpolator::resize_nearest(&labels.view(), 256, 256);
        let down = Interpolator::resize_nearest(&up.view(), 64, 64);

        let original: HashSet<u8> = labels.iter().copied().collect();
        let upscaled: HashSet<u8> = up.iter().copied().collect();
        let restored: HashSet<u8> = down.iter().copied().collect();

        assert_eq!(original, upscaled);
        assert_eq!(original, restored);
    }

    #[test]
    fn nearest_never_invents_values() {
        let labels = Array2::from_shape_fn((10, 7), |(y, x)| ((y + x) % 4) as u8);
        let resized = Interpolator::resize_nearest(&labels.view(), 33, 19);
        let allowed: HashSet<u8> = labels.iter().copied().collect();
        for value in resized.iter() {
            assert!(allowed.contains(value), "value {value} not in source");
        }
    }
}
