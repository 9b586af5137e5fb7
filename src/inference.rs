use crate::interpolator::Interpolator;
use crate::model::ResUNet2d;
use crate::volume::{LabelVolume, Volume};

use candle_core::{Result, Tensor};
use ndarray::{Array2, s};
use tracing::debug;

/// Predict a label volume by running the 2D network over every depth
/// slice of a normalized volume.
///
/// Each slice is resized to the network's input resolution with bilinear
/// interpolation, classified, and the per-pixel argmax label map is
/// resized back to the native resolution with nearest-neighbor lookup so
/// no fractional labels appear. Slices carry no state between iterations.
pub fn predict_volume(model: &ResUNet2d, volume: &Volume) -> Result<LabelVolume> {
    let (height, width, depth) = volume.dim();
    let size = model.input_size();
    let mut labels = LabelVolume::zeros((height, width, depth));

    for z in 0..depth {
        let resized = Interpolator::resize_bilinear(&volume.slice_at(z), size, size);
        let (pixels, _) = resized.into_raw_vec_and_offset();
        let input = Tensor::from_vec(pixels, (1, 1, size, size), model.device())?;

        let logits = model.forward(&input)?;
        let classes = logits.argmax(1)?.squeeze(0)?.to_vec2::<u32>()?;

        let map = Array2::from_shape_fn((size, size), |(y, x)| classes[y][x] as u8);
        let restored = Interpolator::resize_nearest(&map.view(), width, height);
        labels.data.slice_mut(s![.., .., z]).assign(&restored);
        debug!(slice = z, "slice segmented");
    }

    Ok(labels)
}
