use crate::enums::TissueClass;
use crate::interpolator::Interpolator;
use crate::volume::{LabelVolume, Volume};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::{Rgb, RgbImage};
use ndarray::Array2;
use serde::Serialize;
use std::io::Cursor;
use thiserror::Error;

/// Output resolution of the rendered views.
pub const VIEW_SIZE: usize = 256;

const IMAGE_WEIGHT: f32 = 0.7;
const MASK_WEIGHT: f32 = 0.3;

#[derive(Debug, Error)]
pub enum VizError {
    #[error("slice index {index} out of range for depth {depth}")]
    SliceOutOfRange { index: usize, depth: usize },

    #[error("PNG encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// The three rendered views of one slice, each a base64-encoded PNG.
#[derive(Clone, Debug, Serialize)]
pub struct SliceViews {
    pub original: String,
    pub mask: String,
    pub overlay: String,
}

impl SliceViews {
    /// Render the original slice, its color-coded mask and a weighted
    /// overlay of the two.
    ///
    /// The intensity slice is resized with bilinear interpolation; the
    /// label map uses nearest-neighbor lookup so no intermediate class
    /// colors appear.
    pub fn build(
        volume: &Volume,
        labels: &LabelVolume,
        slice_index: usize,
    ) -> Result<Self, VizError> {
        let (_, _, depth) = volume.dim();
        if slice_index >= depth {
            return Err(VizError::SliceOutOfRange {
                index: slice_index,
                depth,
            });
        }

        let slice = Interpolator::resize_bilinear(&volume.slice_at(slice_index), VIEW_SIZE, VIEW_SIZE);
        let mask = Interpolator::resize_nearest(&labels.slice_at(slice_index), VIEW_SIZE, VIEW_SIZE);

        let original = grayscale_to_rgb(&slice);
        let mask_rgb = paint_mask(&mask);
        let overlay = blend(&original, &mask_rgb);

        Ok(Self {
            original: encode_png(&original)?,
            mask: encode_png(&mask_rgb)?,
            overlay: encode_png(&overlay)?,
        })
    }
}

/// Rescale a [0, 1] intensity slice to 8-bit and replicate it across the
/// three color channels.
fn grayscale_to_rgb(slice: &Array2<f32>) -> RgbImage {
    let (height, width) = slice.dim();
    RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let value = (slice[[y as usize, x as usize]] * 255.0).clamp(0.0, 255.0) as u8;
        Rgb([value, value, value])
    })
}

/// Paint each class with its fixed palette color.
fn paint_mask(mask: &Array2<u8>) -> RgbImage {
    let (height, width) = mask.dim();
    RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let color = TissueClass::from_u8(mask[[y as usize, x as usize]])
            .map(TissueClass::color)
            .unwrap_or([0, 0, 0]);
        Rgb(color)
    })
}

fn blend(original: &RgbImage, mask: &RgbImage) -> RgbImage {
    RgbImage::from_fn(original.width(), original.height(), |x, y| {
        let a = original.get_pixel(x, y);
        let b = mask.get_pixel(x, y);
        let mut blended = [0u8; 3];
        for channel in 0..3 {
            let value = IMAGE_WEIGHT * f32::from(a[channel]) + MASK_WEIGHT * f32::from(b[channel]);
            blended[channel] = value.round().clamp(0.0, 255.0) as u8;
        }
        Rgb(blended)
    })
}

fn encode_png(image: &RgbImage) -> Result<String, VizError> {
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, image::ImageFormat::Png)?;
    Ok(STANDARD.encode(bytes.into_inner()))
}
