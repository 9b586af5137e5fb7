use crate::volume::Volume;

use dicom::{
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::{ConvertOptions, PixelDecoder, VoiLutOption},
};
use dicom_dictionary_std::tags;
use flate2::read::GzDecoder;
use ndarray::{Array2, Array3, Axis, Ix3, s};
use nifti::volume::ndarray::IntoNdArray;
use nifti::{InMemNiftiObject, NiftiObject};
use std::{fs, io::Cursor, path::Path};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("No valid DICOM images found")]
    NoValidImages,

    #[error("Inconsistent image dimensions")]
    InconsistentDimensions,

    #[error("Missing spacing information")]
    MissingSpacing,

    #[error("Volume must be at least 3-dimensional")]
    NotVolumetric,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),

    #[error("NIfTI error: {0}")]
    Nifti(#[from] nifti::NiftiError),

    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Load a volume from a NIfTI file (.nii or .nii.gz)
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or holds less than three
    /// dimensions of data
    pub fn load_nifti(path: impl AsRef<Path>) -> Result<Volume, VolumeLoaderError> {
        let bytes = fs::read(path.as_ref())?;
        debug!(path = %path.as_ref().display(), bytes = bytes.len(), "reading NIfTI volume");
        Self::load_nifti_bytes(&bytes)
    }

    /// Load a volume from in-memory NIfTI bytes, gzip auto-detected.
    pub fn load_nifti_bytes(bytes: &[u8]) -> Result<Volume, VolumeLoaderError> {
        let object = if Self::is_gzip(bytes) {
            InMemNiftiObject::from_reader(GzDecoder::new(Cursor::new(bytes)))?
        } else {
            InMemNiftiObject::from_reader(Cursor::new(bytes))?
        };

        let header = object.header();
        let spacing = (
            header.pixdim[1],
            header.pixdim[2],
            header.pixdim[3],
        );

        // scl_slope / scl_inter scaling happens inside the conversion
        let mut array = object.into_volume().into_ndarray::<f32>()?;
        if array.ndim() < 3 {
            return Err(VolumeLoaderError::NotVolumetric);
        }
        // keep the first timepoint of 4D (or higher) acquisitions
        while array.ndim() > 3 {
            let last = array.ndim() - 1;
            array = array.index_axis_move(Axis(last), 0);
        }
        let data = array.into_dimensionality::<Ix3>()?;

        Ok(Volume::new(data, spacing))
    }

    /// Load a volume from a directory containing .dcm files, stacking the
    /// series in instance-number order.
    pub fn load_dicom_directory(path: impl AsRef<Path>) -> Result<Volume, VolumeLoaderError> {
        let paths: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect();

        if paths.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }

        let objects: Result<Vec<_>, _> =
            paths.iter().map(|path| open_file(path.as_path())).collect();
        Self::load_from_dicom_objects(&objects?)
    }

    /// Load a volume from decoded DICOM objects
    ///
    /// # Errors
    ///
    /// Returns error if no valid images are found, dimensions are
    /// inconsistent or spacing metadata is missing
    pub fn load_from_dicom_objects(
        objects: &[FileDicomObject<InMemDicomObject>],
    ) -> Result<Volume, VolumeLoaderError> {
        let mut slices: Vec<_> = objects.iter().filter_map(Self::extract_slice).collect();

        if slices.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }

        slices.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        let slices: Vec<Array2<f32>> = slices.into_iter().map(|(_, slice)| slice).collect();

        let first_dim = slices[0].dim();
        if slices.iter().any(|slice| slice.dim() != first_dim) {
            return Err(VolumeLoaderError::InconsistentDimensions);
        }

        let (height, width) = first_dim;
        let depth = slices.len();
        let mut data = Array3::<f32>::zeros((height, width, depth));
        for (z, slice) in slices.iter().enumerate() {
            data.slice_mut(s![.., .., z]).assign(slice);
        }

        let spacing = Self::get_spacing(objects).ok_or(VolumeLoaderError::MissingSpacing)?;
        Ok(Volume::new(data, spacing))
    }

    fn extract_slice(
        object: &FileDicomObject<InMemDicomObject>,
    ) -> Option<(Option<f32>, Array2<f32>)> {
        let order = object
            .element(tags::INSTANCE_NUMBER)
            .ok()?
            .to_int::<i32>()
            .ok()
            .map(|number| number as f32);

        let pixel_data = object.decode_pixel_data().ok()?;
        let options = ConvertOptions::new().with_voi_lut(VoiLutOption::First);
        let slice = pixel_data
            .to_ndarray_with_options::<f32>(&options)
            .ok()?
            .slice_move(s![0, .., .., 0]);

        Some((order, slice))
    }

    fn get_spacing(objects: &[FileDicomObject<InMemDicomObject>]) -> Option<(f32, f32, f32)> {
        objects.iter().find_map(|object| {
            let pixel_spacing = object
                .element(tags::PIXEL_SPACING)
                .ok()?
                .to_multi_float32()
                .ok()?;

            let slice_thickness = object
                .element(tags::SLICE_THICKNESS)
                .ok()?
                .to_float32()
                .ok()?;

            Some((pixel_spacing[0], pixel_spacing[1], slice_thickness))
        })
    }

    fn is_gzip(bytes: &[u8]) -> bool {
        bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
    }
}
