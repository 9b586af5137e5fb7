//! # cardioseg
//!
//! Automated cardiac MRI segmentation and ejection-fraction analysis.
//!
//! This crate takes a paired study (one 3D MRI volume at End-Diastole,
//! one at End-Systole), segments every slice with a
//! residual U-Net (ACDC labels: background, right ventricle, myocardium,
//! left ventricle) and derives the clinical volumetric indices EDV, ESV
//! and EF from the left-ventricle voxel counts and the voxel spacing.
//! Volumes are read from NIfTI files (`.nii` / `.nii.gz`) or from DICOM
//! series directories.
//!
//! The network runs on the CPU through candle. Weights are loaded once
//! per process by a [`model_loader::SegmentationEngine`] and shared
//! read-only afterwards; checkpoints must match the architecture's
//! parameter names exactly or loading fails outright.
//!
//! # Examples
//!
//! ## Segmenting an ED/ES pair
//!
//! Load the pretrained weights lazily, segment both phases and print the
//! ejection fraction.
//!
//! ```no_run
//! # use cardioseg::model_loader::SegmentationEngine;
//! # use cardioseg::pipeline::segment_ed_es;
//! # use std::path::Path;
//! let engine = SegmentationEngine::new("models/resunet2d.safetensors");
//! let report = segment_ed_es(
//!     &engine,
//!     Path::new("patient001_ED.nii.gz"),
//!     Path::new("patient001_ES.nii.gz"),
//!     None,
//! )
//! .expect("segmentation should have completed");
//! println!(
//!     "EDV {:.1} mL, ESV {:.1} mL, EF {:.1}%",
//!     report.ef_metrics.edv_ml, report.ef_metrics.esv_ml, report.ef_metrics.ef_percent,
//! );
//! ```

pub mod enums;
pub mod inference;
mod interpolator;
pub mod metrics;
pub mod model;
pub mod model_loader;
pub mod pipeline;
pub mod viz;
pub mod volume;
pub mod volume_loader;
