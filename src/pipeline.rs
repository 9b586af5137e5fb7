use crate::enums::CardiacPhase;
use crate::inference::predict_volume;
use crate::metrics::CardiacMetrics;
use crate::model_loader::{ModelLoaderError, SegmentationEngine};
use crate::viz::{SliceViews, VizError};
use crate::volume_loader::{VolumeLoader, VolumeLoaderError};

use serde::Serialize;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to load volume: {0}")]
    Volume(#[from] VolumeLoaderError),

    #[error("failed to load model: {0}")]
    Model(#[from] ModelLoaderError),

    #[error("inference failed: {0}")]
    Inference(#[from] candle_core::Error),

    #[error("visualization failed: {0}")]
    Viz(#[from] VizError),
}

/// Everything a study produces: the resolved slice index, the rendered
/// views for both phases, the clinical indices and the voxel geometry.
#[derive(Clone, Debug, Serialize)]
pub struct SegmentationReport {
    pub slice_index: usize,
    #[serde(rename = "ED")]
    pub ed: SliceViews,
    #[serde(rename = "ES")]
    pub es: SliceViews,
    #[serde(rename = "EF_metrics")]
    pub ef_metrics: CardiacMetrics,
    pub spacing_mm: [f32; 3],
    pub voxel_volume_ml: f64,
}

/// Segment a paired ED/ES study and derive its clinical indices.
///
/// Both files are NIfTI volumes. The optional slice index selects which
/// slice is rendered; it defaults to the middle slice and is clamped into
/// the valid range otherwise. Metrics use the ED volume's voxel spacing.
pub fn segment_ed_es(
    engine: &SegmentationEngine,
    ed_path: impl AsRef<Path>,
    es_path: impl AsRef<Path>,
    slice_index: Option<i64>,
) -> Result<SegmentationReport, PipelineError> {
    let model = engine.model()?;

    let ed_raw = VolumeLoader::load_nifti(ed_path)?;
    let es_raw = VolumeLoader::load_nifti(es_path)?;

    if ed_raw.dim() != es_raw.dim() {
        warn!(ed = ?ed_raw.dim(), es = ?es_raw.dim(), "ED and ES volume shapes differ");
    }
    if ed_raw.spacing != es_raw.spacing {
        warn!(
            ed = ?ed_raw.spacing,
            es = ?es_raw.spacing,
            "ED and ES voxel spacing differ; metrics use the ED spacing"
        );
    }

    let ed_volume = ed_raw.normalized();
    let es_volume = es_raw.normalized();
    let voxel_ml = ed_raw.voxel_volume_ml();

    info!(phase = CardiacPhase::EndDiastole.abbreviation(), "segmenting volume");
    let ed_labels = predict_volume(model, &ed_volume)?;
    info!(phase = CardiacPhase::EndSystole.abbreviation(), "segmenting volume");
    let es_labels = predict_volume(model, &es_volume)?;

    let ef_metrics = CardiacMetrics::compute(&ed_labels, &es_labels, voxel_ml);

    let (_, _, ed_depth) = ed_volume.dim();
    let (_, _, es_depth) = es_volume.dim();
    let slice_index = resolve_slice_index(slice_index, ed_depth);
    // a depth mismatch must not index past the shorter volume
    let es_slice_index = slice_index.min(es_depth.saturating_sub(1));

    let ed = SliceViews::build(&ed_volume, &ed_labels, slice_index)?;
    let es = SliceViews::build(&es_volume, &es_labels, es_slice_index)?;

    let (dx, dy, dz) = ed_raw.spacing;
    Ok(SegmentationReport {
        slice_index,
        ed,
        es,
        ef_metrics,
        spacing_mm: [dx, dy, dz],
        voxel_volume_ml: voxel_ml,
    })
}

/// Clamp a requested slice index into [0, depth-1], defaulting to the
/// middle slice when none was requested.
fn resolve_slice_index(requested: Option<i64>, depth: usize) -> usize {
    match requested {
        None => depth / 2,
        Some(index) => index.clamp(0, depth.saturating_sub(1) as i64) as usize,
    }
}
