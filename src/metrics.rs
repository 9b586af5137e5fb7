use crate::enums::TissueClass;
use crate::volume::LabelVolume;

use serde::Serialize;
use tracing::warn;

/// Stabilizer for the ejection-fraction denominator when EDV is near zero.
const EF_EPSILON: f64 = 1e-8;

/// Plausibility indicator on computed metrics. Not a validation gate:
/// an implausible result is flagged and still returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum QcFlag {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "EDV<ESV")]
    EdvLessThanEsv,
}

impl QcFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::EdvLessThanEsv => "EDV<ESV",
        }
    }
}

/// Left-ventricular volumetric indices derived from a pair of label
/// volumes.
#[derive(Clone, Debug, Serialize)]
pub struct CardiacMetrics {
    #[serde(rename = "EDV_ml")]
    pub edv_ml: f64,
    #[serde(rename = "ESV_ml")]
    pub esv_ml: f64,
    #[serde(rename = "EF_percent")]
    pub ef_percent: f64,
    #[serde(rename = "QC")]
    pub qc: QcFlag,
}

impl CardiacMetrics {
    /// Derive EDV, ESV and EF from the ED/ES label volumes and the
    /// physical volume of a single voxel in milliliters.
    pub fn compute(ed: &LabelVolume, es: &LabelVolume, voxel_ml: f64) -> Self {
        let edv_ml = ed.count(TissueClass::LeftVentricle) as f64 * voxel_ml;
        let esv_ml = es.count(TissueClass::LeftVentricle) as f64 * voxel_ml;
        let ef_percent = (edv_ml - esv_ml) / (edv_ml + EF_EPSILON) * 100.0;

        let qc = if edv_ml >= esv_ml {
            QcFlag::Ok
        } else {
            warn!(edv_ml, esv_ml, "end-diastolic volume below end-systolic volume");
            QcFlag::EdvLessThanEsv
        };

        Self {
            edv_ml,
            esv_ml,
            ef_percent,
            qc,
        }
    }
}
