use crate::model::{ModelConfig, ResUNet2d};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use once_cell::sync::OnceCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Checkpoint wrapper key written by the training setup.
const CHECKPOINT_KEY: &str = "state_dict";
/// Parameter-name prefix left behind by distributed training.
const DISTRIBUTED_PREFIX: &str = "module.";
/// Train-time batch counters with no inference role.
const BATCH_COUNTER_SUFFIX: &str = ".num_batches_tracked";

#[derive(Debug, Error)]
pub enum ModelLoaderError {
    #[error("weights file not found: {}", .0.display())]
    MissingWeights(PathBuf),

    #[error("checkpoint is missing parameters: {0:?}")]
    MissingParameters(Vec<String>),

    #[error("checkpoint contains unexpected parameters: {0:?}")]
    UnexpectedParameters(Vec<String>),

    #[error("model error: {0}")]
    Candle(#[from] candle_core::Error),
}

pub struct ModelLoader;

impl ModelLoader {
    /// Build a ready-to-run network from a weights file.
    ///
    /// # Errors
    ///
    /// Fails if the file is missing or unreadable, or if the checkpoint's
    /// parameter names do not match the architecture exactly. There is no
    /// partial or fallback model.
    pub fn load(
        path: &Path,
        config: ModelConfig,
        device: &Device,
    ) -> Result<ResUNet2d, ModelLoaderError> {
        if !path.exists() {
            return Err(ModelLoaderError::MissingWeights(path.to_path_buf()));
        }

        let raw = Self::read_checkpoint(path, device)?;
        let weights = Self::normalize_keys(raw);
        Self::audit_names(&weights, &config)?;

        let vb = VarBuilder::from_tensors(weights, DType::F32, device);
        let model = ResUNet2d::new(config, vb)?;
        info!(path = %path.display(), "segmentation network ready");
        Ok(model)
    }

    fn read_checkpoint(
        path: &Path,
        device: &Device,
    ) -> Result<HashMap<String, Tensor>, ModelLoaderError> {
        let is_safetensors = path
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| extension.eq_ignore_ascii_case("safetensors"));

        if is_safetensors {
            return Ok(candle_core::safetensors::load(path, device)?);
        }

        // PyTorch pickle: checkpoints wrapping the weights under
        // "state_dict" are unwrapped, flat state dicts read as-is.
        let tensors = match candle_core::pickle::read_all_with_key(path, Some(CHECKPOINT_KEY)) {
            Ok(tensors) => tensors,
            Err(_) => candle_core::pickle::read_all(path)?,
        };
        Ok(tensors.into_iter().collect())
    }

    /// Deterministic checkpoint-key cleanup: strip the distributed-training
    /// prefix by exact match and discard batch counters. Nothing else is
    /// rewritten.
    fn normalize_keys(raw: HashMap<String, Tensor>) -> HashMap<String, Tensor> {
        raw.into_iter()
            .filter_map(|(name, tensor)| {
                if name.ends_with(BATCH_COUNTER_SUFFIX) {
                    debug!(name = %name, "discarding train-time batch counter");
                    return None;
                }
                let name = match name.strip_prefix(DISTRIBUTED_PREFIX) {
                    Some(stripped) => stripped.to_owned(),
                    None => name,
                };
                Some((name, tensor))
            })
            .collect()
    }

    /// The checkpoint must carry exactly the tensors the architecture
    /// declares; anything missing or left over is fatal.
    fn audit_names(
        weights: &HashMap<String, Tensor>,
        config: &ModelConfig,
    ) -> Result<(), ModelLoaderError> {
        let expected: HashSet<String> =
            ResUNet2d::parameter_names(config).into_iter().collect();

        let mut missing: Vec<String> = expected
            .iter()
            .filter(|name| !weights.contains_key(*name))
            .cloned()
            .collect();
        if !missing.is_empty() {
            missing.sort();
            return Err(ModelLoaderError::MissingParameters(missing));
        }

        let mut unexpected: Vec<String> = weights
            .keys()
            .filter(|name| !expected.contains(*name))
            .cloned()
            .collect();
        if !unexpected.is_empty() {
            unexpected.sort();
            return Err(ModelLoaderError::UnexpectedParameters(unexpected));
        }

        Ok(())
    }
}

/// Application-lifetime owner of the segmentation network.
///
/// The network is built from the weights file on the first [`Self::model`]
/// call and cached for the rest of the process; it is never reloaded.
/// After initialization all access is read-only, so the engine can be
/// shared across threads.
pub struct SegmentationEngine {
    weights_path: PathBuf,
    config: ModelConfig,
    device: Device,
    model: OnceCell<ResUNet2d>,
}

impl SegmentationEngine {
    pub fn new(weights_path: impl Into<PathBuf>) -> Self {
        Self::with_config(weights_path, ModelConfig::default())
    }

    pub fn with_config(weights_path: impl Into<PathBuf>, config: ModelConfig) -> Self {
        Self {
            weights_path: weights_path.into(),
            config,
            device: Device::Cpu,
            model: OnceCell::new(),
        }
    }

    /// The cached network, loading it on the first call.
    pub fn model(&self) -> Result<&ResUNet2d, ModelLoaderError> {
        self.model
            .get_or_try_init(|| ModelLoader::load(&self.weights_path, self.config, &self.device))
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_nn::VarMap;

    fn tiny_config() -> ModelConfig {
        ModelConfig {
            in_channels: 1,
            num_classes: 4,
            base_width: 4,
            input_size: 32,
        }
    }

    fn write_tiny_checkpoint(name: &str) -> PathBuf {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        ResUNet2d::new(tiny_config(), vb).unwrap();

        let path = std::env::temp_dir().join(name);
        varmap.save(&path).unwrap();
        path
    }

    #[test]
    fn load_accepts_matching_checkpoint() {
        let path = write_tiny_checkpoint("cardioseg_loader_ok.safetensors");
        let model = ModelLoader::load(&path, tiny_config(), &Device::Cpu).unwrap();
        assert_eq!(model.input_size(), 32);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn load_rejects_missing_file() {
        let path = PathBuf::from("/nonexistent/cardioseg_weights.safetensors");
        let result = ModelLoader::load(&path, tiny_config(), &Device::Cpu);
        assert!(matches!(result, Err(ModelLoaderError::MissingWeights(_))));
    }

    #[test]
    fn audit_rejects_leftover_keys() {
        let config = tiny_config();
        let mut weights: HashMap<String, Tensor> = ResUNet2d::parameter_names(&config)
            .into_iter()
            .map(|name| {
                let tensor = Tensor::zeros(1, DType::F32, &Device::Cpu).unwrap();
                (name, tensor)
            })
            .collect();
        weights.insert(
            "decoder.extra.weight".to_string(),
            Tensor::zeros(1, DType::F32, &Device::Cpu).unwrap(),
        );

        let result = ModelLoader::audit_names(&weights, &config);
        match result {
            Err(ModelLoaderError::UnexpectedParameters(names)) => {
                assert_eq!(names, vec!["decoder.extra.weight".to_string()]);
            }
            other => panic!("expected UnexpectedParameters, got {other:?}"),
        }
    }

    #[test]
    fn audit_rejects_missing_keys() {
        let config = tiny_config();
        let mut weights: HashMap<String, Tensor> = ResUNet2d::parameter_names(&config)
            .into_iter()
            .map(|name| {
                let tensor = Tensor::zeros(1, DType::F32, &Device::Cpu).unwrap();
                (name, tensor)
            })
            .collect();
        weights.remove("out.bias");

        let result = ModelLoader::audit_names(&weights, &config);
        match result {
            Err(ModelLoaderError::MissingParameters(names)) => {
                assert_eq!(names, vec!["out.bias".to_string()]);
            }
            other => panic!("expected MissingParameters, got {other:?}"),
        }
    }

    #[test]
    fn normalize_strips_distributed_prefix_and_counters() {
        let tensor = || Tensor::zeros(1, DType::F32, &Device::Cpu).unwrap();
        let raw: HashMap<String, Tensor> = [
            ("module.d1.conv.0.weight".to_string(), tensor()),
            ("module.d1.conv.1.num_batches_tracked".to_string(), tensor()),
            ("out.bias".to_string(), tensor()),
        ]
        .into_iter()
        .collect();

        let cleaned = ModelLoader::normalize_keys(raw);
        let mut names: Vec<&str> = cleaned.keys().map(String::as_str).collect();
        names.sort();
        assert_eq!(names, vec!["d1.conv.0.weight", "out.bias"]);
    }

    #[test]
    fn engine_returns_the_same_cached_instance() {
        let path = write_tiny_checkpoint("cardioseg_engine_cache.safetensors");
        let engine = SegmentationEngine::with_config(&path, tiny_config());

        let first = engine.model().unwrap() as *const ResUNet2d;
        let second = engine.model().unwrap() as *const ResUNet2d;
        assert_eq!(first, second);
        std::fs::remove_file(&path).ok();
    }
}
