use shared::StageId;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::job::JobConfiguration;
use crate::storage::artifact_store::ArtifactStore;

/// A processing capability selected by `JobConfiguration::enabled_stages`.
///
/// All enabled stages execute together in the collaborator's single pass, so
/// a stage only has to answer whether it can run and which collaborator
/// processor carries it out.
pub trait ProcessingStage: Send + Sync {
    fn id(&self) -> StageId;

    /// Name of the collaborator frame processor that performs this stage.
    fn processor_name(&self) -> &'static str;

    fn is_ready(&self, config: &JobConfiguration) -> bool;
}

fn weights_present(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

fn device_available(config: &JobConfiguration) -> bool {
    !config.execution_providers().is_empty()
}

pub struct FaceSwapStage {
    weights: PathBuf,
}

impl FaceSwapStage {
    pub fn new(weights: impl Into<PathBuf>) -> Self {
        Self {
            weights: weights.into(),
        }
    }
}

impl ProcessingStage for FaceSwapStage {
    fn id(&self) -> StageId {
        StageId::Swap
    }

    fn processor_name(&self) -> &'static str {
        "face_swapper"
    }

    fn is_ready(&self, config: &JobConfiguration) -> bool {
        if !weights_present(&self.weights) {
            log::warn!("Face swapper weights missing at {}", self.weights.display());
            return false;
        }
        if !ArtifactStore::is_valid_image(config.source_path())
            || !ArtifactStore::is_valid_image(config.target_path())
        {
            log::warn!("Job {} inputs are not readable images", config.job_id());
            return false;
        }
        device_available(config)
    }
}

pub struct FaceEnhanceStage {
    weights: PathBuf,
}

impl FaceEnhanceStage {
    pub fn new(weights: impl Into<PathBuf>) -> Self {
        Self {
            weights: weights.into(),
        }
    }
}

impl ProcessingStage for FaceEnhanceStage {
    fn id(&self) -> StageId {
        StageId::Enhance
    }

    fn processor_name(&self) -> &'static str {
        "face_enhancer"
    }

    fn is_ready(&self, config: &JobConfiguration) -> bool {
        if !weights_present(&self.weights) {
            log::warn!("Face enhancer weights missing at {}", self.weights.display());
            return false;
        }
        device_available(config)
    }
}

/// Maps stage identifiers to their implementations.
#[derive(Clone, Default)]
pub struct StageRegistry {
    stages: Vec<Arc<dyn ProcessingStage>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the swap and enhance stages backed by weights in `models_dir`.
    pub fn with_model_stages(models_dir: &Path, swap_weights: &str, enhance_weights: &str) -> Self {
        Self::new()
            .register(Arc::new(FaceSwapStage::new(models_dir.join(swap_weights))))
            .register(Arc::new(FaceEnhanceStage::new(models_dir.join(enhance_weights))))
    }

    /// Adds a stage, replacing any earlier stage with the same id.
    pub fn register(mut self, stage: Arc<dyn ProcessingStage>) -> Self {
        self.stages.retain(|existing| existing.id() != stage.id());
        self.stages.push(stage);
        self
    }

    pub fn resolve(&self, id: StageId) -> Option<Arc<dyn ProcessingStage>> {
        self.stages.iter().find(|stage| stage.id() == id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{job_config_in, write_weights};
    use tempfile::TempDir;

    #[test]
    fn test_swap_stage_requires_weights() {
        let dir = TempDir::new().unwrap();
        let config = job_config_in(dir.path(), false);
        let stage = FaceSwapStage::new(dir.path().join("models/inswapper_128.onnx"));

        assert!(!stage.is_ready(&config));
        write_weights(&dir.path().join("models"), "inswapper_128.onnx");
        assert!(stage.is_ready(&config));
    }

    #[test]
    fn test_empty_weights_file_is_not_ready() {
        let dir = TempDir::new().unwrap();
        let config = job_config_in(dir.path(), true);
        let weights = dir.path().join("GFPGANv1.4.pth");
        std::fs::write(&weights, b"").unwrap();

        assert!(!FaceEnhanceStage::new(&weights).is_ready(&config));
    }

    #[test]
    fn test_registry_resolves_by_id() {
        let registry = StageRegistry::with_model_stages(Path::new("/models"), "a.onnx", "b.pth");
        assert_eq!(registry.resolve(StageId::Swap).unwrap().processor_name(), "face_swapper");
        assert_eq!(
            registry.resolve(StageId::Enhance).unwrap().processor_name(),
            "face_enhancer"
        );
        assert!(StageRegistry::new().resolve(StageId::Swap).is_none());
    }
}
