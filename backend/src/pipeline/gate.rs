use std::sync::Arc;

use super::job::JobConfiguration;
use super::stage::{ProcessingStage, StageRegistry};
use crate::errors::SwapError;

/// Stages that passed their readiness checks, in execution order. Only the
/// gate can produce one, so holding it proves the job was checked.
pub struct ReadyStages {
    stages: Vec<Arc<dyn ProcessingStage>>,
}

impl ReadyStages {
    pub fn processor_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.processor_name()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }
}

#[derive(Clone)]
pub struct ProcessorReadinessGate {
    registry: StageRegistry,
}

impl ProcessorReadinessGate {
    pub fn new(registry: StageRegistry) -> Self {
        Self { registry }
    }

    /// Checks every enabled stage in order and stops at the first one that is
    /// not ready; later stages are never asked.
    pub fn check(&self, config: &JobConfiguration) -> Result<ReadyStages, SwapError> {
        let mut stages = Vec::with_capacity(config.enabled_stages().len());

        for &id in config.enabled_stages() {
            let Some(stage) = self.registry.resolve(id) else {
                log::error!("No implementation registered for stage {}", id);
                return Err(SwapError::StageNotReady(id));
            };
            if !stage.is_ready(config) {
                log::warn!("Job {} aborted: stage {} is not ready", config.job_id(), id);
                return Err(SwapError::StageNotReady(id));
            }
            log::debug!("Stage {} ready for job {}", id, config.job_id());
            stages.push(stage);
        }

        Ok(ReadyStages { stages })
    }
}
