use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::gate::ReadyStages;
use super::job::JobConfiguration;
use crate::errors::SwapError;
use crate::storage::artifact_store::ArtifactStore;

#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("failed to start collaborator: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("collaborator I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("collaborator exited with status {code}: {detail}")]
    ExitStatus { code: i32, detail: String },
    #[error("{0}")]
    Failed(String),
}

/// The external face-processing pipeline.
#[async_trait]
pub trait Collaborator: Send + Sync {
    /// Accelerator identifiers the collaborator's runtime exposes.
    async fn available_providers(&self) -> Vec<String>;

    /// Reads the configured source and target, writes the output. Runs the
    /// given frame processors in order within a single pass.
    async fn run(
        &self,
        config: &JobConfiguration,
        processors: &[&'static str],
    ) -> Result<(), CollaboratorError>;
}

#[derive(Clone)]
pub struct PipelineExecutor {
    collaborator: Arc<dyn Collaborator>,
    timeout: Duration,
}

impl PipelineExecutor {
    pub fn new(collaborator: Arc<dyn Collaborator>, timeout: Duration) -> Self {
        Self {
            collaborator,
            timeout,
        }
    }

    /// Invokes the collaborator exactly once. Any failure, a timeout, or a
    /// missing/undecodable output all count as a failed execution.
    pub async fn execute(
        &self,
        config: &JobConfiguration,
        stages: &ReadyStages,
    ) -> Result<PathBuf, SwapError> {
        let processors = stages.processor_names();
        log::info!(
            "Job {} executing processors {:?}",
            config.job_id(),
            processors
        );

        match tokio::time::timeout(self.timeout, self.collaborator.run(config, &processors)).await
        {
            Err(_) => {
                log::error!(
                    "Job {} timed out after {}s",
                    config.job_id(),
                    self.timeout.as_secs()
                );
                return Err(SwapError::PipelineExecution(format!(
                    "collaborator timed out after {:?}",
                    self.timeout
                )));
            }
            Ok(Err(e)) => {
                log::error!("Job {} collaborator failed: {}", config.job_id(), e);
                return Err(SwapError::PipelineExecution(e.to_string()));
            }
            Ok(Ok(())) => {}
        }

        let output = config.output_path();
        if !ArtifactStore::is_valid_image(output) {
            log::error!(
                "Job {} finished without a valid artifact at {}",
                config.job_id(),
                output.display()
            );
            return Err(SwapError::PipelineExecution(format!(
                "no valid image at {}",
                output.display()
            )));
        }

        Ok(output.to_path_buf())
    }
}
