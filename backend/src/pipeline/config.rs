use shared::JobOptions;
use std::sync::Arc;
use uuid::Uuid;

use super::host::{resolve_execution_providers, HostIntrospection};
use super::job::{ExecutionBudget, JobConfiguration, JobPaths};
use crate::errors::{SwapError, MISSING_INPUTS_MESSAGE};
use crate::storage::artifact_store::{ArtifactKind, ArtifactStore, UploadedImage};

/// Turns one request plus host introspection into a `JobConfiguration`.
#[derive(Clone)]
pub struct ExecutionConfigBuilder {
    store: ArtifactStore,
    host: Arc<dyn HostIntrospection>,
    preferred_providers: Vec<String>,
    available_providers: Vec<String>,
}

impl ExecutionConfigBuilder {
    pub fn new(
        store: ArtifactStore,
        host: Arc<dyn HostIntrospection>,
        preferred_providers: Vec<String>,
        available_providers: Vec<String>,
    ) -> Self {
        Self {
            store,
            host,
            preferred_providers,
            available_providers,
        }
    }

    pub fn available_providers(&self) -> &[String] {
        &self.available_providers
    }

    /// Persists both inputs and returns the immutable configuration. Nothing
    /// is written when either input is missing.
    pub fn build(
        &self,
        job_id: Uuid,
        source: Option<&UploadedImage>,
        target: Option<&UploadedImage>,
        options: &JobOptions,
    ) -> Result<JobConfiguration, SwapError> {
        let (Some(source), Some(target)) = (source, target) else {
            return Err(SwapError::Configuration(MISSING_INPUTS_MESSAGE.to_string()));
        };

        let source_path = self
            .store
            .save_image(job_id, ArtifactKind::Source, &source.image)?;
        let target_path = self
            .store
            .save_image(job_id, ArtifactKind::Target, &target.image)?;
        log::info!(
            "Job {} inputs stored (source sha256 {}, target sha256 {})",
            job_id,
            source.digest,
            target.digest
        );

        let providers =
            resolve_execution_providers(&self.preferred_providers, &self.available_providers);
        let threads = self.host.suggest_execution_threads(&providers);
        let max_memory_bytes = self.host.suggest_max_memory_bytes();

        let config = JobConfiguration::new(
            job_id,
            JobPaths {
                source: source_path,
                target: target_path,
                output: self.store.path_for(job_id, ArtifactKind::Output),
            },
            options.enhance,
            options.many_faces,
            ExecutionBudget {
                max_memory_bytes,
                providers,
                threads,
            },
        );

        log::info!(
            "Job {} configured: stages {:?}, providers {:?}, {} threads, {} GiB ({} bytes)",
            job_id,
            config.enabled_stages(),
            config.execution_providers(),
            config.execution_thread_count(),
            config.max_memory_gib(),
            config.max_memory_bytes()
        );
        Ok(config)
    }
}
