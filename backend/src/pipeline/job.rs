use shared::StageId;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const GIB: u64 = 1024 * 1024 * 1024;

/// Everything one run of the collaborator needs. Built once per job by
/// `ExecutionConfigBuilder` and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobConfiguration {
    job_id: Uuid,
    source_path: PathBuf,
    target_path: PathBuf,
    output_path: PathBuf,
    enabled_stages: Vec<StageId>,
    detect_all_faces: bool,
    max_memory_bytes: u64,
    execution_providers: Vec<String>,
    execution_thread_count: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct JobPaths {
    pub source: PathBuf,
    pub target: PathBuf,
    pub output: PathBuf,
}

#[derive(Debug, Clone)]
pub(crate) struct ExecutionBudget {
    pub max_memory_bytes: u64,
    pub providers: Vec<String>,
    pub threads: usize,
}

/// Stage list for a job: the swap always runs, enhancement only on request
/// and always after it.
pub fn stages_for(enhance: bool) -> Vec<StageId> {
    if enhance {
        vec![StageId::Swap, StageId::Enhance]
    } else {
        vec![StageId::Swap]
    }
}

impl JobConfiguration {
    pub(crate) fn new(
        job_id: Uuid,
        paths: JobPaths,
        enhance: bool,
        detect_all_faces: bool,
        budget: ExecutionBudget,
    ) -> Self {
        Self {
            job_id,
            source_path: paths.source,
            target_path: paths.target,
            output_path: paths.output,
            enabled_stages: stages_for(enhance),
            detect_all_faces,
            max_memory_bytes: budget.max_memory_bytes,
            execution_providers: budget.providers,
            execution_thread_count: budget.threads.max(1),
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn target_path(&self) -> &Path {
        &self.target_path
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn enabled_stages(&self) -> &[StageId] {
        &self.enabled_stages
    }

    pub fn enhancement_enabled(&self) -> bool {
        self.enabled_stages.contains(&StageId::Enhance)
    }

    pub fn detect_all_faces(&self) -> bool {
        self.detect_all_faces
    }

    pub fn max_memory_bytes(&self) -> u64 {
        self.max_memory_bytes
    }

    /// Memory budget in whole GiB, never below one.
    pub fn max_memory_gib(&self) -> u64 {
        (self.max_memory_bytes / GIB).max(1)
    }

    pub fn execution_providers(&self) -> &[String] {
        &self.execution_providers
    }

    pub fn execution_thread_count(&self) -> usize {
        self.execution_thread_count
    }
}
