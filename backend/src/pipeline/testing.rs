//! Test doubles for the collaborator, host and stages.

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, RgbImage};
use shared::{ProgressEvent, StageId};
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use super::executor::{Collaborator, CollaboratorError};
use super::host::HostIntrospection;
use super::job::{ExecutionBudget, JobConfiguration, JobPaths};
use super::stage::ProcessingStage;
use crate::config::AppConfig;
use crate::jobs::progress::ProgressSink;
use crate::storage::artifact_store::{ArtifactKind, ArtifactStore, UploadedImage};

const GIB: u64 = 1024 * 1024 * 1024;

pub fn sample_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 13 % 256) as u8, (y * 7 % 256) as u8, 128])
    }))
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    sample_image(width, height)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

pub fn sample_upload(width: u32, height: u32) -> UploadedImage {
    let bytes = png_bytes(width, height);
    ArtifactStore::decode_upload(&bytes, Some("image/png"), bytes.len()).unwrap()
}

pub fn write_weights(models_dir: &Path, name: &str) {
    std::fs::create_dir_all(models_dir).unwrap();
    std::fs::write(models_dir.join(name), b"weights").unwrap();
}

/// A configuration whose inputs exist on disk under `root`.
pub fn job_config_in(root: &Path, enhance: bool) -> JobConfiguration {
    job_config_with_faces(root, enhance, false)
}

pub fn job_config_with_faces(root: &Path, enhance: bool, many_faces: bool) -> JobConfiguration {
    let store = ArtifactStore::new(root);
    let job_id = Uuid::new_v4();
    let image = sample_image(8, 8);
    JobConfiguration::new(
        job_id,
        JobPaths {
            source: store.save_image(job_id, ArtifactKind::Source, &image).unwrap(),
            target: store.save_image(job_id, ArtifactKind::Target, &image).unwrap(),
            output: store.path_for(job_id, ArtifactKind::Output),
        },
        enhance,
        many_faces,
        ExecutionBudget {
            max_memory_bytes: 2 * GIB,
            providers: vec!["cpu".to_string()],
            threads: 2,
        },
    )
}

/// Application config rooted in a temp dir with weights for both stages and
/// no pacing delay.
pub fn test_app_config(root: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.storage.workspace_dir = root.join("workspace");
    config.pipeline.models_dir = root.join("models");
    config.server.frontend_dir = root.join("dist");
    config.jobs.pacing_ms = 0;
    config.pipeline.timeout_secs = 5;
    write_weights(&config.pipeline.models_dir, &config.pipeline.swap_weights);
    write_weights(&config.pipeline.models_dir, &config.pipeline.enhance_weights);
    std::fs::create_dir_all(&config.server.frontend_dir).unwrap();
    config
}

pub struct FixedHost {
    pub memory_bytes: u64,
    pub threads: usize,
}

impl Default for FixedHost {
    fn default() -> Self {
        Self {
            memory_bytes: 4 * GIB,
            threads: 3,
        }
    }
}

impl HostIntrospection for FixedHost {
    fn suggest_max_memory_bytes(&self) -> u64 {
        self.memory_bytes
    }

    fn suggest_execution_threads(&self, _providers: &[String]) -> usize {
        self.threads
    }
}

#[derive(Debug, Clone)]
pub enum FakeOutcome {
    WriteOutput,
    Fail(String),
    ExitWithoutOutput,
    Hang,
}

/// Records invocations and either writes an output image or fails.
pub struct FakeCollaborator {
    outcome: FakeOutcome,
    calls: AtomicUsize,
    processors: Mutex<Vec<&'static str>>,
    delay: Duration,
}

impl FakeCollaborator {
    pub fn new(outcome: FakeOutcome) -> Self {
        Self {
            outcome,
            calls: AtomicUsize::new(0),
            processors: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_processors(&self) -> Vec<&'static str> {
        self.processors.lock().unwrap().clone()
    }
}

#[async_trait]
impl Collaborator for FakeCollaborator {
    async fn available_providers(&self) -> Vec<String> {
        vec!["CPUExecutionProvider".to_string()]
    }

    async fn run(
        &self,
        config: &JobConfiguration,
        processors: &[&'static str],
    ) -> Result<(), CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.processors.lock().unwrap() = processors.to_vec();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match &self.outcome {
            FakeOutcome::WriteOutput => {
                let target = image::open(config.target_path()).map_err(|e| {
                    CollaboratorError::Failed(format!("cannot read target: {}", e))
                })?;
                target
                    .save_with_format(config.output_path(), ImageFormat::Png)
                    .map_err(|e| CollaboratorError::Failed(e.to_string()))?;
                Ok(())
            }
            FakeOutcome::Fail(message) => Err(CollaboratorError::Failed(message.clone())),
            FakeOutcome::ExitWithoutOutput => Ok(()),
            FakeOutcome::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }
}

/// Stage with a fixed readiness answer that counts how often it was asked.
pub struct ScriptedStage {
    id: StageId,
    ready: bool,
    checks: AtomicUsize,
}

impl ScriptedStage {
    pub fn new(id: StageId, ready: bool) -> Arc<Self> {
        Arc::new(Self {
            id,
            ready,
            checks: AtomicUsize::new(0),
        })
    }

    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

impl ProcessingStage for ScriptedStage {
    fn id(&self) -> StageId {
        self.id
    }

    fn processor_name(&self) -> &'static str {
        match self.id {
            StageId::Swap => "swap_processor",
            StageId::Enhance => "enhance_processor",
        }
    }

    fn is_ready(&self, _config: &JobConfiguration) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.ready
    }
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.message).collect()
    }
}

impl ProgressSink for RecordingSink {
    fn emit(&self, event: &ProgressEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
