use shared::{JobOptions, ProgressEvent};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use super::progress::{ProgressReporter, ProgressSink, QUEUED_MESSAGE};
use super::registry::{download_url, JobRegistry};
use super::slot::{JobSlot, SlotClaim};
use crate::config::{AppConfig, ContentionPolicy};
use crate::errors::{SwapError, MISSING_INPUTS_MESSAGE};
use crate::pipeline::config::ExecutionConfigBuilder;
use crate::pipeline::executor::{Collaborator, PipelineExecutor};
use crate::pipeline::gate::ProcessorReadinessGate;
use crate::pipeline::host::HostIntrospection;
use crate::pipeline::stage::StageRegistry;
use crate::storage::artifact_store::{ArtifactStore, UploadedImage};
use crate::storage::packager::ResultPackager;

pub struct JobRequest {
    pub source: Option<UploadedImage>,
    pub target: Option<UploadedImage>,
    pub options: JobOptions,
}

impl JobRequest {
    pub fn has_inputs(&self) -> bool {
        self.source.is_some() && self.target.is_some()
    }
}

/// A started job. `events` yields every progress event and closes after the
/// terminal one.
pub struct JobHandle {
    pub job_id: Uuid,
    pub events: UnboundedReceiver<ProgressEvent>,
}

/// Forwards events to the HTTP stream and records them in the registry.
struct JobEventSink {
    job_id: Uuid,
    sender: UnboundedSender<ProgressEvent>,
    registry: JobRegistry,
}

impl ProgressSink for JobEventSink {
    fn emit(&self, event: &ProgressEvent) {
        self.registry.record_event(self.job_id, event);
        if self.sender.send(event.clone()).is_err() {
            log::debug!(
                "Client stopped listening to job {}, event {} kept in registry only",
                self.job_id,
                event.sequence
            );
        }
    }
}

/// Runs swap jobs one at a time: configure, gate, execute, package.
#[derive(Clone)]
pub struct JobRunner {
    store: ArtifactStore,
    builder: ExecutionConfigBuilder,
    gate: ProcessorReadinessGate,
    executor: PipelineExecutor,
    packager: ResultPackager,
    registry: JobRegistry,
    slot: JobSlot,
    contention: ContentionPolicy,
    pacing: Duration,
}

impl JobRunner {
    pub fn from_config(
        config: &AppConfig,
        collaborator: Arc<dyn Collaborator>,
        host: Arc<dyn HostIntrospection>,
        available_providers: Vec<String>,
    ) -> Self {
        let store = ArtifactStore::new(&config.storage.workspace_dir);
        let stages = StageRegistry::with_model_stages(
            &config.pipeline.models_dir,
            &config.pipeline.swap_weights,
            &config.pipeline.enhance_weights,
        );

        Self {
            builder: ExecutionConfigBuilder::new(
                store.clone(),
                host,
                config.pipeline.preferred_providers.clone(),
                available_providers,
            ),
            gate: ProcessorReadinessGate::new(stages),
            executor: PipelineExecutor::new(collaborator, config.timeout()),
            packager: ResultPackager::new(store.clone()),
            registry: JobRegistry::new(store.clone(), config.jobs.history_limit),
            slot: JobSlot::new(config.jobs.max_queued),
            contention: config.jobs.contention,
            pacing: config.pacing(),
            store,
        }
    }

    #[cfg(test)]
    pub fn with_stages(mut self, stages: StageRegistry) -> Self {
        self.gate = ProcessorReadinessGate::new(stages);
        self
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn is_busy(&self) -> bool {
        self.slot.is_busy()
    }

    pub fn available_providers(&self) -> &[String] {
        self.builder.available_providers()
    }

    /// Takes the job slot according to the contention policy. Requests
    /// without both inputs claim nothing, they fail before touching it.
    fn admit(&self, request: &JobRequest) -> Result<Option<SlotClaim>, SwapError> {
        if !request.has_inputs() {
            return Ok(None);
        }
        match (self.slot.try_acquire(), self.contention) {
            (Ok(permit), _) => Ok(Some(SlotClaim::Held(permit))),
            (Err(_), ContentionPolicy::Queue) => match self.slot.try_enqueue() {
                Ok(ticket) => Ok(Some(SlotClaim::Waiting(ticket))),
                Err(e) => {
                    log::warn!(
                        "Rejecting swap request: {} job(s) already waiting",
                        self.slot.waiting()
                    );
                    Err(e)
                }
            },
            (Err(e), ContentionPolicy::Reject) => {
                log::warn!("Rejecting swap request: another job is running");
                Err(e)
            }
        }
    }

    /// Admits the request and runs it in the background. Under the reject
    /// policy a busy slot fails here and no job is created.
    pub fn start(&self, request: JobRequest) -> Result<JobHandle, SwapError> {
        let claim = self.admit(&request)?;
        let job_id = Uuid::new_v4();
        self.registry.create(job_id, request.options);
        log::info!(
            "Accepted job {} (enhance: {}, many faces: {})",
            job_id,
            request.options.enhance,
            request.options.many_faces
        );

        let (sender, events) = mpsc::unbounded_channel();
        let sink = Arc::new(JobEventSink {
            job_id,
            sender,
            registry: self.registry.clone(),
        });

        let runner = self.clone();
        actix_web::rt::spawn(async move {
            if let Err(e) = runner.run(job_id, request, claim, sink).await {
                log::warn!("Job {} failed: {}", job_id, e);
            }
        });

        Ok(JobHandle { job_id, events })
    }

    /// Runs one job to its terminal event. Returns the packaged download
    /// path on success.
    pub async fn run(
        &self,
        job_id: Uuid,
        request: JobRequest,
        claim: Option<SlotClaim>,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<PathBuf, SwapError> {
        let mut reporter = ProgressReporter::new(sink, self.pacing);

        if !request.has_inputs() {
            reporter.fail(MISSING_INPUTS_MESSAGE);
            return Err(SwapError::Configuration(MISSING_INPUTS_MESSAGE.to_string()));
        }

        let _permit = match claim {
            Some(SlotClaim::Held(permit)) => permit,
            ticket => {
                reporter.pending(QUEUED_MESSAGE);
                log::info!("Job {} queued behind the running job", job_id);
                let acquired = self.slot.acquire().await;
                drop(ticket);
                match acquired {
                    Ok(permit) => permit,
                    Err(e) => return Err(Self::fail(&mut reporter, e)),
                }
            }
        };

        match self.process(job_id, &request, &mut reporter).await {
            Ok(download_path) => Ok(download_path),
            Err(e) => Err(Self::fail(&mut reporter, e)),
        }
    }

    fn fail(reporter: &mut ProgressReporter, error: SwapError) -> SwapError {
        reporter.fail(&error.user_message());
        error
    }

    async fn process(
        &self,
        job_id: Uuid,
        request: &JobRequest,
        reporter: &mut ProgressReporter,
    ) -> Result<PathBuf, SwapError> {
        let config = self.builder.build(
            job_id,
            request.source.as_ref(),
            request.target.as_ref(),
            &request.options,
        )?;
        let stages = self.gate.check(&config)?;
        log::info!("Job {} passed readiness for {} stage(s)", job_id, stages.len());

        let ((), executed) = tokio::join!(
            reporter.run_script(config.enhancement_enabled()),
            self.executor.execute(&config, &stages)
        );
        let output = executed?;

        let packaged = self.packager.package(job_id, Some(&output))?;
        let Some(download_path) = packaged.download_path.filter(|_| packaged.visible) else {
            return Err(SwapError::PipelineExecution(
                "no artifact to package".to_string(),
            ));
        };

        reporter.succeed(download_url(job_id));
        log::info!("Job {} succeeded", job_id);
        Ok(download_path)
    }
}
