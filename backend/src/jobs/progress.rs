use chrono::Utc;
use shared::{JobPhase, ProgressEvent};
use std::sync::Arc;
use std::time::Duration;

pub const ANALYZING_MESSAGE: &str = "Processing (estimated): Analyzing faces and detecting features...";
pub const LANDMARKS_MESSAGE: &str =
    "Processing (estimated): Extracting facial landmarks and matching features...";
pub const SWAPPING_MESSAGE: &str =
    "Processing (estimated): Swapping faces and applying transformations...";
pub const ENHANCING_MESSAGE: &str =
    "Processing (estimated): Enhancing face quality and refining details...";
pub const QUEUED_MESSAGE: &str = "Waiting for the running job to finish";
pub const SUCCESS_MESSAGE: &str = "Processing complete! Result is ready for download.";

/// Receives every event a job produces, in order.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: &ProgressEvent);
}

/// Status messages shown while the collaborator runs. They are paced by time
/// only and do not reflect the collaborator's real progress.
pub fn estimated_stages(enhance: bool) -> Vec<&'static str> {
    let mut messages = vec![ANALYZING_MESSAGE, LANDMARKS_MESSAGE, SWAPPING_MESSAGE];
    if enhance {
        messages.push(ENHANCING_MESSAGE);
    }
    messages
}

/// Numbers events and guarantees a single terminal event per job.
pub struct ProgressReporter {
    sink: Arc<dyn ProgressSink>,
    pacing: Duration,
    next_sequence: u32,
    finished: bool,
}

impl ProgressReporter {
    pub fn new(sink: Arc<dyn ProgressSink>, pacing: Duration) -> Self {
        Self {
            sink,
            pacing,
            next_sequence: 0,
            finished: false,
        }
    }

    #[cfg(test)]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn emit(
        &mut self,
        message: &str,
        phase: JobPhase,
        artifact_path: Option<String>,
        artifact_visible: bool,
    ) -> bool {
        if self.finished {
            log::warn!("Dropping event after terminal state: {}", message);
            return false;
        }

        let event = ProgressEvent {
            sequence: self.next_sequence,
            message: message.to_string(),
            phase,
            artifact_path,
            artifact_visible,
            timestamp: Utc::now().to_rfc3339(),
        };
        self.next_sequence += 1;
        self.finished = phase.is_terminal();
        self.sink.emit(&event);
        true
    }

    pub fn pending(&mut self, message: &str) -> bool {
        self.emit(message, JobPhase::Pending, None, false)
    }

    pub fn running(&mut self, message: &str) -> bool {
        self.emit(message, JobPhase::Running, None, false)
    }

    /// Emits the estimated stage messages with the pacing delay between them.
    /// Stops early if the job already reached a terminal state.
    pub async fn run_script(&mut self, enhance: bool) {
        for (index, message) in estimated_stages(enhance).into_iter().enumerate() {
            if index > 0 && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }
            if !self.running(message) {
                return;
            }
        }
    }

    pub fn succeed(&mut self, download_url: String) -> bool {
        self.emit(SUCCESS_MESSAGE, JobPhase::Succeeded, Some(download_url), true)
    }

    pub fn fail(&mut self, message: &str) -> bool {
        self.emit(message, JobPhase::Failed, None, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::RecordingSink;
    use pretty_assertions::assert_eq;

    fn reporter() -> (Arc<RecordingSink>, ProgressReporter) {
        let sink = Arc::new(RecordingSink::default());
        let reporter = ProgressReporter::new(sink.clone(), Duration::ZERO);
        (sink, reporter)
    }

    #[tokio::test]
    async fn test_script_without_enhancer() {
        let (sink, mut reporter) = reporter();
        reporter.run_script(false).await;
        reporter.succeed("/api/jobs/x/download".into());

        assert_eq!(
            sink.messages(),
            vec![ANALYZING_MESSAGE, LANDMARKS_MESSAGE, SWAPPING_MESSAGE, SUCCESS_MESSAGE]
        );
        let events = sink.events();
        let sequences: Vec<u32> = events.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2, 3]);
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(events[3].artifact_visible);
    }

    #[tokio::test]
    async fn test_enhancing_comes_after_swapping() {
        let (sink, mut reporter) = reporter();
        reporter.run_script(true).await;

        let messages = sink.messages();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2], SWAPPING_MESSAGE);
        assert_eq!(messages[3], ENHANCING_MESSAGE);
    }

    #[test]
    fn test_single_terminal_event() {
        let (sink, mut reporter) = reporter();
        assert!(reporter.fail("Please upload both source and target images"));
        assert!(!reporter.succeed("/late".into()));
        assert!(!reporter.running(ANALYZING_MESSAGE));

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].phase, JobPhase::Failed);
        assert!(events[0].artifact_path.is_none());
        assert!(reporter.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_between_events() {
        let sink = Arc::new(RecordingSink::default());
        let mut reporter = ProgressReporter::new(sink.clone(), Duration::from_secs(1));
        let started = tokio::time::Instant::now();

        reporter.run_script(true).await;

        assert_eq!(sink.events().len(), 4);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }
}
