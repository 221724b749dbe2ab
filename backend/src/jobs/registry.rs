use chrono::Utc;
use shared::{JobOptions, JobPhase, JobSnapshot, ProgressEvent};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::storage::artifact_store::ArtifactStore;

pub fn output_url(job_id: Uuid) -> String {
    format!("/api/jobs/{}/output", job_id)
}

pub fn download_url(job_id: Uuid) -> String {
    format!("/api/jobs/{}/download", job_id)
}

#[derive(Default)]
struct RegistryState {
    jobs: HashMap<Uuid, JobSnapshot>,
    order: VecDeque<Uuid>,
}

/// Recent jobs and the events they produced, for polling after the stream
/// has closed. Finished jobs beyond `history_limit` are dropped together with
/// their job directory.
#[derive(Clone)]
pub struct JobRegistry {
    state: Arc<Mutex<RegistryState>>,
    store: ArtifactStore,
    history_limit: usize,
}

impl JobRegistry {
    pub fn new(store: ArtifactStore, history_limit: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(RegistryState::default())),
            store,
            history_limit: history_limit.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            log::warn!("Job registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn create(&self, job_id: Uuid, options: JobOptions) -> JobSnapshot {
        let now = Utc::now().to_rfc3339();
        let snapshot = JobSnapshot {
            id: job_id,
            status: JobPhase::Pending,
            options,
            events: Vec::new(),
            output_url: None,
            download_url: None,
            created_at: now.clone(),
            updated_at: now,
        };

        let evicted = {
            let mut state = self.lock();
            state.jobs.insert(job_id, snapshot.clone());
            state.order.push_back(job_id);
            self.evict(&mut state)
        };

        for old in evicted {
            if let Err(e) = self.store.remove_job(old) {
                log::warn!("Failed to remove directory of evicted job {}: {}", old, e);
            } else {
                log::debug!("Evicted job {} from history", old);
            }
        }
        snapshot
    }

    /// Picks the oldest finished jobs until the history fits the limit.
    /// Jobs still in flight are never evicted.
    fn evict(&self, state: &mut RegistryState) -> Vec<Uuid> {
        let mut evicted = Vec::new();
        while state.order.len() > self.history_limit {
            let Some(position) = state.order.iter().position(|id| {
                state
                    .jobs
                    .get(id)
                    .is_none_or(|job| job.status.is_terminal())
            }) else {
                break;
            };
            if let Some(id) = state.order.remove(position) {
                state.jobs.remove(&id);
                evicted.push(id);
            }
        }
        evicted
    }

    pub fn record_event(&self, job_id: Uuid, event: &ProgressEvent) {
        let mut state = self.lock();
        let Some(job) = state.jobs.get_mut(&job_id) else {
            log::warn!("Event for unknown job {}: {}", job_id, event.message);
            return;
        };

        job.status = event.phase;
        if event.phase == JobPhase::Succeeded && event.artifact_visible {
            job.output_url = Some(output_url(job_id));
            job.download_url = Some(download_url(job_id));
        }
        job.events.push(event.clone());
        job.updated_at = Utc::now().to_rfc3339();
    }

    pub fn get(&self, job_id: Uuid) -> Option<JobSnapshot> {
        self.lock().jobs.get(&job_id).cloned()
    }

    pub fn status(&self, job_id: Uuid) -> Option<JobPhase> {
        self.lock().jobs.get(&job_id).map(|job| job.status)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().jobs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn event(sequence: u32, phase: JobPhase, visible: bool) -> ProgressEvent {
        ProgressEvent {
            sequence,
            message: format!("event {}", sequence),
            phase,
            artifact_path: None,
            artifact_visible: visible,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    #[test]
    fn test_events_update_snapshot() {
        let dir = TempDir::new().unwrap();
        let registry = JobRegistry::new(ArtifactStore::new(dir.path()), 4);
        let id = Uuid::new_v4();
        registry.create(id, JobOptions::default());

        registry.record_event(id, &event(0, JobPhase::Running, false));
        assert_eq!(registry.status(id), Some(JobPhase::Running));
        assert!(registry.get(id).unwrap().download_url.is_none());

        registry.record_event(id, &event(1, JobPhase::Succeeded, true));
        let snapshot = registry.get(id).unwrap();
        assert_eq!(snapshot.status, JobPhase::Succeeded);
        assert_eq!(snapshot.events.len(), 2);
        assert_eq!(snapshot.download_url, Some(download_url(id)));
        assert_eq!(snapshot.output_url, Some(output_url(id)));
    }

    #[test]
    fn test_unknown_job() {
        let dir = TempDir::new().unwrap();
        let registry = JobRegistry::new(ArtifactStore::new(dir.path()), 4);
        let id = Uuid::new_v4();

        registry.record_event(id, &event(0, JobPhase::Running, false));
        assert!(registry.get(id).is_none());
    }

    #[test]
    fn test_history_evicts_oldest_finished_job() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let registry = JobRegistry::new(store.clone(), 2);

        let running = Uuid::new_v4();
        let finished = Uuid::new_v4();
        registry.create(running, JobOptions::default());
        registry.create(finished, JobOptions::default());
        registry.record_event(finished, &event(0, JobPhase::Failed, false));
        std::fs::create_dir_all(store.job_dir(finished)).unwrap();

        let newest = Uuid::new_v4();
        registry.create(newest, JobOptions::default());

        assert_eq!(registry.len(), 2);
        assert!(registry.get(running).is_some());
        assert!(registry.get(finished).is_none());
        assert!(!store.job_dir(finished).exists());
    }
}
