use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::artifact_store::{ArtifactKind, ArtifactStore, StorageError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedResult {
    pub download_path: Option<PathBuf>,
    pub visible: bool,
}

impl PackagedResult {
    fn hidden() -> Self {
        Self {
            download_path: None,
            visible: false,
        }
    }
}

/// Re-persists a pipeline output under the job's download slot.
#[derive(Debug, Clone)]
pub struct ResultPackager {
    store: ArtifactStore,
}

impl ResultPackager {
    pub fn new(store: ArtifactStore) -> Self {
        Self { store }
    }

    pub fn package(
        &self,
        job_id: Uuid,
        produced: Option<&Path>,
    ) -> Result<PackagedResult, StorageError> {
        let Some(produced) = produced.filter(|path| ArtifactStore::is_valid_image(path)) else {
            log::warn!("Job {} produced no artifact to package", job_id);
            return Ok(PackagedResult::hidden());
        };

        let image = ArtifactStore::open_image(produced)?;
        let download_path = self.store.save_image(job_id, ArtifactKind::Download, &image)?;
        log::info!("Packaged job {} result at {}", job_id, download_path.display());

        Ok(PackagedResult {
            download_path: Some(download_path),
            visible: true,
        })
    }
}
