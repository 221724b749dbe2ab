use image::{DynamicImage, ImageFormat, ImageReader};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// The four files a job reads or writes inside its directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Source,
    Target,
    Output,
    Download,
}

impl ArtifactKind {
    pub fn file_name(self) -> &'static str {
        match self {
            ArtifactKind::Source => "input.jpg",
            ArtifactKind::Target => "target.jpg",
            ArtifactKind::Output => "output.png",
            ArtifactKind::Download => "swapped_result.png",
        }
    }

    fn format(self) -> ImageFormat {
        match self {
            ArtifactKind::Source | ArtifactKind::Target => ImageFormat::Jpeg,
            ArtifactKind::Output | ArtifactKind::Download => ImageFormat::Png,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Invalid file format: {0}")]
    InvalidFormat(String),
    #[error("File too large: {size} bytes exceeds the {limit} byte limit")]
    FileTooLarge { size: usize, limit: usize },
}

/// A decoded upload. Written once to the store and never mutated.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub image: DynamicImage,
    pub byte_len: usize,
    pub digest: String,
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn job_dir(&self, job_id: Uuid) -> PathBuf {
        self.root.join("jobs").join(job_id.to_string())
    }

    pub fn path_for(&self, job_id: Uuid, kind: ArtifactKind) -> PathBuf {
        self.job_dir(job_id).join(kind.file_name())
    }

    pub fn calculate_image_hash(image_data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(image_data);
        hex::encode(hasher.finalize())
    }

    pub fn extract_file_extension(mime_type: &str) -> Result<&'static str, StorageError> {
        match mime_type {
            "image/jpeg" | "image/jpg" => Ok("jpg"),
            "image/png" => Ok("png"),
            "image/webp" => Ok("webp"),
            "image/gif" => Ok("gif"),
            other => Err(StorageError::InvalidFormat(other.to_string())),
        }
    }

    pub fn validate_image_size(image_data: &[u8], limit: usize) -> Result<(), StorageError> {
        if image_data.len() > limit {
            return Err(StorageError::FileTooLarge {
                size: image_data.len(),
                limit,
            });
        }
        Ok(())
    }

    /// Validates and decodes raw upload bytes. Browsers sometimes send
    /// `application/octet-stream`, in which case the format is sniffed.
    pub fn decode_upload(
        image_data: &[u8],
        mime_type: Option<&str>,
        limit: usize,
    ) -> Result<UploadedImage, StorageError> {
        Self::validate_image_size(image_data, limit)?;

        if let Some(mime) = mime_type.filter(|m| m.starts_with("image/")) {
            Self::extract_file_extension(mime)?;
        }

        let image = ImageReader::new(Cursor::new(image_data))
            .with_guessed_format()?
            .decode()?;

        Ok(UploadedImage {
            image,
            byte_len: image_data.len(),
            digest: Self::calculate_image_hash(image_data),
        })
    }

    /// Writes `image` to the job's slot for `kind`, replacing any previous file.
    pub fn save_image(
        &self,
        job_id: Uuid,
        kind: ArtifactKind,
        image: &DynamicImage,
    ) -> Result<PathBuf, StorageError> {
        fs::create_dir_all(self.job_dir(job_id))?;
        let path = self.path_for(job_id, kind);

        match kind.format() {
            // JPEG has no alpha channel.
            ImageFormat::Jpeg => {
                DynamicImage::ImageRgb8(image.to_rgb8()).save_with_format(&path, ImageFormat::Jpeg)?
            }
            format => image.save_with_format(&path, format)?,
        }

        log::debug!("Stored {} for job {}", kind.file_name(), job_id);
        Ok(path)
    }

    pub fn open_image(path: &Path) -> Result<DynamicImage, StorageError> {
        Ok(image::open(path)?)
    }

    pub fn is_valid_image(path: &Path) -> bool {
        path.is_file() && image::open(path).is_ok()
    }

    pub fn remove_job(&self, job_id: Uuid) -> Result<(), StorageError> {
        let dir = self.job_dir(job_id);
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        Ok(())
    }
}
