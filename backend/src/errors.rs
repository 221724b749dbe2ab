use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use shared::{ErrorResponse, StageId};

use crate::storage::artifact_store::StorageError;

pub const MISSING_INPUTS_MESSAGE: &str = "Please upload both source and target images";

#[derive(Debug, thiserror::Error)]
pub enum SwapError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Stage not ready: {0}")]
    StageNotReady(StageId),
    #[error("Pipeline execution failed: {0}")]
    PipelineExecution(String),
    #[error("Another swap job is already running")]
    Busy,
    #[error("Upload exceeds the {0} byte limit")]
    UploadTooLarge(usize),
    #[error("Invalid image: {0}")]
    InvalidImage(String),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl SwapError {
    /// Short text for the status panel. Internal details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            SwapError::Configuration(message) => message.clone(),
            SwapError::StageNotReady(stage) => format!(
                "Error: the {} stage is not ready. Check that its model weights are installed.",
                stage
            ),
            SwapError::PipelineExecution(_) => {
                "Error: Failed to process images. Please try again with different images."
                    .to_string()
            }
            SwapError::Busy => {
                "Another swap is already running. Please wait and try again.".to_string()
            }
            SwapError::UploadTooLarge(limit) => {
                format!("Image is too large. The limit is {} MiB.", limit / (1024 * 1024))
            }
            SwapError::InvalidImage(_) => {
                "One of the uploaded files is not a readable image.".to_string()
            }
            SwapError::Storage(_) => "Error: Failed to store images on the server.".to_string(),
        }
    }

    /// Maps upload decoding failures onto request errors.
    pub fn from_upload(err: StorageError) -> Self {
        match err {
            StorageError::FileTooLarge { limit, .. } => SwapError::UploadTooLarge(limit),
            StorageError::InvalidFormat(format) => SwapError::InvalidImage(format),
            StorageError::Image(e) => SwapError::InvalidImage(e.to_string()),
            other => SwapError::Storage(other),
        }
    }
}

impl ResponseError for SwapError {
    fn status_code(&self) -> StatusCode {
        match self {
            SwapError::Configuration(_) | SwapError::InvalidImage(_) => StatusCode::BAD_REQUEST,
            SwapError::UploadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            SwapError::Busy => StatusCode::CONFLICT,
            SwapError::StageNotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            SwapError::PipelineExecution(_) | SwapError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.user_message(),
        })
    }
}
