use crate::services::errors::{AdmissionError, StorageError, TranscodeError};
use crate::services::format::TargetFormat;
use crate::services::upload_service::UploadError;
use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

pub const RATE_LIMITED_MESSAGE: &str = "Too many uploads, please try again later.";
pub const NO_FILE_MESSAGE: &str = "No file uploaded or file is too large.";

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error(transparent)]
    Transcode(#[from] TranscodeError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl From<UploadError> for AppError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::Admission(e) => AppError::Admission(e),
            UploadError::Transcode(e) => AppError::Transcode(e),
            UploadError::Storage(e) => AppError::Storage(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Admission(AdmissionError::RateLimited { retry_after }) => {
                let mut response =
                    (StatusCode::TOO_MANY_REQUESTS, RATE_LIMITED_MESSAGE).into_response();
                let seconds = retry_after.as_secs().max(1);
                if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                    response.headers_mut().insert(header::RETRY_AFTER, value);
                }
                return response;
            }
            AppError::Admission(e) => {
                tracing::debug!("Upload rejected: {}", e);
                (StatusCode::BAD_REQUEST, NO_FILE_MESSAGE.to_string())
            }
            AppError::Transcode(e) => {
                tracing::error!("Transcode error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Error converting file to {}.", TargetFormat::Mp3.label()),
                )
            }
            AppError::Storage(StorageError::NotFound) => {
                (StatusCode::NOT_FOUND, "Not Found".to_string())
            }
            AppError::Storage(e) => {
                tracing::error!("Storage error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::Anyhow(e) => {
                tracing::error!("Anyhow error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        (status, message).into_response()
    }
}
