use crate::api::error::AppError;
use crate::services::errors::AdmissionError;
use crate::services::upload_service::{AdmittedUpload, UPLOAD_FIELD};
use crate::utils::client::PublicOrigin;
use axum::{
    Json,
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::StatusCode,
};
use futures::TryStreamExt;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    /// Public URL of the stored MP3
    pub url: String,
}

/// Multipart form accepted by `POST /upload`
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    #[schema(value_type = String, format = Binary)]
    pub audio: Vec<u8>,
}

#[utoipa::path(
    post,
    path = "/upload",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Stored as MP3", body = UploadResponse),
        (status = 400, description = "No file uploaded or file is too large"),
        (status = 429, description = "Too many uploads from this client"),
        (status = 500, description = "Conversion to MP3 failed")
    ),
    tag = "uploads"
)]
pub async fn upload_audio(
    State(state): State<crate::AppState>,
    origin: PublicOrigin,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let mut multipart = multipart.map_err(|e| {
        tracing::debug!("Rejected non-multipart upload: {}", e);
        AppError::from(AdmissionError::MissingFile {
            field: UPLOAD_FIELD,
        })
    })?;
    let limit = state.upload_service.max_file_size();

    let result: Result<Json<UploadResponse>, AppError> = async {
        let mut admitted: Option<AdmittedUpload> = None;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error(e, limit))?
        {
            // Only the first file part under the expected name is taken;
            // plain form values named `audio` carry no file
            if admitted.is_some() || field.name() != Some(UPLOAD_FIELD) {
                continue;
            }
            let Some(original_filename) = field.file_name().map(|s| s.to_string()) else {
                continue;
            };
            let body = Box::pin(field.map_err(|e| multipart_error(e, limit)));

            admitted = Some(
                state
                    .upload_service
                    .store_original(Some(&original_filename), body)
                    .await?,
            );
        }

        let admitted = admitted.ok_or(AdmissionError::MissingFile {
            field: UPLOAD_FIELD,
        })?;
        let stored = state.upload_service.finalize(admitted).await?;

        Ok(Json(UploadResponse {
            url: origin.url_for(&state.config.public_mount, &stored.filename()),
        }))
    }
    .await;

    match result {
        Ok(res) => Ok(res),
        Err(e) => {
            // Consume the rest of the body so the client sees our response
            // instead of a connection reset.
            while let Ok(Some(mut field)) = multipart.next_field().await {
                while let Ok(Some(_)) = field.chunk().await {}
            }
            Err(e)
        }
    }
}

fn multipart_error(e: MultipartError, limit: usize) -> AdmissionError {
    let err_msg = e.to_string();
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE || err_msg.contains("length limit exceeded") {
        AdmissionError::PayloadTooLarge { limit }
    } else {
        AdmissionError::MalformedBody(err_msg)
    }
}
