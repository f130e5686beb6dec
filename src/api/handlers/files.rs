use crate::api::error::AppError;
use crate::services::errors::StorageError;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::Response,
};
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;

const SNIFF_LEN: usize = 8 * 1024;

#[utoipa::path(
    get,
    path = "/uploads/{filename}",
    params(
        ("filename" = String, Path, description = "Stored file name, `{uuid}.{ext}`")
    ),
    responses(
        (status = 200, description = "File contents"),
        (status = 404, description = "No such file")
    ),
    tag = "uploads"
)]
pub async fn serve_upload(
    State(state): State<crate::AppState>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    let (mut file, len) = state.storage.open(&filename).await.map_err(|e| match e {
        StorageError::NotFound => AppError::NotFound("Not Found".to_string()),
        other => AppError::Storage(other),
    })?;

    // Peek at the head for sniffing, then stream it back in front of the rest
    let mut head = vec![0u8; SNIFF_LEN.min(len as usize)];
    let n = file.read(&mut head).await.map_err(StorageError::from)?;
    head.truncate(n);

    let content_type = content_type_for(&filename, &head);
    let reader = std::io::Cursor::new(head).chain(file);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, len)
        .header(header::CACHE_CONTROL, "public, max-age=31536000, immutable")
        .body(Body::from_stream(ReaderStream::new(reader)))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))
}

/// Extension first, then magic bytes, then octet-stream.
fn content_type_for(filename: &str, head: &[u8]) -> String {
    let by_extension = filename
        .rsplit_once('.')
        .and_then(|(_, ext)| audio_mime_for_extension(ext));

    by_extension
        .map(|m| m.to_string())
        .or_else(|| infer::get(head).map(|kind| kind.mime_type().to_string()))
        .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string())
}

fn audio_mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "mp3" => Some("audio/mpeg"),
        "wav" => Some("audio/wav"),
        "ogg" | "oga" => Some("audio/ogg"),
        "opus" => Some("audio/opus"),
        "flac" => Some("audio/flac"),
        "m4a" | "mp4" => Some("audio/mp4"),
        "aac" => Some("audio/aac"),
        "webm" => Some("audio/webm"),
        "aif" | "aiff" => Some("audio/aiff"),
        _ => None,
    }
}
