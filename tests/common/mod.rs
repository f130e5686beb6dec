#![allow(dead_code)]

use async_trait::async_trait;
use audio_upload_backend::config::UploadConfig;
use audio_upload_backend::services::errors::TranscodeError;
use audio_upload_backend::services::format::TargetFormat;
use audio_upload_backend::services::storage::LocalStorage;
use audio_upload_backend::services::transcoder::Transcoder;
use audio_upload_backend::{AppState, create_app};
use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};
use http_body_util::BodyExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

pub const BOUNDARY: &str = "---------------------------boundary123";
pub const FAKE_MP3: &[u8] = b"ID3\x04\x00\x00\x00\x00\x00\x00converted-audio";

/// Writes a fixed MP3 payload and counts invocations.
#[derive(Default)]
pub struct FakeTranscoder {
    pub calls: AtomicUsize,
}

impl FakeTranscoder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        _target: TargetFormat,
    ) -> Result<(), TranscodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(input.exists(), "original must be on disk before transcoding");
        tokio::fs::write(output, FAKE_MP3).await?;
        Ok(())
    }

    async fn health_check(&self) -> bool {
        true
    }
}

/// Leaves a partial output behind, then fails like a crashed encoder.
pub struct BrokenTranscoder;

#[async_trait]
impl Transcoder for BrokenTranscoder {
    async fn transcode(
        &self,
        _input: &Path,
        output: &Path,
        _target: TargetFormat,
    ) -> Result<(), TranscodeError> {
        tokio::fs::write(output, b"half an mp3").await?;
        Err(TranscodeError::ConversionFailed(
            "Invalid data found when processing input".to_string(),
        ))
    }

    async fn health_check(&self) -> bool {
        false
    }
}

pub struct TestApp {
    pub app: Router,
    pub dir: TempDir,
}

impl TestApp {
    pub fn new(transcoder: Arc<dyn Transcoder>) -> Self {
        Self::with_config(transcoder, |_| {})
    }

    pub fn with_config(transcoder: Arc<dyn Transcoder>, tweak: impl FnOnce(&mut UploadConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = UploadConfig {
            storage_dir: dir.path().to_path_buf(),
            ..UploadConfig::default()
        };
        tweak(&mut config);

        let storage = Arc::new(LocalStorage::new(dir.path()));
        let state = AppState::new(config, storage, transcoder);
        Self {
            app: create_app(state),
            dir,
        }
    }

    /// Visible files in the storage directory, sorted.
    pub fn stored_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    pub fn path_of(&self, filename: &str) -> PathBuf {
        self.dir.path().join(filename)
    }
}

pub fn multipart_body(field: &str, filename: &str, content: &[u8]) -> Vec<u8> {
    let header = format!(
        "--{BOUNDARY}\r\n\
        Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
        Content-Type: application/octet-stream\r\n\r\n"
    );
    let footer = format!("\r\n--{BOUNDARY}--\r\n");

    let mut body = Vec::new();
    body.extend_from_slice(header.as_bytes());
    body.extend_from_slice(content);
    body.extend_from_slice(footer.as_bytes());
    body
}

pub fn upload_request(filename: &str, content: &[u8]) -> Request<Body> {
    upload_request_from(None, filename, content)
}

pub fn upload_request_from(client_ip: Option<&str>, filename: &str, content: &[u8]) -> Request<Body> {
    let body = multipart_body("audio", filename, content);
    let mut builder = Request::builder()
        .method("POST")
        .uri("/upload")
        .header("Host", "media.test")
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .header("Content-Length", body.len());
    if let Some(ip) = client_ip {
        builder = builder.header("X-Forwarded-For", ip);
    }
    builder.body(Body::from(body)).unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

/// Stored filename from a returned upload URL.
pub fn filename_from_url(url: &str) -> String {
    url.rsplit('/').next().unwrap().to_string()
}
