use crate::services::conversion::ConversionService;
use crate::services::errors::{AdmissionError, StorageError, TranscodeError};
use crate::services::format::{FormatDecision, classify};
use crate::services::storage::{FileRole, LocalStorage, StoredFile, sanitize_extension};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Multipart field carrying the upload
pub const UPLOAD_FIELD: &str = "audio";

#[derive(Error, Debug)]
pub enum UploadError {
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error(transparent)]
    Transcode(#[from] TranscodeError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// An original that has been fully received and placed under its final name.
///
/// Until `UploadService::finalize` reaches a terminal outcome the file is
/// owned by the request: dropping this value (client gone, later error in
/// the body) deletes it again.
pub struct AdmittedUpload {
    file: StoredFile,
    guard: AbandonGuard,
}

impl AdmittedUpload {
    pub fn file(&self) -> &StoredFile {
        &self.file
    }
}

/// Upload pipeline: store the original, then pass it through or convert it
/// and drop the superseded original.
pub struct UploadService {
    storage: Arc<LocalStorage>,
    conversion: Arc<ConversionService>,
    max_file_size: usize,
}

impl UploadService {
    pub fn new(
        storage: Arc<LocalStorage>,
        conversion: Arc<ConversionService>,
        max_file_size: usize,
    ) -> Self {
        Self {
            storage,
            conversion,
            max_file_size,
        }
    }

    pub fn max_file_size(&self) -> usize {
        self.max_file_size
    }

    /// Streams the upload body into storage, enforcing the size ceiling.
    ///
    /// Bytes go to a hidden staging file first; an oversized or broken body
    /// never reaches a `{uuid}.{ext}` name.
    pub async fn store_original<S>(
        &self,
        original_filename: Option<&str>,
        mut body: S,
    ) -> Result<AdmittedUpload, UploadError>
    where
        S: Stream<Item = Result<Bytes, AdmissionError>> + Unpin,
    {
        let extension = original_filename.and_then(sanitize_extension);
        let mut staging = self.storage.create_staging()?;

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            if staging.written() + chunk.len() > self.max_file_size {
                tracing::warn!(
                    received = staging.written() + chunk.len(),
                    limit = self.max_file_size,
                    "Upload exceeds size limit, discarding"
                );
                return Err(AdmissionError::PayloadTooLarge {
                    limit: self.max_file_size,
                }
                .into());
            }
            staging.write_chunk(&chunk).await?;
        }

        let received = staging.written();
        let file = self
            .storage
            .place(extension.as_deref(), FileRole::OriginalUpload);
        staging.commit(&file).await?;

        tracing::info!(
            file_id = %file.id,
            filename = %file.filename(),
            bytes = received,
            "Stored original upload"
        );

        Ok(AdmittedUpload {
            guard: AbandonGuard::new(file.path.clone()),
            file,
        })
    }

    /// Produces the one artifact the response will point at.
    ///
    /// On conversion failure the original stays on disk but nothing refers
    /// to it.
    pub async fn finalize(&self, upload: AdmittedUpload) -> Result<StoredFile, UploadError> {
        let AdmittedUpload { file, guard } = upload;

        match classify(file.extension.as_deref(), self.conversion.target()) {
            FormatDecision::AlreadyTarget => {
                guard.disarm();
                tracing::info!(file_id = %file.id, "Already in target format, no conversion");
                Ok(file)
            }
            FormatDecision::NeedsConversion => match self.conversion.convert(&file).await {
                Ok(artifact) => {
                    guard.disarm();
                    self.cleanup_original(&file).await;
                    Ok(artifact)
                }
                Err(e) => {
                    guard.disarm();
                    tracing::warn!(
                        file_id = %file.id,
                        "Keeping original after failed conversion"
                    );
                    Err(e.into())
                }
            },
        }
    }

    async fn cleanup_original(&self, original: &StoredFile) {
        match self.storage.remove(original).await {
            Ok(()) => tracing::debug!(file_id = %original.id, "Removed superseded original"),
            Err(e) => tracing::warn!(file_id = %original.id, "Cleanup failed: {}", e),
        }
    }
}

/// Deletes a stored file when dropped while still armed.
struct AbandonGuard {
    path: Option<PathBuf>,
}

impl AbandonGuard {
    fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    fn disarm(mut self) {
        self.path = None;
    }
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            tracing::warn!(path = %path.display(), "Upload abandoned, removing stored original");
            // Drop cannot await: unlink inline so the file is gone with the guard
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), "Failed to remove abandoned upload: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::format::TargetFormat;
    use crate::services::transcoder::Transcoder;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingTranscoder {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Transcoder for CountingTranscoder {
        async fn transcode(
            &self,
            _input: &Path,
            output: &Path,
            _target: TargetFormat,
        ) -> Result<(), TranscodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::fs::write(output, b"ID3").await?;
            Ok(())
        }

        async fn health_check(&self) -> bool {
            true
        }
    }

    fn service(dir: &Path, limit: usize) -> (UploadService, Arc<CountingTranscoder>) {
        let storage = Arc::new(LocalStorage::new(dir));
        let transcoder = Arc::new(CountingTranscoder::default());
        let conversion = Arc::new(ConversionService::new(
            storage.clone(),
            transcoder.clone(),
            2,
            TargetFormat::Mp3,
        ));
        (UploadService::new(storage, conversion, limit), transcoder)
    }

    fn body(chunks: &[&'static [u8]]) -> impl Stream<Item = Result<Bytes, AdmissionError>> + Unpin {
        futures::stream::iter(
            chunks
                .iter()
                .map(|c| Ok(Bytes::from_static(c)))
                .collect::<Vec<_>>(),
        )
    }

    fn file_count(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn test_oversized_body_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service(dir.path(), 8);

        let result = service
            .store_original(Some("clip.wav"), body(&[b"12345", b"6789"]))
            .await;

        assert!(matches!(
            result,
            Err(UploadError::Admission(AdmissionError::PayloadTooLarge { limit: 8 }))
        ));
        assert_eq!(file_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_body_exactly_at_limit_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service(dir.path(), 8);

        let admitted = service
            .store_original(Some("clip.mp3"), body(&[b"1234", b"5678"]))
            .await
            .unwrap();
        let stored = service.finalize(admitted).await.unwrap();

        assert_eq!(std::fs::read(&stored.path).unwrap(), b"12345678");
    }

    #[tokio::test]
    async fn test_passthrough_keeps_original_without_transcoding() {
        let dir = tempfile::tempdir().unwrap();
        let (service, transcoder) = service(dir.path(), 1024);

        let admitted = service
            .store_original(Some("Song.MP3"), body(&[b"ID3 data"]))
            .await
            .unwrap();
        let original_name = admitted.file().filename();
        let stored = service.finalize(admitted).await.unwrap();

        assert_eq!(stored.filename(), original_name);
        assert_eq!(stored.role, FileRole::OriginalUpload);
        assert_eq!(transcoder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(file_count(dir.path()), 1);
    }

    #[tokio::test]
    async fn test_conversion_replaces_original() {
        let dir = tempfile::tempdir().unwrap();
        let (service, transcoder) = service(dir.path(), 1024);

        let admitted = service
            .store_original(Some("clip.wav"), body(&[b"RIFF", b"WAVE"]))
            .await
            .unwrap();
        let original_path = admitted.file().path.clone();
        let stored = service.finalize(admitted).await.unwrap();

        assert_eq!(stored.role, FileRole::ConvertedArtifact);
        assert!(stored.filename().ends_with(".mp3"));
        assert!(!original_path.exists());
        assert!(stored.path.exists());
        assert_eq!(transcoder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(file_count(dir.path()), 1);
    }

    /// Consumes its input, so the later removal of the original fails
    struct InputEatingTranscoder;

    #[async_trait::async_trait]
    impl Transcoder for InputEatingTranscoder {
        async fn transcode(
            &self,
            input: &Path,
            output: &Path,
            _target: TargetFormat,
        ) -> Result<(), TranscodeError> {
            tokio::fs::remove_file(input).await?;
            tokio::fs::write(output, b"ID3 converted").await?;
            Ok(())
        }

        async fn health_check(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_failed_cleanup_still_returns_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(LocalStorage::new(dir.path()));
        let conversion = Arc::new(ConversionService::new(
            storage.clone(),
            Arc::new(InputEatingTranscoder),
            1,
            TargetFormat::Mp3,
        ));
        let service = UploadService::new(storage, conversion, 1024);

        let admitted = service
            .store_original(Some("clip.wav"), body(&[b"RIFF"]))
            .await
            .unwrap();
        let stored = service.finalize(admitted).await.unwrap();

        assert_eq!(stored.role, FileRole::ConvertedArtifact);
        assert_eq!(std::fs::read(&stored.path).unwrap(), b"ID3 converted");
        assert_eq!(file_count(dir.path()), 1);
    }

    #[tokio::test]
    async fn test_dropped_admission_removes_original() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service(dir.path(), 1024);

        let admitted = service
            .store_original(None, body(&[b"bytes"]))
            .await
            .unwrap();
        assert!(admitted.file().extension.is_none());
        assert_eq!(file_count(dir.path()), 1);

        drop(admitted);
        assert_eq!(file_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_body_error_is_propagated() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service(dir.path(), 1024);

        let stream = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"RIFF")),
            Err(AdmissionError::MalformedBody("connection reset".to_string())),
        ]);

        let result = service.store_original(Some("clip.wav"), stream).await;
        assert!(matches!(
            result,
            Err(UploadError::Admission(AdmissionError::MalformedBody(_)))
        ));
        assert_eq!(file_count(dir.path()), 0);
    }
}
