use crate::services::errors::{StorageError, TranscodeError};
use crate::services::format::TargetFormat;
use crate::services::storage::{FileRole, LocalStorage, StoredFile};
use crate::services::transcoder::Transcoder;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

/// Drives one transcoder run per request and decides what becomes addressable.
///
/// The transcoder writes into a hidden staging path. Only a successful,
/// non-empty result is renamed to `{uuid}.{ext}`; every other outcome drops
/// the staging path, which deletes whatever was written.
pub struct ConversionService {
    storage: Arc<LocalStorage>,
    transcoder: Arc<dyn Transcoder>,
    permits: Arc<Semaphore>,
    target: TargetFormat,
}

impl ConversionService {
    pub fn new(
        storage: Arc<LocalStorage>,
        transcoder: Arc<dyn Transcoder>,
        max_concurrent: usize,
        target: TargetFormat,
    ) -> Self {
        Self {
            storage,
            transcoder,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            target,
        }
    }

    pub fn target(&self) -> TargetFormat {
        self.target
    }

    pub fn transcoder(&self) -> &Arc<dyn Transcoder> {
        &self.transcoder
    }

    pub async fn convert(&self, original: &StoredFile) -> Result<StoredFile, TranscodeError> {
        let artifact = self
            .storage
            .place(Some(self.target.extension()), FileRole::ConvertedArtifact);
        let staged = self
            .storage
            .create_staging_path(self.target.extension())
            .map_err(storage_failure)?;

        let _permit = self.permits.acquire().await.map_err(|_| {
            TranscodeError::ConversionFailed("transcoder pool is shut down".to_string())
        })?;

        let started = Instant::now();
        tracing::info!(
            original = %original.filename(),
            artifact = %artifact.filename(),
            "Converting to {}",
            self.target.label()
        );

        if let Err(e) = self
            .transcoder
            .transcode(&original.path, &staged, self.target)
            .await
        {
            tracing::error!(
                original = %original.filename(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Conversion failed: {}",
                e
            );
            return Err(e);
        }

        let produced = tokio::fs::metadata(&staged).await?.len();
        if produced == 0 {
            return Err(TranscodeError::ConversionFailed(
                "transcoder produced an empty file".to_string(),
            ));
        }

        self.storage
            .commit_path(staged, &artifact)
            .map_err(storage_failure)?;

        tracing::info!(
            artifact = %artifact.filename(),
            bytes = produced,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Conversion finished"
        );

        Ok(artifact)
    }
}

fn storage_failure(e: StorageError) -> TranscodeError {
    match e {
        StorageError::Io(io) => TranscodeError::Io(io),
        StorageError::Persist(p) => TranscodeError::Io(p.error),
        StorageError::NotFound => {
            TranscodeError::ConversionFailed("staging file disappeared".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    struct WritingTranscoder(&'static [u8]);

    #[async_trait::async_trait]
    impl Transcoder for WritingTranscoder {
        async fn transcode(
            &self,
            _input: &Path,
            output: &Path,
            _target: TargetFormat,
        ) -> Result<(), TranscodeError> {
            tokio::fs::write(output, self.0).await?;
            Ok(())
        }

        async fn health_check(&self) -> bool {
            true
        }
    }

    /// Writes half a file, then reports failure
    struct PartialFailTranscoder;

    #[async_trait::async_trait]
    impl Transcoder for PartialFailTranscoder {
        async fn transcode(
            &self,
            _input: &Path,
            output: &Path,
            _target: TargetFormat,
        ) -> Result<(), TranscodeError> {
            tokio::fs::write(output, b"ID3 truncated").await?;
            Err(TranscodeError::ConversionFailed("decoder error".to_string()))
        }

        async fn health_check(&self) -> bool {
            true
        }
    }

    fn original_in(storage: &LocalStorage) -> StoredFile {
        let original = storage.place(Some("wav"), FileRole::OriginalUpload);
        std::fs::write(&original.path, b"RIFF....WAVE").unwrap();
        original
    }

    fn listing(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_success_places_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(LocalStorage::new(dir.path()));
        let original = original_in(&storage);
        let service = ConversionService::new(
            storage.clone(),
            Arc::new(WritingTranscoder(b"ID3 encoded")),
            1,
            TargetFormat::Mp3,
        );

        let artifact = service.convert(&original).await.unwrap();

        assert_eq!(artifact.role, FileRole::ConvertedArtifact);
        assert_eq!(artifact.extension.as_deref(), Some("mp3"));
        assert_ne!(artifact.id, original.id);
        assert_eq!(std::fs::read(&artifact.path).unwrap(), b"ID3 encoded");

        let mut expected = vec![original.filename(), artifact.filename()];
        expected.sort();
        assert_eq!(listing(dir.path()), expected);
    }

    #[tokio::test]
    async fn test_failure_leaves_no_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(LocalStorage::new(dir.path()));
        let original = original_in(&storage);
        let service = ConversionService::new(
            storage.clone(),
            Arc::new(PartialFailTranscoder),
            1,
            TargetFormat::Mp3,
        );

        let result = service.convert(&original).await;

        assert!(matches!(result, Err(TranscodeError::ConversionFailed(_))));
        assert_eq!(listing(dir.path()), vec![original.filename()]);
    }

    #[tokio::test]
    async fn test_empty_output_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(LocalStorage::new(dir.path()));
        let original = original_in(&storage);
        let service = ConversionService::new(
            storage.clone(),
            Arc::new(WritingTranscoder(b"")),
            1,
            TargetFormat::Mp3,
        );

        assert!(service.convert(&original).await.is_err());
        assert_eq!(listing(dir.path()), vec![original.filename()]);
    }
}
