use crate::services::errors::{CleanupError, StorageError};
use crate::utils::identifier;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

const MAX_EXTENSION_LEN: usize = 16;
const STAGING_PREFIX: &str = ".staging-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRole {
    OriginalUpload,
    ConvertedArtifact,
}

/// A file under the storage root, named `{id}.{ext}` (or `{id}` without extension)
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub id: Uuid,
    pub extension: Option<String>,
    pub path: PathBuf,
    pub role: FileRole,
}

impl StoredFile {
    pub fn filename(&self) -> String {
        match &self.extension {
            Some(ext) => format!("{}.{}", self.id, ext),
            None => self.id.to_string(),
        }
    }
}

/// Flat directory store. The directory listing is the only index.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reserves a fresh `{uuid}.{ext}` path. Writes nothing.
    pub fn place(&self, extension: Option<&str>, role: FileRole) -> StoredFile {
        let id = identifier::generate();
        let extension = extension.map(|e| e.to_ascii_lowercase());
        let filename = match &extension {
            Some(ext) => format!("{}.{}", id, ext),
            None => id.to_string(),
        };
        StoredFile {
            id,
            path: self.root.join(filename),
            extension,
            role,
        }
    }

    /// Opens a hidden file inside the root for streaming an upload into.
    /// It is removed on drop unless `StagingFile::commit` runs.
    pub fn create_staging(&self) -> Result<StagingFile, StorageError> {
        let (file, path) = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(".part")
            .tempfile_in(&self.root)?
            .into_parts();

        Ok(StagingFile {
            file: tokio::fs::File::from_std(file),
            path,
            written: 0,
        })
    }

    /// Hidden path for transcoder output; removed on drop unless persisted.
    pub fn create_staging_path(&self, extension: &str) -> Result<TempPath, StorageError> {
        let path = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(&format!(".{}.part", extension))
            .tempfile_in(&self.root)?
            .into_temp_path();
        Ok(path)
    }

    /// Moves a finished staging path to its reserved name.
    pub fn commit_path(&self, staged: TempPath, dest: &StoredFile) -> Result<(), StorageError> {
        staged.persist_noclobber(&dest.path)?;
        Ok(())
    }

    /// Maps a public filename back to a path, accepting only names this
    /// store hands out.
    pub fn resolve(&self, filename: &str) -> Option<PathBuf> {
        if is_stored_filename(filename) {
            Some(self.root.join(filename))
        } else {
            None
        }
    }

    pub async fn open(&self, filename: &str) -> Result<(tokio::fs::File, u64), StorageError> {
        let path = self.resolve(filename).ok_or(StorageError::NotFound)?;
        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound);
            }
            Err(e) => return Err(e.into()),
        };
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(StorageError::NotFound);
        }
        Ok((file, metadata.len()))
    }

    pub async fn remove(&self, file: &StoredFile) -> Result<(), CleanupError> {
        tokio::fs::remove_file(&file.path)
            .await
            .map_err(|source| CleanupError::DeleteFailed {
                path: file.path.clone(),
                source,
            })
    }

    /// Round-trips a small hidden file through the root.
    pub async fn health_check(&self) -> bool {
        let Ok(mut staging) = self.create_staging() else {
            return false;
        };
        staging.write_chunk(b"health-check").await.is_ok()
    }

    /// Deletes staging leftovers from a previous process. Returns the count.
    pub async fn purge_staging(&self) -> Result<usize, StorageError> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !name.starts_with(STAGING_PREFIX) {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!("Failed to remove stale staging file {}: {}", name, e),
            }
        }

        Ok(removed)
    }
}

/// Upload bytes in flight. Dropping it deletes the partial file.
pub struct StagingFile {
    file: tokio::fs::File,
    path: TempPath,
    written: usize,
}

impl StagingFile {
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), StorageError> {
        self.file.write_all(chunk).await?;
        self.written += chunk.len();
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    /// Flushes and renames the staging file to `dest`.
    pub async fn commit(mut self, dest: &StoredFile) -> Result<(), StorageError> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        drop(self.file);
        self.path.persist_noclobber(&dest.path)?;
        Ok(())
    }
}

/// Extension to store an upload under, taken from the client filename.
///
/// Only the last path component counts, dotfiles have no extension, and
/// anything that is not 1-16 ASCII alphanumerics is dropped entirely.
pub fn sanitize_extension(original_filename: &str) -> Option<String> {
    let name = original_filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > MAX_EXTENSION_LEN {
        return None;
    }
    if !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn is_stored_filename(filename: &str) -> bool {
    let (stem, ext) = match filename.split_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (filename, None),
    };

    let canonical = Uuid::parse_str(stem)
        .map(|id| id.hyphenated().to_string() == stem)
        .unwrap_or(false);

    let ext_ok = ext.is_none_or(|ext| {
        !ext.is_empty()
            && ext.len() <= MAX_EXTENSION_LEN
            && ext.chars().all(|c| c.is_ascii_alphanumeric())
    });

    canonical && ext_ok
}
