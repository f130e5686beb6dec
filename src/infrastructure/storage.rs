use crate::config::UploadConfig;
use crate::services::storage::LocalStorage;
use anyhow::Context;
use std::sync::Arc;
use tracing::info;

pub async fn setup_storage(config: &UploadConfig) -> anyhow::Result<Arc<LocalStorage>> {
    tokio::fs::create_dir_all(&config.storage_dir)
        .await
        .with_context(|| {
            format!(
                "failed to create storage directory {}",
                config.storage_dir.display()
            )
        })?;

    let storage = LocalStorage::new(&config.storage_dir);

    // Partial uploads from a crashed process are never addressable; clear them
    let purged = storage
        .purge_staging()
        .await
        .context("failed to scan storage directory")?;
    if purged > 0 {
        info!("🧹 Removed {} stale staging files", purged);
    }

    if !storage.health_check().await {
        anyhow::bail!(
            "storage directory {} is not writable",
            config.storage_dir.display()
        );
    }

    info!(
        "💾 Local Storage: {} (served at /{})",
        config.storage_dir.display(),
        config.public_mount
    );
    Ok(Arc::new(storage))
}
