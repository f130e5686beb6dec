use crate::config::UploadConfig;
use crate::services::transcoder::Transcoder;
use std::sync::Arc;
use tracing::info;

pub async fn setup_transcoder(config: &UploadConfig) -> Arc<dyn Transcoder> {
    let transcoder = crate::services::transcoder::create_transcoder(config);

    // Probe once at startup; MP3 uploads still work without ffmpeg
    if transcoder.health_check().await {
        info!("🎵 Transcoder ready ({})", config.transcoder_type);
    } else {
        tracing::warn!(
            "⚠️  Transcoder '{}' unavailable! Non-MP3 uploads will fail until it is installed.",
            config.ffmpeg_path.display()
        );
    }

    transcoder.into()
}
