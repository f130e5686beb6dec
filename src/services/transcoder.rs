use crate::services::errors::TranscodeError;
use crate::services::format::TargetFormat;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// External audio transcoding capability
#[async_trait::async_trait]
pub trait Transcoder: Send + Sync {
    /// Encode `input` into the target format at `output`.
    ///
    /// Resolves once the work has finished. On `Ok` the output is complete;
    /// on `Err` the output may hold anything and must not be served.
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        target: TargetFormat,
    ) -> Result<(), TranscodeError>;

    /// Check if the transcoder is available
    async fn health_check(&self) -> bool;
}

/// Runs the `ffmpeg` binary as a child process.
pub struct FfmpegTranscoder {
    ffmpeg_path: PathBuf,
    bitrate_kbps: u32,
    timeout: Duration,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: PathBuf, bitrate_kbps: u32, timeout: Duration) -> Self {
        Self {
            ffmpeg_path,
            bitrate_kbps,
            timeout,
        }
    }

    fn build_args(&self, input: &Path, output: &Path, target: TargetFormat) -> Vec<String> {
        // -nostdin : never wait on the terminal
        // -y       : output is a pre-created staging file
        // -vn      : drop cover-art streams
        // -f       : staging names don't end in the target extension
        vec![
            "-hide_banner".to_string(),
            "-nostdin".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-y".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-vn".to_string(),
            "-codec:a".to_string(),
            target.codec().to_string(),
            "-b:a".to_string(),
            format!("{}k", self.bitrate_kbps),
            "-f".to_string(),
            target.container().to_string(),
            output.to_string_lossy().to_string(),
        ]
    }
}

#[async_trait::async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        target: TargetFormat,
    ) -> Result<(), TranscodeError> {
        let args = self.build_args(input, output, target);

        let child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                TranscodeError::ConversionFailed(format!(
                    "failed to spawn {}: {}",
                    self.ffmpeg_path.display(),
                    e
                ))
            })?;

        // Dropping the future on timeout drops the child, which kills it.
        let output_res = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| TranscodeError::TimedOut(self.timeout.as_secs()))??;

        if output_res.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output_res.stderr);
        let last_line = stderr
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("unknown error");
        Err(TranscodeError::ConversionFailed(format!(
            "ffmpeg exited with {}: {}",
            output_res.status, last_line
        )))
    }

    async fn health_check(&self) -> bool {
        Command::new(&self.ffmpeg_path)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

/// Transcoder for hosts without ffmpeg: target-format uploads still pass
/// through, everything else is reported as a failed conversion.
pub struct NoOpTranscoder;

#[async_trait::async_trait]
impl Transcoder for NoOpTranscoder {
    async fn transcode(
        &self,
        _input: &Path,
        _output: &Path,
        target: TargetFormat,
    ) -> Result<(), TranscodeError> {
        tracing::warn!("NoOpTranscoder: refusing conversion to {}", target.label());
        Err(TranscodeError::ConversionFailed(
            "transcoding is disabled".to_string(),
        ))
    }

    async fn health_check(&self) -> bool {
        true
    }
}

/// Factory function to create appropriate transcoder based on config
pub fn create_transcoder(config: &crate::config::UploadConfig) -> Box<dyn Transcoder> {
    match config.transcoder_type.to_lowercase().as_str() {
        "ffmpeg" => Box::new(FfmpegTranscoder::new(
            config.ffmpeg_path.clone(),
            config.transcode_bitrate_kbps,
            config.transcode_timeout(),
        )),
        "noop" | "none" | "disabled" => Box::new(NoOpTranscoder),
        other => {
            tracing::warn!("Unknown transcoder type '{}', using ffmpeg", other);
            Box::new(FfmpegTranscoder::new(
                config.ffmpeg_path.clone(),
                config.transcode_bitrate_kbps,
                config.transcode_timeout(),
            ))
        }
    }
}
