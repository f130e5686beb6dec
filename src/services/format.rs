//! Target format and the passthrough/convert decision.

/// The one encoding every served artifact ends up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFormat {
    Mp3,
}

impl TargetFormat {
    /// Canonical file extension, lowercase, without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            TargetFormat::Mp3 => "mp3",
        }
    }

    /// Container name passed to the transcoder
    pub fn container(&self) -> &'static str {
        match self {
            TargetFormat::Mp3 => "mp3",
        }
    }

    pub fn codec(&self) -> &'static str {
        match self {
            TargetFormat::Mp3 => "libmp3lame",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TargetFormat::Mp3 => "MP3",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatDecision {
    AlreadyTarget,
    NeedsConversion,
}

/// Decide from the stored extension alone whether a transcode is needed.
///
/// No content sniffing: a missing or spoofed extension goes to the
/// transcoder, which fails on bytes that are not audio.
pub fn classify(extension: Option<&str>, target: TargetFormat) -> FormatDecision {
    match extension {
        Some(ext) if ext.eq_ignore_ascii_case(target.extension()) => FormatDecision::AlreadyTarget,
        _ => FormatDecision::NeedsConversion,
    }
}
