use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Compressed format of the final mixdown artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    /// LAME MP3. Requires the `mp3` feature.
    Mp3,
    /// 16-bit PCM WAV.
    Wav,
}

impl ArtifactFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
        }
    }
}

impl Default for ArtifactFormat {
    fn default() -> Self {
        if cfg!(feature = "mp3") {
            Self::Mp3
        } else {
            Self::Wav
        }
    }
}

/// Configuration shared by capture sessions, the coordinator and the mixdown engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Capture and mixdown sample rate in Hz (default: 44100).
    pub sample_rate: u32,

    /// Channel count of the mixdown (default: 2).
    pub channels: u16,

    /// File name prefix of the artifact: `<prefix>_<yyyyMMdd_HHmmss>.<ext>`.
    pub app_prefix: String,

    /// Directory holding per-session raw captures.
    pub temp_directory: PathBuf,

    /// File name prefix of per-session raw captures.
    pub temp_prefix: String,

    pub artifact_format: ArtifactFormat,

    pub mp3_bitrate_kbps: u32,

    /// LAME algorithm quality, 0 (best) to 9 (fastest).
    pub mp3_quality: u8,

    /// Frames encoded per mixdown chunk; cancellation is checked between chunks.
    pub mixdown_chunk_frames: usize,

    /// Write `<stem>.metadata.json` next to the artifact.
    pub write_metadata: bool,
}

impl RecorderConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("sample rate must be positive".into());
        }
        if ![1, 2].contains(&self.channels) {
            return Err(format!("unsupported channel count: {}", self.channels));
        }
        if self.app_prefix.is_empty() {
            return Err("app prefix must not be empty".into());
        }
        if self.mixdown_chunk_frames == 0 {
            return Err("mixdown chunk must hold at least one frame".into());
        }
        if self.mp3_quality > 9 {
            return Err(format!("unsupported mp3 quality: {}", self.mp3_quality));
        }
        if self.artifact_format == ArtifactFormat::Mp3 && !cfg!(feature = "mp3") {
            return Err("mp3 output requires the `mp3` feature".into());
        }
        Ok(())
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            app_prefix: "Aurora".into(),
            temp_directory: std::env::temp_dir(),
            temp_prefix: "aurora".into(),
            artifact_format: ArtifactFormat::default(),
            mp3_bitrate_kbps: 192,
            mp3_quality: 2,
            mixdown_chunk_frames: 44100,
            write_metadata: true,
        }
    }
}
