//! Artifact encoders for the final mixdown.

use std::path::{Path, PathBuf};

use crate::models::config::{ArtifactFormat, RecorderConfig};
use crate::models::endpoint::StreamFormat;
use crate::models::error::RecorderError;
use crate::storage::sample_writer::{SampleEncoding, SampleWriter};

/// Incremental encoder writing the mixed stream to its artifact file.
pub trait ArtifactEncoder: Send {
    /// Encode interleaved f32 samples in the target format.
    fn write(&mut self, samples: &[f32]) -> Result<(), RecorderError>;

    /// Flush pending data and close the file.
    fn finish(self: Box<Self>) -> Result<(), RecorderError>;

    fn extension(&self) -> &'static str;
}

/// Create the encoder selected by `config.artifact_format`.
pub fn create_encoder(config: &RecorderConfig, output_path: &Path) -> Result<Box<dyn ArtifactEncoder>, RecorderError> {
    let format = StreamFormat {
        sample_rate: config.sample_rate,
        channels: config.channels,
    };

    match config.artifact_format {
        ArtifactFormat::Wav => Ok(Box::new(WavEncoder::create(output_path.to_path_buf(), format)?)),
        #[cfg(feature = "mp3")]
        ArtifactFormat::Mp3 => Ok(Box::new(mp3::Mp3Encoder::create(
            output_path,
            format,
            config.mp3_bitrate_kbps,
            config.mp3_quality,
        )?)),
        #[cfg(not(feature = "mp3"))]
        ArtifactFormat::Mp3 => Err(RecorderError::ConfigurationFailed(
            "mp3 output requires the `mp3` feature".into(),
        )),
    }
}

/// 16-bit PCM WAV artifact.
pub struct WavEncoder {
    writer: SampleWriter,
}

impl WavEncoder {
    pub fn create(path: PathBuf, format: StreamFormat) -> Result<Self, RecorderError> {
        let mut writer = SampleWriter::new(path, SampleEncoding::Pcm16, format);
        writer.open()?;
        Ok(Self { writer })
    }
}

impl ArtifactEncoder for WavEncoder {
    fn write(&mut self, samples: &[f32]) -> Result<(), RecorderError> {
        self.writer.write_samples(samples)
    }

    fn finish(mut self: Box<Self>) -> Result<(), RecorderError> {
        self.writer.close()
    }

    fn extension(&self) -> &'static str {
        "wav"
    }
}

#[cfg(feature = "mp3")]
mod mp3 {
    use std::fs::File;
    use std::io::{BufWriter, Write};
    use std::path::Path;

    use lame::Lame;

    use super::ArtifactEncoder;
    use crate::models::endpoint::StreamFormat;
    use crate::models::error::RecorderError;
    use crate::storage::sample_writer::to_pcm16;

    /// Samples per MP3 frame; one frame of trailing silence pushes out LAME's lookahead.
    const MP3_FRAME_SAMPLES: usize = 1152;

    /// MP3 artifact encoded with LAME at a fixed bitrate and quality.
    pub struct Mp3Encoder {
        lame: Lame,
        channels: u16,
        file: BufWriter<File>,
        left: Vec<i16>,
        right: Vec<i16>,
        mp3_buffer: Vec<u8>,
    }

    // SAFETY: the LAME handle is only touched from the thread that owns the encoder.
    unsafe impl Send for Mp3Encoder {}

    impl Mp3Encoder {
        pub fn create(path: &Path, format: StreamFormat, bitrate_kbps: u32, quality: u8) -> Result<Self, RecorderError> {
            let mut lame = Lame::new().ok_or_else(|| RecorderError::EncodingFailed("failed to create LAME encoder".into()))?;

            lame.set_channels(format.channels as u8)
                .map_err(|e| RecorderError::EncodingFailed(format!("set_channels: {:?}", e)))?;
            lame.set_sample_rate(format.sample_rate)
                .map_err(|e| RecorderError::EncodingFailed(format!("set_sample_rate: {:?}", e)))?;
            lame.set_kilobitrate(bitrate_kbps as i32)
                .map_err(|e| RecorderError::EncodingFailed(format!("set_kilobitrate: {:?}", e)))?;
            lame.set_quality(quality)
                .map_err(|e| RecorderError::EncodingFailed(format!("set_quality: {:?}", e)))?;
            lame.init_params()
                .map_err(|e| RecorderError::EncodingFailed(format!("init_params: {:?}", e)))?;

            let file = File::create(path)
                .map_err(|e| RecorderError::StorageError(format!("failed to create file: {}", e)))?;

            log::info!(
                "LAME encoder initialized: {} Hz, {} ch, {} kbps, quality {}",
                format.sample_rate,
                format.channels,
                bitrate_kbps,
                quality
            );

            Ok(Self {
                lame,
                channels: format.channels,
                file: BufWriter::new(file),
                left: Vec::new(),
                right: Vec::new(),
                mp3_buffer: Vec::new(),
            })
        }

        fn encode_pcm(&mut self, samples: &[f32]) -> Result<(), RecorderError> {
            self.left.clear();
            self.right.clear();
            if self.channels == 1 {
                self.left.extend(samples.iter().map(|&s| to_pcm16(s)));
                self.right.extend_from_slice(&self.left);
            } else {
                for frame in samples.chunks_exact(self.channels as usize) {
                    self.left.push(to_pcm16(frame[0]));
                    self.right.push(to_pcm16(frame[1]));
                }
            }

            // LAME worst case: 1.25 * samples + 7200 bytes.
            let needed = self.left.len() * 5 / 4 + 7200;
            self.mp3_buffer.resize(needed, 0);

            let encoded = self
                .lame
                .encode(&self.left, &self.right, &mut self.mp3_buffer)
                .map_err(|e| RecorderError::EncodingFailed(format!("LAME encoding error: {:?}", e)))?;

            self.file
                .write_all(&self.mp3_buffer[..encoded])
                .map_err(|e| RecorderError::StorageError(format!("write failed: {}", e)))
        }
    }

    impl ArtifactEncoder for Mp3Encoder {
        fn write(&mut self, samples: &[f32]) -> Result<(), RecorderError> {
            if samples.is_empty() {
                return Ok(());
            }
            self.encode_pcm(samples)
        }

        fn finish(mut self: Box<Self>) -> Result<(), RecorderError> {
            let silence = vec![0.0f32; MP3_FRAME_SAMPLES * self.channels as usize];
            self.encode_pcm(&silence)?;
            self.file
                .flush()
                .map_err(|e| RecorderError::StorageError(format!("flush failed: {}", e)))
        }

        fn extension(&self) -> &'static str {
            "mp3"
        }
    }
}
