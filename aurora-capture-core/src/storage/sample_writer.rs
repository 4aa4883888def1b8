use std::fs::{self, File};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::models::endpoint::StreamFormat;
use crate::models::error::RecorderError;
use crate::processing::wav_format;

/// On-disk sample encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEncoding {
    /// 32-bit IEEE float, written verbatim. Used for per-session captures.
    Float32,
    /// 16-bit signed PCM, clamped. Used for WAV artifacts.
    Pcm16,
}

impl SampleEncoding {
    fn format_code(&self) -> u16 {
        match self {
            Self::Float32 => wav_format::FORMAT_IEEE_FLOAT,
            Self::Pcm16 => wav_format::FORMAT_PCM,
        }
    }

    fn bit_depth(&self) -> u16 {
        match self {
            Self::Float32 => 32,
            Self::Pcm16 => 16,
        }
    }

    fn bytes_per_sample(&self) -> usize {
        self.bit_depth() as usize / 8
    }
}

/// Streaming WAV writer.
///
/// ## File Format
/// ```text
/// [44-byte WAV header, sizes patched on close]
/// [interleaved samples...]
/// ```
pub struct SampleWriter {
    file_path: PathBuf,
    encoding: SampleEncoding,
    format: StreamFormat,
    file: Option<BufWriter<File>>,
    data_bytes: u64,
    samples_written: u64,
    scratch: Vec<u8>,
}

impl SampleWriter {
    pub fn new(file_path: PathBuf, encoding: SampleEncoding, format: StreamFormat) -> Self {
        Self {
            file_path,
            encoding,
            format,
            file: None,
            data_bytes: 0,
            samples_written: 0,
            scratch: Vec::new(),
        }
    }

    /// Create the file and write the placeholder header.
    ///
    /// The header is flushed right away. If that fails the new file is
    /// removed, so a failed open leaves nothing behind.
    pub fn open(&mut self) -> Result<(), RecorderError> {
        if self.file.is_some() {
            return Ok(());
        }

        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| RecorderError::StorageError(format!("failed to create directory: {}", e)))?;
        }

        let file = File::create(&self.file_path)
            .map_err(|e| RecorderError::StorageError(format!("failed to create file: {}", e)))?;
        let mut file = BufWriter::new(file);

        let header = wav_format::generate_wav_header(
            self.encoding.format_code(),
            self.format.sample_rate,
            self.encoding.bit_depth(),
            self.format.channels,
            0,
        );
        if let Err(e) = file.write_all(&header).and_then(|_| file.flush()) {
            drop(file);
            if let Err(remove_err) = fs::remove_file(&self.file_path) {
                log::warn!("Failed to remove {}: {}", self.file_path.display(), remove_err);
            }
            return Err(RecorderError::StorageError(format!("header write failed: {}", e)));
        }

        self.file = Some(file);
        Ok(())
    }

    /// Append interleaved samples.
    pub fn write_samples(&mut self, samples: &[f32]) -> Result<(), RecorderError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| RecorderError::StorageError("file is not open for writing".into()))?;

        self.scratch.clear();
        self.scratch.reserve(samples.len() * self.encoding.bytes_per_sample());
        match self.encoding {
            SampleEncoding::Float32 => {
                for &sample in samples {
                    self.scratch.extend_from_slice(&sample.to_le_bytes());
                }
            }
            SampleEncoding::Pcm16 => {
                for &sample in samples {
                    self.scratch.extend_from_slice(&to_pcm16(sample).to_le_bytes());
                }
            }
        }

        file.write_all(&self.scratch)
            .map_err(|e| RecorderError::StorageError(format!("write failed: {}", e)))?;
        self.data_bytes += self.scratch.len() as u64;
        self.samples_written += samples.len() as u64;
        Ok(())
    }

    /// Patch header sizes and close the file. Calling it on a closed writer is a no-op.
    pub fn close(&mut self) -> Result<(), RecorderError> {
        let Some(mut file) = self.file.take() else {
            return Ok(());
        };

        let riff_size = wav_format::riff_chunk_size(self.data_bytes);
        let data_size = wav_format::data_chunk_size(self.data_bytes);

        file.seek(SeekFrom::Start(wav_format::RIFF_SIZE_OFFSET))
            .and_then(|_| file.write_all(&riff_size.to_le_bytes()))
            .and_then(|_| file.seek(SeekFrom::Start(wav_format::DATA_SIZE_OFFSET)))
            .and_then(|_| file.write_all(&data_size.to_le_bytes()))
            .and_then(|_| file.flush())
            .map_err(|e| RecorderError::StorageError(format!("failed to finalize header: {}", e)))?;

        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Interleaved frames written so far.
    pub fn frames_written(&self) -> u64 {
        self.samples_written / self.format.channels.max(1) as u64
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn format(&self) -> StreamFormat {
        self.format
    }
}

impl Drop for SampleWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("Failed to finalize {}: {}", self.file_path.display(), e);
        }
    }
}

/// Convert an f32 sample in `[-1.0, 1.0]` to 16-bit PCM, clamping out-of-range values.
pub fn to_pcm16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}
