//! Offline mixdown of per-endpoint captures into the final artifact.
//!
//! ```text
//! [temp wav] → [StreamConverter] ─┐
//! [temp wav] → [StreamConverter] ─┼→ [sum, silence-padded] → [ArtifactEncoder]
//! [temp wav] → [StreamConverter] ─┘
//! ```

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader};
use tokio_util::sync::CancellationToken;

use crate::models::config::RecorderConfig;
use crate::models::error::RecorderError;
use crate::models::recording_result::MixdownSummary;
use crate::processing::converter::StreamConverter;
use crate::processing::encoder::{self, ArtifactEncoder};
use crate::storage::temp_files::TempFiles;

/// Source frames decoded per refill.
const READ_FRAMES: usize = 4096;

/// One capture file, decoded and converted to the target format on demand.
struct MixSource {
    path: PathBuf,
    reader: WavReader<BufReader<File>>,
    source_channels: usize,
    int_scale: Option<f32>,
    converter: StreamConverter,
    queue: Vec<f32>,
    raw: Vec<f32>,
    exhausted: bool,
}

impl MixSource {
    /// Open `path`. Returns `Ok(None)` for captures without a single frame.
    fn open(path: &Path, config: &RecorderConfig) -> Result<Option<Self>, RecorderError> {
        let reader = WavReader::open(path)
            .map_err(|e| RecorderError::StorageError(format!("failed to open {}: {}", path.display(), e)))?;
        let spec = reader.spec();

        if spec.channels == 0 || reader.duration() == 0 {
            return Ok(None);
        }

        let int_scale = match spec.sample_format {
            SampleFormat::Float if spec.bits_per_sample == 32 => None,
            SampleFormat::Int if (8..=32).contains(&spec.bits_per_sample) => {
                Some(1.0 / (1u64 << (spec.bits_per_sample - 1)) as f32)
            }
            _ => {
                return Err(RecorderError::StorageError(format!(
                    "unsupported sample format in {}: {:?} {} bit",
                    path.display(),
                    spec.sample_format,
                    spec.bits_per_sample
                )))
            }
        };

        log::debug!(
            "Mixdown source {}: {} Hz, {} ch, {} frames",
            path.display(),
            spec.sample_rate,
            spec.channels,
            reader.duration()
        );

        Ok(Some(Self {
            path: path.to_path_buf(),
            converter: StreamConverter::new(spec.sample_rate, spec.channels, config.sample_rate, config.channels),
            source_channels: spec.channels as usize,
            int_scale,
            reader,
            queue: Vec::new(),
            raw: Vec::with_capacity(READ_FRAMES * spec.channels as usize),
            exhausted: false,
        }))
    }

    /// Add up to `bus.len()` converted samples into `bus`. Returns how many were added;
    /// fewer than `bus.len()` means the source is exhausted.
    fn mix_into(&mut self, bus: &mut [f32]) -> Result<usize, RecorderError> {
        while self.queue.len() < bus.len() && !self.exhausted {
            self.refill()?;
        }

        let count = self.queue.len().min(bus.len());
        for (acc, sample) in bus.iter_mut().zip(self.queue.drain(..count)) {
            *acc += sample;
        }
        Ok(count)
    }

    fn refill(&mut self) -> Result<(), RecorderError> {
        let wanted = READ_FRAMES * self.source_channels;
        self.raw.clear();

        match self.int_scale {
            None => {
                for sample in self.reader.samples::<f32>().take(wanted) {
                    self.raw.push(sample.map_err(|e| read_error(&self.path, e))?);
                }
            }
            Some(scale) => {
                for sample in self.reader.samples::<i32>().take(wanted) {
                    self.raw.push(sample.map_err(|e| read_error(&self.path, e))? as f32 * scale);
                }
            }
        }

        if self.raw.is_empty() {
            self.exhausted = true;
            let tail = self.converter.finish();
            self.queue.extend(tail);
        } else {
            let converted = self.converter.process(&self.raw);
            self.queue.extend(converted);
        }
        Ok(())
    }
}

fn read_error(path: &Path, e: hound::Error) -> RecorderError {
    RecorderError::StorageError(format!("failed to read {}: {}", path.display(), e))
}

/// Mixes per-endpoint captures into one encoded artifact.
#[derive(Debug, Clone)]
pub struct MixdownEngine {
    config: RecorderConfig,
}

impl MixdownEngine {
    pub fn new(config: RecorderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Run the mixdown on a blocking worker thread and await it.
    ///
    /// `inputs` are consumed: the worker deletes them once it is done, even
    /// if the returned future is dropped first.
    pub async fn mixdown(
        &self,
        inputs: TempFiles,
        output_path: PathBuf,
        cancel: CancellationToken,
    ) -> Result<MixdownSummary, RecorderError> {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || engine.mixdown_blocking(inputs.paths(), &output_path, &cancel))
            .await
            .map_err(|e| RecorderError::Unknown(format!("mixdown worker failed: {}", e)))?
    }

    /// Mix `temp_files` into `output_path` on the calling thread.
    ///
    /// Missing, unreadable and empty captures are skipped. Sources are summed
    /// sample by sample; shorter ones contribute silence once exhausted.
    /// `cancel` is checked before every chunk. On any failure the partial
    /// artifact is removed.
    pub fn mixdown_blocking(
        &self,
        temp_files: &[PathBuf],
        output_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<MixdownSummary, RecorderError> {
        let mut sources = Vec::new();
        for path in temp_files {
            if !path.exists() {
                log::debug!("Skipping missing capture {}", path.display());
                continue;
            }
            match MixSource::open(path, &self.config) {
                Ok(Some(source)) => sources.push(source),
                Ok(None) => log::info!("Skipping empty capture {}", path.display()),
                Err(e) => log::warn!("Skipping unreadable capture: {}", e),
            }
        }

        if sources.is_empty() {
            return Err(RecorderError::NoValidInputs);
        }

        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| RecorderError::StorageError(format!("failed to create directory: {}", e)))?;
        }

        let sources_mixed = sources.len();
        let encoder = encoder::create_encoder(&self.config, output_path)?;
        match self.pump(&mut sources, encoder, cancel) {
            Ok(frames_written) => {
                log::info!(
                    "Mixdown complete: {} sources, {} frames → {}",
                    sources_mixed,
                    frames_written,
                    output_path.display()
                );
                Ok(MixdownSummary {
                    output_path: output_path.to_path_buf(),
                    frames_written,
                    sources_mixed,
                })
            }
            Err(e) => {
                if let Err(remove_err) = fs::remove_file(output_path) {
                    log::warn!("Failed to remove partial artifact {}: {}", output_path.display(), remove_err);
                }
                Err(e)
            }
        }
    }

    fn pump(
        &self,
        sources: &mut [MixSource],
        mut encoder: Box<dyn ArtifactEncoder>,
        cancel: &CancellationToken,
    ) -> Result<u64, RecorderError> {
        let channels = self.config.channels as usize;
        let mut bus = vec![0.0f32; self.config.mixdown_chunk_frames * channels];
        let mut samples_written = 0u64;

        loop {
            if cancel.is_cancelled() {
                log::info!("Mixdown cancelled after {} frames", samples_written / channels as u64);
                return Err(RecorderError::Cancelled);
            }

            bus.fill(0.0);
            let mut longest = 0;
            for source in sources.iter_mut() {
                longest = longest.max(source.mix_into(&mut bus)?);
            }
            if longest == 0 {
                break;
            }

            // Sources that keep their own channel count can end mid-frame; pad with silence.
            let aligned = longest.div_ceil(channels) * channels;
            encoder.write(&bus[..aligned])?;
            samples_written += aligned as u64;
        }

        encoder.finish()?;
        Ok(samples_written / channels as u64)
    }
}
