//! In-memory capture backend that replays prepared buffers.
//!
//! Used for offline processing and for exercising the coordinator without
//! audio hardware. Each registered endpoint carries its own format and
//! sample data; opening can be made to fail per endpoint.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use hound::{SampleFormat, WavReader};
use parking_lot::Mutex;

use crate::models::config::RecorderConfig;
use crate::models::endpoint::{EndpointDescriptor, StreamFormat};
use crate::models::error::RecorderError;
use crate::traits::capture_backend::{AudioBufferCallback, CaptureBackend, CaptureStream, EndpointEnumerator};

/// Frames per delivered buffer (10 ms at 48 kHz).
const BLOCK_FRAMES: usize = 480;

#[derive(Clone)]
struct ReplaySource {
    descriptor: EndpointDescriptor,
    format: StreamFormat,
    samples: Arc<Vec<f32>>,
}

/// Replays fixed buffers as if they came from capture endpoints.
///
/// Without pacing, a stream delivers its whole buffer inside `start`. With
/// pacing, blocks are delivered from a worker thread with a sleep between them.
#[derive(Default)]
pub struct ReplayBackend {
    sources: Mutex<Vec<ReplaySource>>,
    failing: Mutex<HashSet<String>>,
    enumeration_failure: Mutex<Option<String>>,
    pace: Option<Duration>,
    open_streams: Arc<AtomicUsize>,
    opened_total: AtomicUsize,
}

impl ReplayBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver blocks from a worker thread, sleeping `pace` between them.
    pub fn paced(pace: Duration) -> Self {
        Self {
            pace: Some(pace),
            ..Self::default()
        }
    }

    /// Register an endpoint that will deliver `samples` (interleaved, `format`).
    pub fn add_endpoint(&self, descriptor: EndpointDescriptor, format: StreamFormat, samples: Vec<f32>) {
        self.sources.lock().push(ReplaySource {
            descriptor,
            format,
            samples: Arc::new(samples),
        });
    }

    /// Register an endpoint that replays the contents of a WAV file.
    pub fn add_wav_file(&self, descriptor: EndpointDescriptor, path: &Path) -> Result<(), RecorderError> {
        let reader = WavReader::open(path)
            .map_err(|e| RecorderError::StorageError(format!("failed to open {}: {}", path.display(), e)))?;
        let spec = reader.spec();
        let samples: Result<Vec<f32>, hound::Error> = match spec.sample_format {
            SampleFormat::Float => reader.into_samples::<f32>().collect(),
            SampleFormat::Int => {
                let scale = 1.0 / (1u64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader.into_samples::<i32>().map(|s| s.map(|v| v as f32 * scale)).collect()
            }
        };
        let samples = samples.map_err(|e| RecorderError::StorageError(format!("failed to read {}: {}", path.display(), e)))?;

        log::debug!("Loaded {} samples for replay endpoint {}", samples.len(), descriptor.id);
        self.add_endpoint(
            descriptor,
            StreamFormat {
                sample_rate: spec.sample_rate,
                channels: spec.channels,
            },
            samples,
        );
        Ok(())
    }

    /// Make `open` fail for `endpoint_id`.
    pub fn fail_on_open(&self, endpoint_id: &str) {
        self.failing.lock().insert(endpoint_id.to_string());
    }

    /// Make enumeration fail with `reason` (`None` restores it).
    pub fn fail_enumeration(&self, reason: Option<&str>) {
        *self.enumeration_failure.lock() = reason.map(str::to_string);
    }

    /// Streams currently open (opened and not yet dropped).
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }

    /// Streams opened successfully since creation.
    pub fn opened_total(&self) -> usize {
        self.opened_total.load(Ordering::SeqCst)
    }
}

impl EndpointEnumerator for ReplayBackend {
    fn list_active_endpoints(&self) -> Result<Vec<EndpointDescriptor>, RecorderError> {
        if let Some(reason) = self.enumeration_failure.lock().clone() {
            return Err(RecorderError::EndpointEnumeration(reason));
        }
        Ok(self.sources.lock().iter().map(|s| s.descriptor.clone()).collect())
    }
}

impl CaptureBackend for ReplayBackend {
    fn open(&self, endpoint: &EndpointDescriptor, _config: &RecorderConfig) -> Result<Box<dyn CaptureStream>, RecorderError> {
        if self.failing.lock().contains(&endpoint.id) {
            return Err(RecorderError::device_open(&endpoint.id, "replay endpoint configured to fail"));
        }

        let source = self
            .sources
            .lock()
            .iter()
            .find(|s| s.descriptor.id == endpoint.id)
            .cloned()
            .ok_or_else(|| RecorderError::device_open(&endpoint.id, "unknown replay endpoint"))?;

        self.open_streams.fetch_add(1, Ordering::SeqCst);
        self.opened_total.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(ReplayStream {
            format: source.format,
            samples: source.samples,
            pace: self.pace,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            open_streams: Arc::clone(&self.open_streams),
        }))
    }
}

struct ReplayStream {
    format: StreamFormat,
    samples: Arc<Vec<f32>>,
    pace: Option<Duration>,
    running: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
    open_streams: Arc<AtomicUsize>,
}

impl CaptureStream for ReplayStream {
    fn format(&self) -> StreamFormat {
        self.format
    }

    fn start(&mut self, callback: AudioBufferCallback) -> Result<(), RecorderError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(RecorderError::ConfigurationFailed("replay stream already running".into()));
        }

        let block = BLOCK_FRAMES * self.format.channels.max(1) as usize;
        let Some(pace) = self.pace else {
            for chunk in self.samples.chunks(block) {
                callback(chunk);
            }
            return Ok(());
        };

        let samples = Arc::clone(&self.samples);
        let running = Arc::clone(&self.running);
        let handle = thread::Builder::new()
            .name("replay-capture".into())
            .spawn(move || {
                for chunk in samples.chunks(block) {
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }
                    callback(chunk);
                    thread::sleep(pace);
                }
            })
            .map_err(|e| RecorderError::Unknown(format!("failed to spawn replay thread: {}", e)))?;

        self.worker = Some(handle);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RecorderError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        Ok(())
    }
}

impl Drop for ReplayStream {
    fn drop(&mut self) {
        let _ = self.stop();
        self.open_streams.fetch_sub(1, Ordering::SeqCst);
    }
}
