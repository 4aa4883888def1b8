use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::config::RecorderConfig;
use crate::models::endpoint::{EndpointDescriptor, StreamFormat};
use crate::models::error::RecorderError;
use crate::models::state::SessionState;
use crate::session::mix_console::GainQuery;
use crate::storage::sample_writer::{SampleEncoding, SampleWriter};
use crate::traits::capture_backend::{AudioBufferCallback, CaptureBackend, CaptureStream};

/// Sink state shared between the driver callback and release.
struct Sink {
    writer: Option<SampleWriter>,
    released: bool,
    scratch: Vec<f32>,
    write_failures: u64,
}

impl Sink {
    /// Copy, scale and write one driver buffer. No-op once released.
    fn write(&mut self, samples: &[f32], gain: f32) {
        if self.released {
            return;
        }
        let Some(writer) = self.writer.as_mut() else {
            return;
        };

        self.scratch.clear();
        self.scratch.extend_from_slice(samples);
        if gain != 1.0 {
            for sample in self.scratch.iter_mut() {
                *sample *= gain;
            }
        }

        if let Err(e) = writer.write_samples(&self.scratch) {
            if self.write_failures == 0 {
                log::error!("Failed to write captured audio to {}: {}", writer.file_path().display(), e);
            }
            self.write_failures += 1;
        }
    }
}

/// Capture of one endpoint into a temporary float WAV file.
///
/// Owns the native stream and the sink. Dropping the session releases both.
pub struct CaptureSession {
    endpoint: EndpointDescriptor,
    temp_file_path: PathBuf,
    format: StreamFormat,
    stream: Option<Box<dyn CaptureStream>>,
    sink: Arc<Mutex<Sink>>,
    gain: GainQuery,
    state: SessionState,
    frames_written: u64,
}

impl CaptureSession {
    /// Open the native stream for `endpoint` and the temp sink.
    ///
    /// Fails with [`RecorderError::DeviceOpen`]; nothing stays open on failure.
    pub fn open(
        backend: &dyn CaptureBackend,
        endpoint: &EndpointDescriptor,
        gain: GainQuery,
        config: &RecorderConfig,
    ) -> Result<Self, RecorderError> {
        let stream = backend.open(endpoint, config)?;
        let format = stream.format();

        let temp_file_path = config
            .temp_directory
            .join(format!("{}_{}.wav", config.temp_prefix, uuid::Uuid::new_v4().simple()));

        let mut writer = SampleWriter::new(temp_file_path.clone(), SampleEncoding::Float32, format);
        if let Err(e) = writer.open() {
            // `stream` drops here, releasing the native handle.
            return Err(RecorderError::device_open(&endpoint.id, e.to_string()));
        }

        log::info!(
            "Opened {} ({}) as {} → {}",
            endpoint.display_name,
            endpoint.direction,
            format,
            temp_file_path.display()
        );

        Ok(Self {
            endpoint: endpoint.clone(),
            temp_file_path,
            format,
            stream: Some(stream),
            sink: Arc::new(Mutex::new(Sink {
                writer: Some(writer),
                released: false,
                scratch: Vec::new(),
                write_failures: 0,
            })),
            gain,
            state: SessionState::Idle,
            frames_written: 0,
        })
    }

    /// Begin delivering buffers to the sink. Transitions: idle → capturing.
    pub fn start(&mut self) -> Result<(), RecorderError> {
        if self.state != SessionState::Idle {
            return Err(RecorderError::ConfigurationFailed(format!(
                "cannot start capture of {} from {:?}",
                self.endpoint.id, self.state
            )));
        }
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| RecorderError::ConfigurationFailed("stream already released".into()))?;

        let sink = Arc::clone(&self.sink);
        let gain = Arc::clone(&self.gain);
        let callback: AudioBufferCallback = Arc::new(move |samples: &[f32]| {
            let gain = gain();
            sink.lock().write(samples, gain);
        });

        stream.start(callback)?;
        self.state = SessionState::Capturing;
        Ok(())
    }

    /// Ask the native stream to halt. Failures are logged and swallowed.
    pub fn stop(&mut self) {
        if self.state != SessionState::Capturing {
            return;
        }
        if let Some(stream) = self.stream.as_mut() {
            if let Err(e) = stream.stop() {
                log::warn!("Ignoring stop failure on {}: {}", self.endpoint.id, e);
            }
        }
        self.state = SessionState::Stopped;
    }

    /// Stop callback delivery, close the native stream and finalize the sink.
    ///
    /// Safe to call any number of times.
    pub fn release(&mut self) {
        if self.state == SessionState::Released {
            return;
        }

        // Callbacks observe `released` and return without touching the writer.
        let writer = {
            let mut sink = self.sink.lock();
            sink.released = true;
            if sink.write_failures > 0 {
                log::warn!("{} buffer writes failed on {}", sink.write_failures, self.endpoint.id);
            }
            sink.writer.take()
        };

        // Halting joins the driver thread, so it must not run under the sink lock.
        if let Some(mut stream) = self.stream.take() {
            if self.state == SessionState::Capturing {
                if let Err(e) = stream.stop() {
                    log::warn!("Ignoring stop failure on {}: {}", self.endpoint.id, e);
                }
            }
            drop(stream);
        }

        if let Some(mut writer) = writer {
            self.frames_written = writer.frames_written();
            if let Err(e) = writer.close() {
                log::warn!("Failed to finalize capture {}: {}", self.temp_file_path.display(), e);
            }
        }

        self.state = SessionState::Released;
        log::debug!("Released capture of {} ({} frames)", self.endpoint.id, self.frames_written);
    }

    pub fn endpoint(&self) -> &EndpointDescriptor {
        &self.endpoint
    }

    pub fn temp_file_path(&self) -> &Path {
        &self.temp_file_path
    }

    pub fn format(&self) -> StreamFormat {
        self.format
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Frames written to the sink so far.
    pub fn frames_written(&self) -> u64 {
        if self.state == SessionState::Released {
            return self.frames_written;
        }
        self.sink
            .lock()
            .writer
            .as_ref()
            .map(|w| w.frames_written())
            .unwrap_or(self.frames_written)
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::backends::replay::ReplayBackend;
    use crate::models::endpoint::EndpointDirection;
    use crate::models::mix::DeviceMixConfiguration;
    use crate::session::mix_console::MixConsole;
    use crate::traits::capture_backend::EndpointEnumerator;

    fn mic() -> EndpointDescriptor {
        EndpointDescriptor::new("mic", "Microphone", "USB", EndpointDirection::Input)
    }

    fn config_in(dir: &Path) -> RecorderConfig {
        RecorderConfig {
            temp_directory: dir.to_path_buf(),
            ..RecorderConfig::default()
        }
    }

    fn read_floats(path: &Path) -> Vec<f32> {
        hound::WavReader::open(path)
            .unwrap()
            .into_samples::<f32>()
            .map(|s| s.unwrap())
            .collect()
    }

    /// Holds on to the installed callback so tests can fire it by hand.
    #[derive(Default)]
    struct ManualBackend {
        callback: Arc<Mutex<Option<AudioBufferCallback>>>,
    }

    struct ManualStream {
        callback: Arc<Mutex<Option<AudioBufferCallback>>>,
    }

    impl EndpointEnumerator for ManualBackend {
        fn list_active_endpoints(&self) -> Result<Vec<EndpointDescriptor>, RecorderError> {
            Ok(vec![mic()])
        }
    }

    impl CaptureBackend for ManualBackend {
        fn open(&self, _: &EndpointDescriptor, _: &RecorderConfig) -> Result<Box<dyn CaptureStream>, RecorderError> {
            Ok(Box::new(ManualStream {
                callback: Arc::clone(&self.callback),
            }))
        }
    }

    impl CaptureStream for ManualStream {
        fn format(&self) -> StreamFormat {
            StreamFormat {
                sample_rate: 48000,
                channels: 2,
            }
        }

        fn start(&mut self, callback: AudioBufferCallback) -> Result<(), RecorderError> {
            *self.callback.lock() = Some(callback);
            Ok(())
        }

        fn stop(&mut self) -> Result<(), RecorderError> {
            Ok(())
        }
    }

    #[test]
    fn captures_scaled_by_live_gain() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ReplayBackend::new();
        backend.add_endpoint(
            mic(),
            StreamFormat {
                sample_rate: 44100,
                channels: 1,
            },
            vec![0.8; 1000],
        );

        let console = Arc::new(MixConsole::new());
        console.apply(&DeviceMixConfiguration::selected("mic").with_volume(0.5));

        let mut session = CaptureSession::open(&backend, &mic(), console.gain_query("mic"), &config_in(dir.path())).unwrap();
        assert_eq!(session.state(), SessionState::Idle);
        session.start().unwrap();
        assert_eq!(session.state(), SessionState::Capturing);
        session.stop();
        session.release();

        assert_eq!(session.frames_written(), 1000);
        let samples = read_floats(session.temp_file_path());
        assert_eq!(samples.len(), 1000);
        for s in samples {
            assert_abs_diff_eq!(s, 0.4, epsilon = 1e-6);
        }
    }

    #[test]
    fn unselected_endpoint_records_silence() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ReplayBackend::new();
        backend.add_endpoint(
            mic(),
            StreamFormat {
                sample_rate: 44100,
                channels: 1,
            },
            vec![0.8; 100],
        );

        let console = Arc::new(MixConsole::new());
        let mut session = CaptureSession::open(&backend, &mic(), console.gain_query("mic"), &config_in(dir.path())).unwrap();
        session.start().unwrap();
        session.release();

        let samples = read_floats(session.temp_file_path());
        assert_eq!(samples.len(), 100);
        assert!(samples.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn temp_file_named_with_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ManualBackend::default();
        let session = CaptureSession::open(&backend, &mic(), Arc::new(|| 1.0), &config_in(dir.path())).unwrap();

        let name = session.temp_file_path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("aurora_"));
        assert!(name.ends_with(".wav"));
        assert_eq!(session.temp_file_path().parent().unwrap(), dir.path());
        assert_eq!(session.format().channels, 2);
    }

    #[test]
    fn release_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ReplayBackend::new();
        backend.add_endpoint(
            mic(),
            StreamFormat {
                sample_rate: 44100,
                channels: 2,
            },
            vec![0.1; 200],
        );

        let mut session = CaptureSession::open(&backend, &mic(), Arc::new(|| 1.0), &config_in(dir.path())).unwrap();
        session.start().unwrap();
        assert_eq!(backend.open_streams(), 1);

        session.release();
        session.release();
        session.stop();
        assert_eq!(session.state(), SessionState::Released);
        assert_eq!(session.frames_written(), 100);
        assert_eq!(backend.open_streams(), 0);

        drop(session);
        assert_eq!(backend.open_streams(), 0);
    }

    #[test]
    fn release_during_paced_delivery_leaves_a_valid_capture() {
        let dir = tempfile::tempdir().unwrap();
        let total = 480 * 5000;
        let backend = ReplayBackend::paced(std::time::Duration::from_millis(1));
        backend.add_endpoint(
            mic(),
            StreamFormat {
                sample_rate: 44100,
                channels: 2,
            },
            vec![0.8; total * 2],
        );

        let mut session = CaptureSession::open(&backend, &mic(), Arc::new(|| 1.0), &config_in(dir.path())).unwrap();
        session.start().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        session.release();

        assert_eq!(session.state(), SessionState::Released);
        assert_eq!(backend.open_streams(), 0);
        let frames = session.frames_written();
        assert!(frames > 0 && frames < total as u64, "wrote {} frames", frames);

        let reader = hound::WavReader::open(session.temp_file_path()).unwrap();
        assert_eq!(reader.duration() as u64, frames);
        let samples = read_floats(session.temp_file_path());
        assert_eq!(samples.len() as u64, frames * 2);
        assert!(samples.iter().all(|&s| s == 0.8));
    }

    #[test]
    fn callbacks_after_release_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ManualBackend::default();
        let mut session = CaptureSession::open(&backend, &mic(), Arc::new(|| 1.0), &config_in(dir.path())).unwrap();
        session.start().unwrap();

        let callback = backend.callback.lock().clone().unwrap();
        callback(&[0.25, 0.25, 0.5, 0.5]);
        session.release();
        callback(&[1.0, 1.0]);

        assert_eq!(session.frames_written(), 2);
        assert_eq!(read_floats(session.temp_file_path()), vec![0.25, 0.25, 0.5, 0.5]);
    }

    #[test]
    fn start_twice_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ManualBackend::default();
        let mut session = CaptureSession::open(&backend, &mic(), Arc::new(|| 1.0), &config_in(dir.path())).unwrap();
        session.start().unwrap();
        assert!(matches!(session.start(), Err(RecorderError::ConfigurationFailed(_))));

        session.release();
        assert!(session.start().is_err());
    }

    #[test]
    fn open_failure_leaves_nothing_open() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ReplayBackend::new();
        backend.add_endpoint(
            mic(),
            StreamFormat {
                sample_rate: 44100,
                channels: 1,
            },
            Vec::new(),
        );
        backend.fail_on_open("mic");

        let result = CaptureSession::open(&backend, &mic(), Arc::new(|| 1.0), &config_in(dir.path()));
        assert!(matches!(result, Err(RecorderError::DeviceOpen { .. })));
        assert_eq!(backend.open_streams(), 0);
        assert_eq!(fs_entries(dir.path()), 0);
    }

    #[test]
    fn unwritable_temp_directory_is_a_device_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-directory");
        std::fs::write(&blocker, b"x").unwrap();
        let backend = ManualBackend::default();

        let result = CaptureSession::open(&backend, &mic(), Arc::new(|| 1.0), &config_in(&blocker));
        match result {
            Err(RecorderError::DeviceOpen { endpoint_id, .. }) => assert_eq!(endpoint_id, "mic"),
            other => panic!("expected DeviceOpen, got {:?}", other.err()),
        }
    }

    fn fs_entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }
}
