//! WASAPI shared-mode capture stream.
//!
//! Input endpoints are captured directly; render endpoints are captured
//! through `AUDCLNT_STREAMFLAGS_LOOPBACK`. No special permissions are needed
//! for loopback on Windows, but DRM-protected audio is silenced.
//!
//! All COM objects live on the stream's worker thread:
//! ```text
//! open()  → [worker: COM init, activate, Initialize] → format | error
//! start() → [worker: Start, poll every 10 ms, callback per packet]
//! stop()  → [worker: Stop, COM uninit] → joined
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use windows::core::w;
use windows::Win32::Media::Audio::{
    IAudioCaptureClient, IAudioClient, AUDCLNT_BUFFERFLAGS_SILENT, AUDCLNT_SHAREMODE_SHARED,
    AUDCLNT_STREAMFLAGS_AUTOCONVERTPCM, AUDCLNT_STREAMFLAGS_LOOPBACK, AUDCLNT_STREAMFLAGS_SRC_DEFAULT_QUALITY,
    WAVEFORMATEX, WAVEFORMATEXTENSIBLE,
};
use windows::Win32::Media::KernelStreaming::WAVE_FORMAT_EXTENSIBLE;
use windows::Win32::Media::Multimedia::{KSDATAFORMAT_SUBTYPE_IEEE_FLOAT, WAVE_FORMAT_IEEE_FLOAT};
use windows::Win32::System::Com::{CoTaskMemFree, CLSCTX_ALL};
use windows::Win32::System::Threading::AvSetMmThreadCharacteristicsW;

use aurora_capture_core::models::config::RecorderConfig;
use aurora_capture_core::models::endpoint::{EndpointDescriptor, EndpointDirection, StreamFormat};
use aurora_capture_core::models::error::RecorderError;
use aurora_capture_core::traits::capture_backend::{AudioBufferCallback, CaptureStream};

use crate::com::ComApartment;
use crate::device_enumerator::DeviceEnumerator;

/// Shared-mode buffer duration in 100 ns units (100 ms).
const BUFFER_DURATION: i64 = 1_000_000;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// An initialized WASAPI stream owned by a dedicated capture thread.
pub struct WasapiStream {
    endpoint_id: String,
    format: StreamFormat,
    running: Arc<AtomicBool>,
    start_tx: Option<mpsc::Sender<AudioBufferCallback>>,
    worker: Option<thread::JoinHandle<()>>,
    failure: Arc<Mutex<Option<RecorderError>>>,
}

impl WasapiStream {
    /// Activate and initialize the endpoint's audio client.
    ///
    /// Blocks until the worker reports the negotiated format or a failure.
    pub fn open(endpoint: &EndpointDescriptor, config: &RecorderConfig) -> Result<Self, RecorderError> {
        let loopback = endpoint.direction == EndpointDirection::OutputLoopback;
        let fallback_rate = config.sample_rate;
        let running = Arc::new(AtomicBool::new(false));
        let failure = Arc::new(Mutex::new(None));

        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<StreamFormat, RecorderError>>(1);
        let (start_tx, start_rx) = mpsc::channel::<AudioBufferCallback>();

        let worker = {
            let endpoint_id = endpoint.id.clone();
            let running = Arc::clone(&running);
            let failure = Arc::clone(&failure);
            thread::Builder::new()
                .name(if loopback { "wasapi-loopback" } else { "wasapi-capture" }.into())
                .spawn(move || {
                    let opened = ComApartment::enter()
                        .and_then(|com| CaptureClient::open(&endpoint_id, loopback, fallback_rate).map(|c| (com, c)));
                    let (_com, client) = match opened {
                        Ok(opened) => opened,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    let _ = ready_tx.send(Ok(client.format));

                    // Sender dropped before start: close without capturing.
                    let Ok(callback) = start_rx.recv() else {
                        return;
                    };
                    if let Err(e) = client.run(&running, &callback) {
                        log::error!("Capture of {} failed: {}", endpoint_id, e);
                        *failure.lock() = Some(e);
                    }
                    running.store(false, Ordering::SeqCst);
                })
                .map_err(|e| RecorderError::device_open(&endpoint.id, format!("failed to spawn capture thread: {}", e)))?
        };

        let format = match ready_rx.recv() {
            Ok(Ok(format)) => format,
            Ok(Err(e)) => {
                let _ = worker.join();
                return Err(match e {
                    RecorderError::DeviceOpen { .. } => e,
                    other => RecorderError::device_open(&endpoint.id, other.to_string()),
                });
            }
            Err(_) => {
                let _ = worker.join();
                return Err(RecorderError::device_open(&endpoint.id, "capture thread exited during open"));
            }
        };

        log::info!(
            "Opened WASAPI {} stream on {} ({})",
            if loopback { "loopback" } else { "capture" },
            endpoint.display_name,
            format
        );

        Ok(Self {
            endpoint_id: endpoint.id.clone(),
            format,
            running,
            start_tx: Some(start_tx),
            worker: Some(worker),
            failure,
        })
    }

    fn shut_down(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.start_tx = None;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl CaptureStream for WasapiStream {
    fn format(&self) -> StreamFormat {
        self.format
    }

    fn start(&mut self, callback: AudioBufferCallback) -> Result<(), RecorderError> {
        let Some(start_tx) = self.start_tx.take() else {
            return Err(RecorderError::ConfigurationFailed(format!(
                "stream for {} already started or closed",
                self.endpoint_id
            )));
        };

        self.running.store(true, Ordering::SeqCst);
        if start_tx.send(callback).is_err() {
            self.running.store(false, Ordering::SeqCst);
            return Err(self
                .failure
                .lock()
                .take()
                .unwrap_or_else(|| RecorderError::Unknown(format!("capture thread for {} has exited", self.endpoint_id))));
        }
        Ok(())
    }

    /// Halts capture and joins the worker; the stream cannot be restarted.
    fn stop(&mut self) -> Result<(), RecorderError> {
        self.shut_down();
        match self.failure.lock().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for WasapiStream {
    fn drop(&mut self) {
        self.shut_down();
    }
}

/// COM objects of one initialized stream. Confined to the worker thread.
struct CaptureClient {
    audio_client: IAudioClient,
    capture_client: IAudioCaptureClient,
    format: StreamFormat,
}

impl CaptureClient {
    /// Sequence:
    /// 1. Look up the device by id
    /// 2. Activate IAudioClient
    /// 3. Initialize in shared mode, float32 at the mix format or `fallback_rate`
    /// 4. Get the IAudioCaptureClient service
    fn open(endpoint_id: &str, loopback: bool, fallback_rate: u32) -> Result<Self, RecorderError> {
        let fail = |step: &str, e: windows::core::Error| RecorderError::device_open(endpoint_id, format!("{} failed: {}", step, e));

        unsafe {
            let device = DeviceEnumerator::new()?.device(endpoint_id)?;
            let audio_client: IAudioClient = device.Activate(CLSCTX_ALL, None).map_err(|e| fail("Activate", e))?;

            let mix_format = audio_client.GetMixFormat().map_err(|e| fail("GetMixFormat", e))?;
            let channels = (*mix_format).nChannels;
            let native_rate = (*mix_format).nSamplesPerSec;
            let native_float = is_float32(mix_format);

            let mut flags = if loopback { AUDCLNT_STREAMFLAGS_LOOPBACK } else { 0 };
            let requested;
            let (format_ptr, format) = if native_float {
                (
                    mix_format as *const WAVEFORMATEX,
                    StreamFormat {
                        sample_rate: native_rate,
                        channels,
                    },
                )
            } else {
                flags |= AUDCLNT_STREAMFLAGS_AUTOCONVERTPCM | AUDCLNT_STREAMFLAGS_SRC_DEFAULT_QUALITY;
                requested = float_format(fallback_rate, channels);
                (
                    &requested as *const WAVEFORMATEX,
                    StreamFormat {
                        sample_rate: fallback_rate,
                        channels,
                    },
                )
            };

            let initialized = audio_client.Initialize(AUDCLNT_SHAREMODE_SHARED, flags, BUFFER_DURATION, 0, format_ptr, None);
            CoTaskMemFree(Some(mix_format as *const _));
            initialized.map_err(|e| fail("IAudioClient::Initialize", e))?;

            let capture_client: IAudioCaptureClient = audio_client.GetService().map_err(|e| fail("GetService", e))?;

            Ok(Self {
                audio_client,
                capture_client,
                format,
            })
        }
    }

    /// Poll for packets until `running` clears.
    fn run(&self, running: &AtomicBool, callback: &AudioBufferCallback) -> Result<(), RecorderError> {
        unsafe {
            let mut task_index: u32 = 0;
            let _mmcss = AvSetMmThreadCharacteristicsW(w!("Pro Audio"), &mut task_index);

            self.audio_client
                .Start()
                .map_err(|e| RecorderError::Unknown(format!("IAudioClient::Start failed: {}", e)))?;
            let result = self.pump(running, callback);
            let _ = self.audio_client.Stop();
            result
        }
    }

    unsafe fn pump(&self, running: &AtomicBool, callback: &AudioBufferCallback) -> Result<(), RecorderError> {
        let channels = self.format.channels as usize;
        let mut silence = Vec::new();
        let err = |step: &str, e: windows::core::Error| RecorderError::Unknown(format!("{} failed: {}", step, e));

        while running.load(Ordering::SeqCst) {
            thread::sleep(POLL_INTERVAL);

            let mut packet_length = self
                .capture_client
                .GetNextPacketSize()
                .map_err(|e| err("GetNextPacketSize", e))?;

            while packet_length > 0 {
                let mut buffer_ptr: *mut u8 = std::ptr::null_mut();
                let mut num_frames: u32 = 0;
                let mut flags: u32 = 0;

                self.capture_client
                    .GetBuffer(&mut buffer_ptr, &mut num_frames, &mut flags, None, None)
                    .map_err(|e| err("GetBuffer", e))?;

                if num_frames > 0 && !buffer_ptr.is_null() {
                    let total_samples = num_frames as usize * channels;
                    if flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0 {
                        silence.clear();
                        silence.resize(total_samples, 0.0f32);
                        callback(&silence);
                    } else {
                        let samples = std::slice::from_raw_parts(buffer_ptr as *const f32, total_samples);
                        callback(samples);
                    }
                }

                self.capture_client
                    .ReleaseBuffer(num_frames)
                    .map_err(|e| err("ReleaseBuffer", e))?;

                packet_length = self
                    .capture_client
                    .GetNextPacketSize()
                    .map_err(|e| err("GetNextPacketSize", e))?;
            }
        }

        Ok(())
    }
}

/// True when `format` is 32-bit IEEE float, plain or extensible.
unsafe fn is_float32(format: *const WAVEFORMATEX) -> bool {
    let tag = (*format).wFormatTag as u32;
    let bits = (*format).wBitsPerSample;
    match tag {
        WAVE_FORMAT_IEEE_FLOAT => bits == 32,
        WAVE_FORMAT_EXTENSIBLE => {
            let extensible = format as *const WAVEFORMATEXTENSIBLE;
            let sub_format = std::ptr::addr_of!((*extensible).SubFormat).read_unaligned();
            bits == 32 && sub_format == KSDATAFORMAT_SUBTYPE_IEEE_FLOAT
        }
        _ => false,
    }
}

fn float_format(sample_rate: u32, channels: u16) -> WAVEFORMATEX {
    let block_align = channels * 4;
    WAVEFORMATEX {
        wFormatTag: WAVE_FORMAT_IEEE_FLOAT as u16,
        nChannels: channels,
        nSamplesPerSec: sample_rate,
        nAvgBytesPerSec: sample_rate * block_align as u32,
        nBlockAlign: block_align,
        wBitsPerSample: 32,
        cbSize: 0,
    }
}
