use std::sync::Arc;

use crate::models::config::RecorderConfig;
use crate::models::endpoint::{EndpointDescriptor, StreamFormat};
use crate::models::error::RecorderError;

/// Callback invoked when an audio buffer is available.
///
/// `samples` are interleaved f32 in the stream's [`StreamFormat`]. The callback
/// fires on the driver thread; keep processing minimal.
pub type AudioBufferCallback = Arc<dyn Fn(&[f32]) + Send + Sync + 'static>;

/// Lists endpoints currently usable as capture sources.
pub trait EndpointEnumerator: Send + Sync {
    /// Re-queries the audio subsystem on every call.
    fn list_active_endpoints(&self) -> Result<Vec<EndpointDescriptor>, RecorderError>;
}

/// Opens native capture streams.
///
/// Implemented by:
/// - `WasapiBackend` (Windows): standard capture for inputs, loopback for outputs
/// - test backends that replay synthetic buffers
pub trait CaptureBackend: EndpointEnumerator {
    /// Open a stream for `endpoint`.
    ///
    /// The stream must deliver 32-bit float samples; when the native default is
    /// not float, the backend requests float at `config.sample_rate`.
    /// Fails with [`RecorderError::DeviceOpen`].
    fn open(&self, endpoint: &EndpointDescriptor, config: &RecorderConfig) -> Result<Box<dyn CaptureStream>, RecorderError>;
}

/// An open native capture stream. Dropping it releases the native handle.
pub trait CaptureStream: Send {
    /// Format of the buffers passed to the callback.
    fn format(&self) -> StreamFormat;

    /// Begin delivering buffers to `callback`.
    fn start(&mut self, callback: AudioBufferCallback) -> Result<(), RecorderError>;

    /// Halt delivery. After this returns no further callbacks are made.
    fn stop(&mut self) -> Result<(), RecorderError>;
}
