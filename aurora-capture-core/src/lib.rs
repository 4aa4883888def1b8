//! # aurora-capture-core
//!
//! Platform-agnostic multi-endpoint recording engine.
//!
//! Captures any number of input and loopback endpoints at once, applies live
//! per-endpoint gain from a mix console, and mixes the captures down into a
//! single artifact when the job stops. Platform backends (Windows WASAPI)
//! implement the `CaptureBackend` trait and plug into `RecordingCoordinator`.
//!
//! ## Architecture
//!
//! ```text
//! aurora-capture-core (this crate)
//! ├── traits/       ← EndpointEnumerator, CaptureBackend, CaptureStream
//! ├── models/       ← RecorderError, RecorderConfig, EndpointDescriptor, MixState, etc.
//! ├── processing/   ← channel/rate conversion, MixdownEngine, artifact encoders, WAV headers
//! ├── session/      ← MixConsole, CaptureSession, RecordingCoordinator
//! ├── storage/      ← SampleWriter, checksum, metadata sidecar
//! └── backends/     ← ReplayBackend (in-memory endpoints)
//! ```

pub mod backends;
pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use backends::replay::ReplayBackend;
pub use models::config::{ArtifactFormat, RecorderConfig};
pub use models::endpoint::{EndpointDescriptor, EndpointDirection, StreamFormat};
pub use models::error::RecorderError;
pub use models::mix::{DeviceMixConfiguration, MixState, MAX_VOLUME};
pub use models::recording_result::{MixdownSummary, RecordedSource, RecordingMetadata, RecordingResult};
pub use models::state::{CoordinatorState, JobStatus, SessionState};
pub use processing::mixdown::MixdownEngine;
pub use session::capture::CaptureSession;
pub use session::coordinator::RecordingCoordinator;
pub use session::mix_console::{GainQuery, MixConsole};
pub use traits::capture_backend::{AudioBufferCallback, CaptureBackend, CaptureStream, EndpointEnumerator};
pub use tokio_util::sync::CancellationToken;
