//! # aurora-capture-windows
//!
//! Windows WASAPI backend for aurora-capture.
//!
//! Provides:
//! - `WasapiBackend`: `EndpointEnumerator` + `CaptureBackend` over WASAPI
//! - `WasapiStream`: shared-mode capture; loopback for render endpoints
//! - `DeviceEnumerator`: active endpoint enumeration via the MMDevice API
//!
//! ## Platform Requirements
//! - Windows 10+
//! - Visual Studio Build Tools 2022 + Windows SDK for linking
//!
//! ## Usage
//! ```ignore
//! use aurora_capture_core::{DeviceMixConfiguration, RecorderConfig, RecordingCoordinator};
//! use aurora_capture_windows::WasapiBackend;
//!
//! let mut coordinator = RecordingCoordinator::new(WasapiBackend::new(), RecorderConfig::default())?;
//! let endpoints = coordinator.list_endpoints()?;
//! coordinator.start(&[DeviceMixConfiguration::selected(&endpoints[0].id)], "recordings".as_ref())?;
//! ```

#[cfg(target_os = "windows")]
mod com;
#[cfg(target_os = "windows")]
pub mod device_enumerator;
#[cfg(target_os = "windows")]
pub mod wasapi_capture;

#[cfg(target_os = "windows")]
pub use device_enumerator::DeviceEnumerator;
#[cfg(target_os = "windows")]
pub use wasapi_capture::WasapiStream;

#[cfg(target_os = "windows")]
mod backend {
    use aurora_capture_core::models::config::RecorderConfig;
    use aurora_capture_core::models::endpoint::EndpointDescriptor;
    use aurora_capture_core::models::error::RecorderError;
    use aurora_capture_core::traits::capture_backend::{CaptureBackend, CaptureStream, EndpointEnumerator};

    use crate::com::ComApartment;
    use crate::device_enumerator::DeviceEnumerator;
    use crate::wasapi_capture::WasapiStream;

    /// WASAPI capture backend. Every call enumerates afresh.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct WasapiBackend;

    impl WasapiBackend {
        pub fn new() -> Self {
            Self
        }
    }

    impl EndpointEnumerator for WasapiBackend {
        fn list_active_endpoints(&self) -> Result<Vec<EndpointDescriptor>, RecorderError> {
            let _com = ComApartment::enter().map_err(|e| RecorderError::EndpointEnumeration(e.to_string()))?;
            DeviceEnumerator::new()?.list_active_endpoints()
        }
    }

    impl CaptureBackend for WasapiBackend {
        fn open(&self, endpoint: &EndpointDescriptor, config: &RecorderConfig) -> Result<Box<dyn CaptureStream>, RecorderError> {
            Ok(Box::new(WasapiStream::open(endpoint, config)?))
        }
    }
}

#[cfg(target_os = "windows")]
pub use backend::WasapiBackend;
