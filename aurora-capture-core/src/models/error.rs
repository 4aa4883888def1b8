use thiserror::Error;

/// Errors raised by enumeration, capture, and mixdown.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecorderError {
    #[error("endpoint enumeration failed: {0}")]
    EndpointEnumeration(String),

    #[error("failed to open endpoint {endpoint_id}: {reason}")]
    DeviceOpen { endpoint_id: String, reason: String },

    #[error("no audio source selected")]
    NoActiveJobSources,

    #[error("no valid captures to mix")]
    NoValidInputs,

    #[error("a recording is already in progress")]
    AlreadyRecording,

    #[error("mixdown cancelled")]
    Cancelled,

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("encoding failed: {0}")]
    EncodingFailed(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl RecorderError {
    pub fn device_open(endpoint_id: &str, reason: impl Into<String>) -> Self {
        Self::DeviceOpen {
            endpoint_id: endpoint_id.to_string(),
            reason: reason.into(),
        }
    }
}
