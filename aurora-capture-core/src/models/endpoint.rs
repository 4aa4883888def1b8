use std::fmt;

use serde::{Deserialize, Serialize};

/// Whether an endpoint is captured directly or through render loopback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointDirection {
    Input,
    OutputLoopback,
}

impl EndpointDirection {
    /// Short label used in composite descriptions.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Input => "Input",
            Self::OutputLoopback => "Output",
        }
    }
}

impl fmt::Display for EndpointDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// An OS audio endpoint usable as a capture source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub direction: EndpointDirection,
}

impl EndpointDescriptor {
    /// Build a descriptor whose description combines direction and interface name,
    /// e.g. `Input · Realtek(R) Audio`.
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, interface_name: &str, direction: EndpointDirection) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            description: format!("{} · {}", direction.label(), interface_name),
            direction,
        }
    }
}

/// Native stream format. Samples are always interleaved 32-bit float.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl fmt::Display for StreamFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz, {} ch, f32", self.sample_rate, self.channels)
    }
}
