use std::path::PathBuf;

/// Lifecycle of the recording coordinator.
///
/// State transitions:
/// ```text
/// idle → starting → recording → stopping → idle
///           ↓
///          idle (any session failed to open or start)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Starting,
    Recording,
    Stopping,
}

/// Job status reported to the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Idle,
    Starting,
    Recording { output_path: PathBuf, elapsed_secs: f64 },
    Stopping,
}

impl JobStatus {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording { .. })
    }

    pub fn elapsed(&self) -> Option<f64> {
        match self {
            Self::Recording { elapsed_secs, .. } => Some(*elapsed_secs),
            _ => None,
        }
    }
}

/// Lifecycle of a single capture session.
///
/// ```text
/// idle → capturing → stopped → released
///   └──────────────────────────↗
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Capturing,
    Stopped,
    Released,
}
