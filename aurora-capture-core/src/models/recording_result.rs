use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::endpoint::EndpointDirection;

/// Result returned when a recording job has been mixed down successfully.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    pub file_path: PathBuf,
    pub duration_secs: f64,
    pub metadata: RecordingMetadata,
    pub checksum: String,
}

/// One endpoint that contributed a capture to a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedSource {
    pub endpoint_id: String,
    pub display_name: String,
    pub direction: EndpointDirection,
    pub frames_captured: u64,
}

/// Metadata stored alongside a mixdown artifact.
///
/// Serializable for hand-off to post-processing (transcription, summaries).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: String,
    pub created_at: String,
    pub duration_secs: f64,
    pub file_path: String,
    pub checksum: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub format: String,
    pub sources: Vec<RecordedSource>,
}

impl RecordingMetadata {
    pub fn new(
        duration_secs: f64,
        file_path: &str,
        checksum: &str,
        sample_rate: u32,
        channels: u16,
        format: &str,
        sources: Vec<RecordedSource>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            duration_secs,
            file_path: file_path.to_string(),
            checksum: checksum.to_string(),
            sample_rate,
            channels,
            format: format.to_string(),
            sources,
        }
    }
}

/// Outcome of a completed mixdown.
#[derive(Debug, Clone, PartialEq)]
pub struct MixdownSummary {
    pub output_path: PathBuf,
    pub frames_written: u64,
    pub sources_mixed: usize,
}
