use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Local};
use tokio_util::sync::CancellationToken;

use crate::models::config::RecorderConfig;
use crate::models::endpoint::EndpointDescriptor;
use crate::models::error::RecorderError;
use crate::models::mix::DeviceMixConfiguration;
use crate::models::recording_result::{RecordedSource, RecordingMetadata, RecordingResult};
use crate::models::state::{CoordinatorState, JobStatus};
use crate::processing::mixdown::MixdownEngine;
use crate::session::capture::CaptureSession;
use crate::session::mix_console::MixConsole;
use crate::storage::temp_files::TempFiles;
use crate::storage::{checksum, metadata};
use crate::traits::capture_backend::CaptureBackend;

/// Returns the coordinator to idle and cancels the mixdown when `stop`
/// completes or its future is dropped.
struct StopGuard<'a> {
    state: &'a mut CoordinatorState,
    mixdown: CancellationToken,
}

impl Drop for StopGuard<'_> {
    fn drop(&mut self) {
        self.mixdown.cancel();
        *self.state = CoordinatorState::Idle;
    }
}

/// The one active recording.
struct RecordingJob {
    output_path: PathBuf,
    started_at: DateTime<Local>,
    started: Instant,
    sessions: Vec<CaptureSession>,
}

/// Coordinates one recording job across every selected endpoint.
///
/// ```text
/// [Endpoint A] → [CaptureSession] → temp A.wav ─┐
/// [Endpoint B] → [CaptureSession] → temp B.wav ─┼→ [MixdownEngine] → artifact
/// [Endpoint C] → [CaptureSession] → temp C.wav ─┘
///                      ↑ gain
///                 [MixConsole] ← update_device_state
/// ```
///
/// Start and stop take `&mut self`, so they are serialized by the borrow.
/// Gain updates go through the shared console and may arrive at any time.
pub struct RecordingCoordinator<B: CaptureBackend> {
    backend: B,
    console: Arc<MixConsole>,
    config: RecorderConfig,
    engine: MixdownEngine,
    state: CoordinatorState,
    job: Option<RecordingJob>,
}

impl<B: CaptureBackend> RecordingCoordinator<B> {
    pub fn new(backend: B, config: RecorderConfig) -> Result<Self, RecorderError> {
        config.validate().map_err(RecorderError::ConfigurationFailed)?;
        Ok(Self {
            backend,
            console: Arc::new(MixConsole::new()),
            engine: MixdownEngine::new(config.clone()),
            config,
            state: CoordinatorState::Idle,
            job: None,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn console(&self) -> &Arc<MixConsole> {
        &self.console
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn list_endpoints(&self) -> Result<Vec<EndpointDescriptor>, RecorderError> {
        self.backend.list_active_endpoints()
    }

    /// Start capturing every selected endpoint. Transitions: idle → starting → recording.
    ///
    /// Returns the path the artifact will be written to. On failure every
    /// session opened by this attempt is released, its temp file removed, and
    /// the coordinator is back to idle.
    pub fn start(
        &mut self,
        selection: &[DeviceMixConfiguration],
        output_folder: &Path,
    ) -> Result<PathBuf, RecorderError> {
        if self.state != CoordinatorState::Idle || self.job.is_some() {
            return Err(RecorderError::AlreadyRecording);
        }

        let mut seen = HashSet::new();
        let selected: Vec<&DeviceMixConfiguration> = selection
            .iter()
            .filter(|c| c.selected && seen.insert(c.endpoint_id.as_str()))
            .collect();
        if selected.is_empty() {
            return Err(RecorderError::NoActiveJobSources);
        }

        self.state = CoordinatorState::Starting;
        match self.start_sessions(&selected, output_folder) {
            Ok(job) => {
                let output_path = job.output_path.clone();
                log::info!(
                    "Recording {} endpoint(s) → {}",
                    job.sessions.len(),
                    output_path.display()
                );
                self.job = Some(job);
                self.state = CoordinatorState::Recording;
                Ok(output_path)
            }
            Err(e) => {
                log::error!("Failed to start recording: {}", e);
                self.state = CoordinatorState::Idle;
                Err(e)
            }
        }
    }

    fn start_sessions(
        &self,
        selected: &[&DeviceMixConfiguration],
        output_folder: &Path,
    ) -> Result<RecordingJob, RecorderError> {
        self.console.reset();
        for config in selected {
            self.console.apply(config);
        }

        fs::create_dir_all(output_folder)
            .map_err(|e| RecorderError::StorageError(format!("failed to create output folder: {}", e)))?;
        let started_at = Local::now();
        let output_path = output_folder.join(format!(
            "{}_{}.{}",
            self.config.app_prefix,
            started_at.format("%Y%m%d_%H%M%S"),
            self.config.artifact_format.extension()
        ));

        let endpoints = self.backend.list_active_endpoints()?;
        let mut sessions = Vec::with_capacity(selected.len());

        for config in selected {
            let opened = endpoints
                .iter()
                .find(|e| e.id == config.endpoint_id)
                .ok_or_else(|| RecorderError::device_open(&config.endpoint_id, "endpoint is not active"))
                .and_then(|endpoint| {
                    CaptureSession::open(
                        &self.backend,
                        endpoint,
                        self.console.gain_query(&endpoint.id),
                        &self.config,
                    )
                });
            match opened {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    Self::roll_back(sessions);
                    return Err(e);
                }
            }
        }

        if let Err(e) = sessions.iter_mut().try_for_each(CaptureSession::start) {
            Self::roll_back(sessions);
            return Err(e);
        }

        Ok(RecordingJob {
            output_path,
            started_at,
            started: Instant::now(),
            sessions,
        })
    }

    fn roll_back(mut sessions: Vec<CaptureSession>) {
        log::info!("Rolling back {} opened session(s)", sessions.len());
        let mut temp_files = TempFiles::new();
        for session in sessions.iter_mut() {
            session.stop();
            session.release();
            temp_files.push(session.temp_file_path().to_path_buf());
        }
    }

    /// Stop the active job, mix it down and clean up.
    /// Transitions: recording → stopping → idle.
    ///
    /// Returns `Ok(None)` when nothing is recording. Temp captures are
    /// removed whether or not the mixdown succeeds. Dropping the returned
    /// future also leaves the coordinator idle: the mixdown is cancelled and
    /// its worker removes the temp captures and any partial artifact.
    pub async fn stop(&mut self, cancel: CancellationToken) -> Result<Option<RecordingResult>, RecorderError> {
        let Some(mut job) = self.job.take() else {
            return Ok(None);
        };
        self.state = CoordinatorState::Stopping;
        let guard = StopGuard {
            state: &mut self.state,
            mixdown: cancel.child_token(),
        };

        let duration_secs = job.started.elapsed().as_secs_f64();
        for session in job.sessions.iter_mut() {
            session.stop();
        }

        let mut sources = Vec::with_capacity(job.sessions.len());
        let mut temp_files = TempFiles::new();
        for session in job.sessions.iter_mut() {
            session.release();
            let endpoint = session.endpoint();
            sources.push(RecordedSource {
                endpoint_id: endpoint.id.clone(),
                display_name: endpoint.display_name.clone(),
                direction: endpoint.direction,
                frames_captured: session.frames_written(),
            });
            temp_files.push(session.temp_file_path().to_path_buf());
        }
        drop(job.sessions);

        log::info!(
            "Stopped recording started at {} after {:.1}s, mixing {} capture(s)",
            job.started_at.format("%H:%M:%S"),
            duration_secs,
            temp_files.len()
        );

        let result = self
            .engine
            .mixdown(temp_files, job.output_path, guard.mixdown.clone())
            .await
            .and_then(|summary| finish_recording(&self.config, summary.output_path, duration_secs, sources));
        drop(guard);
        result.map(Some)
    }

    /// Forward a mix update to the console. Valid at any time.
    pub fn update_device_state(&self, config: &DeviceMixConfiguration) {
        self.console.apply(config);
    }

    pub fn effective_gain(&self, endpoint_id: &str) -> f32 {
        self.console.effective_gain(endpoint_id)
    }

    pub fn is_recording(&self) -> bool {
        self.job.is_some()
    }

    /// Time since the active job started.
    pub fn elapsed(&self) -> Option<f64> {
        self.job.as_ref().map(|job| job.started.elapsed().as_secs_f64())
    }

    pub fn current_output_path(&self) -> Option<&Path> {
        self.job.as_ref().map(|job| job.output_path.as_path())
    }

    pub fn status(&self) -> JobStatus {
        match (self.state, &self.job) {
            (CoordinatorState::Recording, Some(job)) => JobStatus::Recording {
                output_path: job.output_path.clone(),
                elapsed_secs: job.started.elapsed().as_secs_f64(),
            },
            (CoordinatorState::Starting, _) => JobStatus::Starting,
            (CoordinatorState::Stopping, _) => JobStatus::Stopping,
            _ => JobStatus::Idle,
        }
    }
}

impl<B: CaptureBackend> Drop for RecordingCoordinator<B> {
    fn drop(&mut self) {
        if let Some(job) = self.job.take() {
            log::warn!("Discarding unfinished recording {}", job.output_path.display());
            Self::roll_back(job.sessions);
        }
    }
}

fn finish_recording(
    config: &RecorderConfig,
    file_path: PathBuf,
    duration_secs: f64,
    sources: Vec<RecordedSource>,
) -> Result<RecordingResult, RecorderError> {
    let checksum = checksum::sha256_file(&file_path)?;
    let metadata = RecordingMetadata::new(
        duration_secs,
        &file_path.to_string_lossy(),
        &checksum,
        config.sample_rate,
        config.channels,
        config.artifact_format.extension(),
        sources,
    );

    if config.write_metadata {
        metadata::write_metadata(&metadata, &file_path)?;
    }

    Ok(RecordingResult {
        file_path,
        duration_secs,
        metadata,
        checksum,
    })
}
