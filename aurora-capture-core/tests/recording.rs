//! End-to-end recording jobs against the in-memory replay backend.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use aurora_capture_core::storage::{checksum, metadata};
use aurora_capture_core::storage::sample_writer::to_pcm16;
use aurora_capture_core::{
    ArtifactFormat, CancellationToken, CoordinatorState, DeviceMixConfiguration, EndpointDescriptor, EndpointDirection,
    JobStatus, RecorderConfig, RecorderError, RecordingCoordinator, ReplayBackend, StreamFormat,
};

const MONO_44K: StreamFormat = StreamFormat {
    sample_rate: 44100,
    channels: 1,
};

const STEREO_44K: StreamFormat = StreamFormat {
    sample_rate: 44100,
    channels: 2,
};

struct Fixture {
    _root: tempfile::TempDir,
    temp_dir: PathBuf,
    output_dir: PathBuf,
    config: RecorderConfig,
}

impl Fixture {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let temp_dir = root.path().join("temp");
        let output_dir = root.path().join("recordings");
        fs::create_dir_all(&temp_dir).unwrap();
        let config = RecorderConfig {
            temp_directory: temp_dir.clone(),
            artifact_format: ArtifactFormat::Wav,
            mixdown_chunk_frames: 1024,
            ..RecorderConfig::default()
        };
        Self {
            _root: root,
            temp_dir,
            output_dir,
            config,
        }
    }

    fn coordinator(&self, backend: ReplayBackend) -> RecordingCoordinator<ReplayBackend> {
        RecordingCoordinator::new(backend, self.config.clone()).unwrap()
    }

    fn temp_files(&self) -> usize {
        fs::read_dir(&self.temp_dir).unwrap().count()
    }
}

fn input(id: &str) -> EndpointDescriptor {
    EndpointDescriptor::new(id, format!("Mic {}", id), "USB Audio", EndpointDirection::Input)
}

fn output(id: &str) -> EndpointDescriptor {
    EndpointDescriptor::new(id, format!("Speakers {}", id), "Realtek", EndpointDirection::OutputLoopback)
}

fn read_pcm(path: &Path) -> Vec<i16> {
    hound::WavReader::open(path)
        .unwrap()
        .into_samples::<i16>()
        .map(|s| s.unwrap())
        .collect()
}

#[test]
fn start_with_nothing_selected_fails_without_a_job() {
    let fx = Fixture::new();
    let backend = ReplayBackend::new();
    backend.add_endpoint(input("a"), MONO_44K, vec![0.1; 100]);
    let mut coordinator = fx.coordinator(backend);

    let err = coordinator.start(&[], &fx.output_dir).unwrap_err();
    assert_eq!(err, RecorderError::NoActiveJobSources);

    let unselected = DeviceMixConfiguration {
        selected: false,
        ..DeviceMixConfiguration::selected("a")
    };
    let err = coordinator.start(&[unselected], &fx.output_dir).unwrap_err();
    assert_eq!(err, RecorderError::NoActiveJobSources);

    assert!(!coordinator.is_recording());
    assert_eq!(coordinator.state(), CoordinatorState::Idle);
    assert_eq!(coordinator.backend().opened_total(), 0);
}

#[test]
fn one_failing_endpoint_rolls_back_the_others() {
    let fx = Fixture::new();
    let backend = ReplayBackend::new();
    backend.add_endpoint(input("a"), MONO_44K, vec![0.1; 100]);
    backend.add_endpoint(output("b"), STEREO_44K, vec![0.1; 200]);
    backend.add_endpoint(input("c"), MONO_44K, vec![0.1; 100]);
    backend.fail_on_open("c");
    let mut coordinator = fx.coordinator(backend);

    let selection = [
        DeviceMixConfiguration::selected("a"),
        DeviceMixConfiguration::selected("b"),
        DeviceMixConfiguration::selected("c"),
    ];
    let err = coordinator.start(&selection, &fx.output_dir).unwrap_err();

    assert!(matches!(err, RecorderError::DeviceOpen { ref endpoint_id, .. } if endpoint_id == "c"));
    assert_eq!(coordinator.backend().opened_total(), 2);
    assert_eq!(coordinator.backend().open_streams(), 0);
    assert_eq!(fx.temp_files(), 0);
    assert!(!coordinator.is_recording());
    assert!(coordinator.status().is_idle());
}

#[test]
fn inactive_endpoint_is_a_device_open_error() {
    let fx = Fixture::new();
    let backend = ReplayBackend::new();
    backend.add_endpoint(input("a"), MONO_44K, vec![0.1; 100]);
    let mut coordinator = fx.coordinator(backend);

    let selection = [
        DeviceMixConfiguration::selected("a"),
        DeviceMixConfiguration::selected("unplugged"),
    ];
    let err = coordinator.start(&selection, &fx.output_dir).unwrap_err();

    assert!(matches!(err, RecorderError::DeviceOpen { ref endpoint_id, .. } if endpoint_id == "unplugged"));
    assert_eq!(coordinator.backend().open_streams(), 0);
    assert_eq!(fx.temp_files(), 0);
}

#[test]
fn enumeration_failure_surfaces() {
    let fx = Fixture::new();
    let backend = ReplayBackend::new();
    backend.add_endpoint(input("a"), MONO_44K, vec![0.1; 100]);
    backend.fail_enumeration(Some("audio service unavailable"));
    let mut coordinator = fx.coordinator(backend);

    assert!(matches!(coordinator.list_endpoints(), Err(RecorderError::EndpointEnumeration(_))));
    let err = coordinator
        .start(&[DeviceMixConfiguration::selected("a")], &fx.output_dir)
        .unwrap_err();
    assert!(matches!(err, RecorderError::EndpointEnumeration(_)));
    assert_eq!(coordinator.state(), CoordinatorState::Idle);
}

#[tokio::test]
async fn stop_without_a_job_returns_none() {
    let fx = Fixture::new();
    let mut coordinator = fx.coordinator(ReplayBackend::new());

    let result = coordinator.stop(CancellationToken::new()).await.unwrap();
    assert!(result.is_none());
    assert_eq!(coordinator.state(), CoordinatorState::Idle);
}

#[tokio::test]
async fn second_start_is_rejected_while_recording() {
    let fx = Fixture::new();
    let backend = ReplayBackend::new();
    backend.add_endpoint(input("a"), MONO_44K, vec![0.1; 100]);
    let mut coordinator = fx.coordinator(backend);
    let selection = [DeviceMixConfiguration::selected("a")];

    let planned = coordinator.start(&selection, &fx.output_dir).unwrap();
    assert_eq!(coordinator.current_output_path(), Some(planned.as_path()));
    assert!(matches!(coordinator.status(), JobStatus::Recording { .. }));

    assert_eq!(coordinator.start(&selection, &fx.output_dir).unwrap_err(), RecorderError::AlreadyRecording);
    assert_eq!(coordinator.backend().opened_total(), 1);

    coordinator.stop(CancellationToken::new()).await.unwrap();
}

#[tokio::test]
async fn single_input_round_trips_through_mixdown() {
    let fx = Fixture::new();
    let samples: Vec<f32> = (0..8820).map(|i| ((i % 100) as f32 / 100.0) - 0.5).collect();
    let backend = ReplayBackend::new();
    backend.add_endpoint(output("speakers"), STEREO_44K, samples.clone());
    let mut coordinator = fx.coordinator(backend);

    let planned = coordinator
        .start(&[DeviceMixConfiguration::selected("speakers")], &fx.output_dir)
        .unwrap();
    let name = planned.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("Aurora_"));
    assert!(name.ends_with(".wav"));
    assert_eq!(name.len(), "Aurora_20240101_120000.wav".len());

    let result = coordinator.stop(CancellationToken::new()).await.unwrap().unwrap();

    assert_eq!(result.file_path, planned);
    let expected: Vec<i16> = samples.iter().map(|&s| to_pcm16(s)).collect();
    assert_eq!(read_pcm(&result.file_path), expected);

    assert_eq!(result.checksum, checksum::sha256_file(&result.file_path).unwrap());
    let stored = metadata::read_metadata(&result.file_path).unwrap();
    assert_eq!(stored.id, result.metadata.id);
    assert_eq!(stored.checksum, result.checksum);
    assert!((stored.duration_secs - result.duration_secs).abs() < 1e-9);
    assert_eq!(stored.sources.len(), 1);
    assert_eq!(stored.sources[0].endpoint_id, "speakers");
    assert_eq!(stored.sources[0].frames_captured, 4410);
    assert_eq!(stored.format, "wav");

    assert_eq!(fx.temp_files(), 0);
    assert!(!coordinator.is_recording());
    assert_eq!(coordinator.backend().open_streams(), 0);
}

/// Interleaved stereo with the right channel mirroring the left.
fn mirrored_ramp(frames: usize) -> Vec<f32> {
    (0..frames)
        .flat_map(|i| {
            let left = ((i % 100) as f32 / 100.0 - 0.5) * 0.6;
            [left, -left]
        })
        .collect()
}

fn sawtooth(frames: usize) -> Vec<f32> {
    (0..frames).map(|i| (((i * 7) % 64) as f32 / 64.0 - 0.5) * 0.4).collect()
}

fn assert_frames_near(mixed: &[i16], expected: &[f32]) {
    assert_eq!(mixed.len(), expected.len());
    for (i, (&got, &want)) in mixed.iter().zip(expected).enumerate() {
        let want = to_pcm16(want);
        assert!((got - want).abs() <= 1, "sample {} was {}, expected {}", i, got, want);
    }
}

#[tokio::test]
async fn half_volume_source_is_mixed_at_half_level() {
    let fx = Fixture::new();
    let a = mirrored_ramp(4410);
    let b = sawtooth(4410);
    let backend = ReplayBackend::new();
    backend.add_endpoint(output("a"), STEREO_44K, a.clone());
    backend.add_endpoint(input("b"), MONO_44K, b.clone());
    let mut coordinator = fx.coordinator(backend);

    let selection = [
        DeviceMixConfiguration::selected("a"),
        DeviceMixConfiguration::selected("b").with_volume(0.5),
    ];
    coordinator.start(&selection, &fx.output_dir).unwrap();
    let result = coordinator.stop(CancellationToken::new()).await.unwrap().unwrap();

    // Mono B lands on both channels: L = aL + 0.5·b, R = aR + 0.5·b.
    let expected: Vec<f32> = a
        .chunks(2)
        .zip(&b)
        .flat_map(|(frame, &mono)| [frame[0] + 0.5 * mono, frame[1] + 0.5 * mono])
        .collect();
    assert_frames_near(&read_pcm(&result.file_path), &expected);
}

#[tokio::test]
async fn solo_silences_other_selected_endpoints() {
    let fx = Fixture::new();
    let a = mirrored_ramp(4410);
    let backend = ReplayBackend::new();
    backend.add_endpoint(output("a"), STEREO_44K, a.clone());
    backend.add_endpoint(input("b"), MONO_44K, sawtooth(4410));
    let mut coordinator = fx.coordinator(backend);

    let selection = [
        DeviceMixConfiguration::selected("a").with_solo(true),
        DeviceMixConfiguration::selected("b"),
    ];
    coordinator.start(&selection, &fx.output_dir).unwrap();
    assert_eq!(coordinator.effective_gain("a"), 1.0);
    assert_eq!(coordinator.effective_gain("b"), 0.0);

    let result = coordinator.stop(CancellationToken::new()).await.unwrap().unwrap();
    let expected: Vec<i16> = a.iter().map(|&s| to_pcm16(s)).collect();
    assert_eq!(read_pcm(&result.file_path), expected);
    assert_eq!(result.metadata.sources.len(), 2);
}

#[tokio::test]
async fn zero_frame_captures_fail_and_clean_up() {
    let fx = Fixture::new();
    let backend = ReplayBackend::new();
    backend.add_endpoint(input("a"), MONO_44K, Vec::new());
    backend.add_endpoint(output("b"), STEREO_44K, Vec::new());
    let mut coordinator = fx.coordinator(backend);

    let planned = coordinator
        .start(
            &[DeviceMixConfiguration::selected("a"), DeviceMixConfiguration::selected("b")],
            &fx.output_dir,
        )
        .unwrap();
    assert_eq!(fx.temp_files(), 2);

    let err = coordinator.stop(CancellationToken::new()).await.unwrap_err();
    assert_eq!(err, RecorderError::NoValidInputs);
    assert_eq!(fx.temp_files(), 0);
    assert!(!planned.exists());
    assert_eq!(coordinator.state(), CoordinatorState::Idle);
    assert!(!coordinator.is_recording());
}

#[tokio::test]
async fn cancelled_mixdown_removes_everything() {
    let fx = Fixture::new();
    let backend = ReplayBackend::new();
    backend.add_endpoint(input("a"), MONO_44K, vec![0.1; 4410]);
    let mut coordinator = fx.coordinator(backend);

    let planned = coordinator
        .start(&[DeviceMixConfiguration::selected("a")], &fx.output_dir)
        .unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = coordinator.stop(cancel).await.unwrap_err();
    assert_eq!(err, RecorderError::Cancelled);
    assert!(!planned.exists());
    assert_eq!(fx.temp_files(), 0);
}

#[tokio::test]
async fn gain_changes_during_capture_reach_the_artifact() {
    let fx = Fixture::new();
    let total_frames = 480 * 2000;
    let backend = ReplayBackend::paced(Duration::from_millis(5));
    backend.add_endpoint(input("a"), MONO_44K, vec![0.5; total_frames]);
    let mut coordinator = fx.coordinator(backend);

    coordinator
        .start(&[DeviceMixConfiguration::selected("a")], &fx.output_dir)
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    coordinator.update_device_state(&DeviceMixConfiguration::selected("a").with_volume(0.5));
    assert_eq!(coordinator.effective_gain("a"), 0.5);
    tokio::time::sleep(Duration::from_millis(100)).await;
    coordinator.update_device_state(&DeviceMixConfiguration::selected("a").with_muted(true));
    assert_eq!(coordinator.effective_gain("a"), 0.0);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(coordinator.elapsed().is_some());

    let result = coordinator.stop(CancellationToken::new()).await.unwrap().unwrap();
    assert!(coordinator.elapsed().is_none());
    assert_eq!(coordinator.backend().open_streams(), 0);

    let captured = result.metadata.sources[0].frames_captured;
    assert!(captured > 0 && captured < total_frames as u64, "captured {} frames", captured);

    let mixed = read_pcm(&result.file_path);
    assert_eq!(mixed.len() as u64, captured * 2);
    let full = to_pcm16(0.5);
    let half = to_pcm16(0.25);
    assert!((mixed[0] - full).abs() <= 1);
    assert!(mixed.iter().any(|&s| (s - half).abs() <= 1));
    assert_eq!(mixed[mixed.len() - 1], 0);
}

#[tokio::test]
async fn dropped_stop_returns_coordinator_to_idle() {
    let fx = Fixture::new();
    let backend = ReplayBackend::new();
    let long = StreamFormat {
        sample_rate: 48000,
        channels: 2,
    };
    backend.add_endpoint(output("a"), long, vec![0.1; 48000 * 2 * 30]);
    backend.add_endpoint(input("b"), MONO_44K, vec![0.2; 4410]);
    let mut coordinator = fx.coordinator(backend);

    let abandoned = coordinator
        .start(&[DeviceMixConfiguration::selected("a")], &fx.output_dir)
        .unwrap();
    let timed_out = tokio::time::timeout(Duration::from_millis(1), coordinator.stop(CancellationToken::new())).await;
    assert!(timed_out.is_err());

    assert_eq!(coordinator.state(), CoordinatorState::Idle);
    assert!(coordinator.status().is_idle());
    assert!(!coordinator.is_recording());

    let second_dir = fx.output_dir.join("second");
    let planned = coordinator
        .start(&[DeviceMixConfiguration::selected("b")], &second_dir)
        .unwrap();
    let result = coordinator.stop(CancellationToken::new()).await.unwrap().unwrap();
    assert_eq!(result.file_path, planned);
    assert_eq!(coordinator.state(), CoordinatorState::Idle);

    // The abandoned mixdown is cancelled on its worker, which then cleans up.
    for _ in 0..500 {
        if !abandoned.exists() && fx.temp_files() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!abandoned.exists());
    assert_eq!(fx.temp_files(), 0);
    assert_eq!(coordinator.backend().open_streams(), 0);
}

#[test]
fn dropping_an_active_coordinator_releases_streams() {
    let fx = Fixture::new();
    let backend = ReplayBackend::new();
    backend.add_endpoint(input("a"), MONO_44K, vec![0.1; 100]);
    let mut coordinator = fx.coordinator(backend);

    coordinator
        .start(&[DeviceMixConfiguration::selected("a")], &fx.output_dir)
        .unwrap();
    assert_eq!(fx.temp_files(), 1);
    drop(coordinator);
    assert_eq!(fx.temp_files(), 0);
}
