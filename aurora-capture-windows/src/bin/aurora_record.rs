//! Command-line recorder: list endpoints, or record several at once and mix
//! them down into one artifact.

#![cfg_attr(not(target_os = "windows"), allow(dead_code))]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;

use aurora_capture_core::{
    ArtifactFormat, CaptureBackend, DeviceMixConfiguration, RecorderConfig, RecorderError, RecordingCoordinator,
};

/// Multi-endpoint recorder with live mix and mixdown
#[derive(Parser)]
#[command(name = "aurora-record")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List active input and output endpoints
    List,

    /// Record endpoints and mix them down
    Record(RecordArgs),
}

#[derive(clap::Args)]
struct RecordArgs {
    /// Endpoint id to capture; `ID=VOLUME` sets its volume (0-4). Repeatable.
    #[arg(short, long = "device", required = true)]
    devices: Vec<String>,

    /// Endpoint id to solo. Repeatable.
    #[arg(long)]
    solo: Vec<String>,

    /// Recording length in seconds (Ctrl-C stops early)
    #[arg(short, long, default_value = "10")]
    seconds: u64,

    /// Output folder
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Artifact format
    #[arg(long, value_enum)]
    format: Option<Format>,

    /// Skip the metadata sidecar
    #[arg(long)]
    no_metadata: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Mp3,
    Wav,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Recorder(#[from] RecorderError),

    #[error("invalid device argument `{0}`: expected ID or ID=VOLUME")]
    InvalidDevice(String),

    #[error("WASAPI capture is only available on Windows")]
    Unsupported,
}

/// Parse `--device` and `--solo` arguments into mix configurations.
fn build_selection(devices: &[String], solo: &[String]) -> Result<Vec<DeviceMixConfiguration>, CliError> {
    devices
        .iter()
        .map(|arg| {
            let (id, volume) = match arg.rsplit_once('=') {
                Some((id, volume)) => {
                    let volume = volume
                        .parse::<f64>()
                        .map_err(|_| CliError::InvalidDevice(arg.clone()))?;
                    (id, volume)
                }
                None => (arg.as_str(), 1.0),
            };
            if id.is_empty() {
                return Err(CliError::InvalidDevice(arg.clone()));
            }
            Ok(DeviceMixConfiguration::selected(id)
                .with_volume(volume)
                .with_solo(solo.iter().any(|s| s == id)))
        })
        .collect()
}

fn build_config(args: &RecordArgs) -> RecorderConfig {
    let mut config = RecorderConfig::default();
    if let Some(format) = args.format {
        config.artifact_format = match format {
            Format::Mp3 => ArtifactFormat::Mp3,
            Format::Wav => ArtifactFormat::Wav,
        };
    }
    config.write_metadata = !args.no_metadata;
    config
}

fn list<B: CaptureBackend>(backend: &B) -> Result<(), CliError> {
    for endpoint in backend.list_active_endpoints()? {
        println!("{}\t{}\t{}", endpoint.id, endpoint.display_name, endpoint.description);
    }
    Ok(())
}

async fn record<B: CaptureBackend>(backend: B, args: RecordArgs) -> Result<(), CliError> {
    let selection = build_selection(&args.devices, &args.solo)?;
    let mut coordinator = RecordingCoordinator::new(backend, build_config(&args))?;

    let planned = coordinator.start(&selection, &args.output)?;
    log::info!("Recording for {}s → {}", args.seconds, planned.display());

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(args.seconds)) => {}
        _ = tokio::signal::ctrl_c() => log::info!("Interrupted, stopping"),
    }

    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };
    let result = coordinator.stop(cancel).await;
    watcher.abort();

    if let Some(result) = result? {
        println!(
            "{} ({:.1}s, sha256 {})",
            result.file_path.display(),
            result.duration_secs,
            result.checksum
        );
    }
    Ok(())
}

#[cfg(target_os = "windows")]
async fn run(cli: Cli) -> Result<(), CliError> {
    let backend = aurora_capture_windows::WasapiBackend::new();
    match cli.command {
        Commands::List => list(&backend),
        Commands::Record(args) => record(backend, args).await,
    }
}

#[cfg(not(target_os = "windows"))]
async fn run(_cli: Cli) -> Result<(), CliError> {
    Err(CliError::Unsupported)
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
