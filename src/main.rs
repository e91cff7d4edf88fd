use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use hostiq_inspect::{
    EventBus, FileSource, HttpApiClient, InspectConfig, InspectionSession, MediaDevice, Room,
    SessionMode, Uploader,
};

#[derive(Parser, Debug)]
#[command(name = "hostiq-inspect")]
#[command(about = "Inspection photo capture, validation, and upload client for HostIQ")]
#[command(version)]
#[command(long_about = "Stages inspection photos from a local manifest, enforces the \
room-coverage and valuable-item verification rules, and uploads the inspection to the \
HostIQ backend in the same strictly sequential order the mobile client uses.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "hostiq-inspect.toml")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long)]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long)]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long)]
    quiet: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print default configuration in TOML format and exit
    PrintConfig,
    /// Stage the manifest and report whether submission would be allowed
    Validate {
        /// Path to the inspection manifest
        #[arg(short, long)]
        manifest: PathBuf,
    },
    /// Stage the manifest and run the full upload sequence
    Submit {
        /// Path to the inspection manifest
        #[arg(short, long)]
        manifest: PathBuf,

        /// Free-text damage report attached to the submission
        #[arg(long)]
        damage_report: Option<String>,
    },
}

/// Inspection manifest: the CLI stand-in for the capture screen. Each photo
/// path plays the role of one camera shot.
#[derive(Debug, Deserialize)]
struct Manifest {
    unit_id: String,
    #[serde(default)]
    assignment_id: Option<String>,
    rooms: Vec<ManifestRoom>,
    #[serde(default)]
    photos: Vec<ManifestPhoto>,
    #[serde(default)]
    verifications: Vec<ManifestVerification>,
}

#[derive(Debug, Deserialize)]
struct ManifestRoom {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ManifestPhoto {
    path: PathBuf,
    room_id: String,
}

#[derive(Debug, Deserialize)]
struct ManifestVerification {
    item_id: String,
    path: PathBuf,
    #[serde(default)]
    notes: Option<String>,
}

impl Manifest {
    fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        let manifest: Manifest = toml::from_str(&raw)
            .with_context(|| format!("failed to parse manifest {}", path.display()))?;
        if manifest.rooms.is_empty() {
            bail!("manifest must list at least one room");
        }
        Ok(manifest)
    }

    fn rooms(&self) -> Vec<Room> {
        self.rooms
            .iter()
            .map(|r| Room {
                id: r.id.clone(),
                name: r.name.clone(),
                kind: None,
                tips: None,
            })
            .collect()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if matches!(args.command, Command::PrintConfig) {
        print_default_config()?;
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting hostiq-inspect v{}", env!("CARGO_PKG_VERSION"));

    let config = match InspectConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    config.validate().context("invalid configuration")?;

    match args.command {
        Command::PrintConfig => unreachable!("handled above"),
        Command::Validate { manifest } => run_validate(&config, &manifest).await,
        Command::Submit {
            manifest,
            damage_report,
        } => run_submit(&config, &manifest, damage_report.as_deref()).await,
    }
}

async fn stage_session(config: &InspectConfig, manifest: &Manifest) -> Result<InspectionSession> {
    let api = HttpApiClient::new(&config.api)?;
    let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));

    let mut session = InspectionSession::begin(
        &api,
        manifest.unit_id.clone(),
        manifest.assignment_id.clone(),
        manifest.rooms(),
        SessionMode::New,
        config.media.clone(),
        event_bus,
    )
    .await?;

    for photo in &manifest.photos {
        let room = session
            .rooms()
            .iter()
            .find(|r| r.id == photo.room_id)
            .cloned()
            .with_context(|| {
                format!(
                    "photo {} references unknown room {}",
                    photo.path.display(),
                    photo.room_id
                )
            })?;

        let source = FileSource::new(MediaDevice::Camera, vec![photo.path.clone()]);
        let photo_id = session
            .capture_photo(&source)
            .await?
            .with_context(|| format!("no image at {}", photo.path.display()))?;
        session.assign_room(&photo_id, &room)?;
    }

    for verification in &manifest.verifications {
        let source = FileSource::new(MediaDevice::Camera, vec![verification.path.clone()]);
        session
            .verify_item(&verification.item_id, &source)
            .await?
            .with_context(|| format!("no image at {}", verification.path.display()))?;

        if let Some(notes) = &verification.notes {
            session.stage_item_notes(&verification.item_id, notes);
            session.confirm_item_notes(&verification.item_id);
        }
    }

    Ok(session)
}

async fn run_validate(config: &InspectConfig, manifest_path: &Path) -> Result<()> {
    let manifest = Manifest::load(manifest_path)?;
    let session = stage_session(config, &manifest).await?;

    match session.submit_check() {
        Ok(()) => {
            println!(
                "✓ Submission would be allowed ({} photo(s), {} room(s))",
                session.photos().len(),
                session.rooms().len()
            );
            Ok(())
        }
        Err(blocker) => {
            println!("✗ Submission blocked: {}", blocker);
            std::process::exit(1);
        }
    }
}

async fn run_submit(
    config: &InspectConfig,
    manifest_path: &Path,
    damage_report: Option<&str>,
) -> Result<()> {
    let manifest = Manifest::load(manifest_path)?;
    let mut session = stage_session(config, &manifest).await?;

    let api = HttpApiClient::new(&config.api)?;
    let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));
    let uploader = Uploader::new(config.upload.clone(), event_bus);

    let mut progress_rx = uploader.progress();
    let printer = tokio::spawn(async move {
        while progress_rx.changed().await.is_ok() {
            let progress = *progress_rx.borrow();
            if progress.total > 0 {
                println!("  uploaded {}/{}", progress.completed, progress.total);
            }
        }
    });

    let result = uploader
        .perform_upload(&mut session, &api, damage_report)
        .await;
    printer.abort();

    match result {
        Ok(outcome) => {
            println!("✓ Inspection {} submitted", outcome.inspection_id);
            for item_id in &outcome.verification_failures {
                println!("  ! verification upload for item {} failed", item_id);
            }
            Ok(())
        }
        Err(e) => {
            error!("Submission failed: {}", e);
            eprintln!("✗ Submission failed: {}", e);
            eprintln!("  Staged photos were kept; re-run submit to retry.");
            std::process::exit(1);
        }
    }
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("hostiq_inspect={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer().json().with_target(true).boxed(),
        Some("compact") => fmt::layer().compact().with_target(false).boxed(),
        Some("pretty") | None => fmt::layer().pretty().with_target(true).boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer().with_target(true).boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

fn print_default_config() -> Result<()> {
    let default_config = InspectConfig::default();
    println!("# hostiq-inspect configuration file");
    println!("# Defaults shown; HOSTIQ_* environment variables override file values");
    println!();
    println!("{}", toml::to_string_pretty(&default_config)?);
    Ok(())
}
