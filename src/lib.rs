//! Scanfuse: live barcode and vision-annotation fusion.
//!
//! Scanfuse captures frames from a camera feed, runs every frame through
//! a local barcode decoder and a remote vision-annotation service at the
//! same time, and fuses the two result sets into a single overlay. Barcode
//! identifiers are deduplicated across the session and classified against
//! a reference table.
//!
//! # Modules
//!
//! - [`geometry`]: Coordinate spaces, localization encodings, viewport mapping
//! - [`detect`]: Detector trait, barcode and vision detectors
//! - [`capture`]: Capture device abstraction and a directory replay feed
//! - [`reference`]: Reference table, classification, store access
//! - [`pipeline`]: The per-frame loop and result fusion
//! - [`error`]: Error types for scanfuse operations

pub mod capture;
pub mod config;
pub mod detect;
pub mod error;
pub mod geometry;
pub mod notify;
pub mod pipeline;
pub mod reference;
pub mod render;
pub mod session;

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use error::ScanfuseError;

use capture::DirectoryCapture;
use config::{ConfigOverrides, LoggingConfig, ScanfuseConfig};
use detect::{BarcodeDetector, SidecarDecoder, VisionDetector};
use geometry::Dimensions;
use notify::LogNotifier;
use pipeline::Scanner;
use reference::{HttpReferenceStore, ReferenceStore, ReferenceTable};
use render::{JsonLinesRenderer, NullRenderer, Renderer};

/// The scanfuse CLI application.
#[derive(Parser)]
#[command(name = "scanfuse")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Replay a directory of frames through the scanning pipeline.
    Scan(ScanArgs),

    /// Classify identifiers against the reference table.
    Classify(ClassifyArgs),

    /// Ask the store which items of a session are not reported.
    Verify(VerifyArgs),

    /// Print the effective configuration as TOML.
    PrintConfig(CommonArgs),
}

/// Options shared by every subcommand.
#[derive(clap::Args)]
struct CommonArgs {
    /// Configuration file (TOML).
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Reference store URL, overriding the configuration.
    #[arg(long)]
    store_url: Option<String>,

    /// Log level, overriding the configuration.
    #[arg(long)]
    log_level: Option<String>,
}

/// Arguments for the scan subcommand.
#[derive(clap::Args)]
struct ScanArgs {
    /// Directory of frame images, replayed in path order.
    frames_dir: PathBuf,

    #[command(flatten)]
    common: CommonArgs,

    /// Reference table JSON file; fetched from the store when omitted.
    #[arg(long)]
    reference: Option<PathBuf>,

    /// Displayed viewport size as WIDTHxHEIGHT.
    #[arg(long, value_parser = parse_dimensions)]
    display: Option<Dimensions>,

    /// Restart from the first frame instead of stopping after the last.
    #[arg(long = "loop")]
    looping: bool,

    /// Stop after this many capture attempts, failed ones included.
    #[arg(long)]
    max_frames: Option<u64>,

    /// Vision service API key.
    #[arg(long, env = "SCANFUSE_VISION_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Session (invoice) key used by --submit and --verify.
    #[arg(long)]
    session_key: Option<String>,

    /// Send the seen identifiers to the store when scanning ends.
    #[arg(long, requires = "session_key")]
    submit: bool,

    /// Verify the session against the store when scanning ends.
    #[arg(long, requires = "session_key")]
    verify: bool,

    /// Write every overlay change to this file as JSON lines.
    #[arg(long)]
    overlay_json: Option<PathBuf>,
}

/// Arguments for the classify subcommand.
#[derive(clap::Args)]
struct ClassifyArgs {
    /// Identifiers to classify.
    #[arg(required = true)]
    identifiers: Vec<String>,

    #[command(flatten)]
    common: CommonArgs,

    /// Reference table JSON file; fetched from the store when omitted.
    #[arg(long)]
    reference: Option<PathBuf>,

    /// Output format ('text' or 'json').
    #[arg(long, default_value = "text")]
    output: String,
}

/// Arguments for the verify subcommand.
#[derive(clap::Args)]
struct VerifyArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Session (invoice) key to verify.
    #[arg(long)]
    session_key: String,
}

fn parse_dimensions(value: &str) -> Result<Dimensions, String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{value}'"))?;
    let width: u32 = w.trim().parse().map_err(|_| format!("bad width '{w}'"))?;
    let height: u32 = h.trim().parse().map_err(|_| format!("bad height '{h}'"))?;
    if width == 0 || height == 0 {
        return Err("display dimensions must be non-zero".to_string());
    }
    Ok(Dimensions::new(width as f64, height as f64))
}

/// Run the scanfuse CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), ScanfuseError> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Scan(args)) => run_scan(args),
        Some(Commands::Classify(args)) => run_classify(args),
        Some(Commands::Verify(args)) => run_verify(args),
        Some(Commands::PrintConfig(args)) => run_print_config(args),
        None => {
            println!("scanfuse {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Live barcode and vision-annotation fusion scanner.");
            println!();
            println!("Run 'scanfuse --help' for usage information.");
            Ok(())
        }
    }
}

fn load_config(
    common: &CommonArgs,
    mut overrides: ConfigOverrides,
) -> Result<ScanfuseConfig, ScanfuseError> {
    let mut config = ScanfuseConfig::load(common.config.as_deref())?;
    overrides.store_url = common.store_url.clone();
    overrides.log_level = common.log_level.clone();
    config.merge_overrides(&overrides);
    config.validate()?;
    Ok(config)
}

/// Initialize tracing. `RUST_LOG` wins over the configured level.
fn init_tracing(config: &LoggingConfig) -> Result<(), ScanfuseError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| ScanfuseError::InvalidConfig(format!("bad log filter: {e}")))?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.format.to_lowercase().as_str() {
        "json" => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        "pretty" => registry
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init(),
        _ => registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init(),
    };
    result.map_err(|e| ScanfuseError::InvalidConfig(format!("failed to initialize tracing: {e}")))
}

fn runtime() -> Result<tokio::runtime::Runtime, ScanfuseError> {
    Ok(tokio::runtime::Runtime::new()?)
}

fn store_from(config: &ScanfuseConfig) -> Option<Arc<HttpReferenceStore>> {
    config
        .store
        .url
        .as_deref()
        .filter(|url| !url.trim().is_empty())
        .map(|url| Arc::new(HttpReferenceStore::new(url, config.store.timeout())))
}

/// Execute the scan subcommand.
fn run_scan(args: ScanArgs) -> Result<(), ScanfuseError> {
    let provider = DirectoryCapture::new(&args.frames_dir).looping(args.looping);

    // A finite replay stops by itself after its last frame.
    let max_frames = match (args.max_frames, args.looping) {
        (Some(max), _) => Some(max),
        (None, false) => provider.frame_paths().ok().map(|paths| paths.len() as u64),
        (None, true) => None,
    };
    let config = load_config(
        &args.common,
        ConfigOverrides {
            display: args.display,
            api_key: args.api_key.clone(),
            max_frames,
            ..Default::default()
        },
    )?;
    init_tracing(&config.logging)?;

    let store = store_from(&config);
    let reference = match &args.reference {
        Some(path) => ReferenceTable::from_json_file(path, &config.verification.confirmed_token)?,
        None => ReferenceTable::with_token(Vec::new(), config.verification.confirmed_token.clone()),
    };

    let renderer: Box<dyn Renderer> = match &args.overlay_json {
        Some(path) => Box::new(JsonLinesRenderer::new(BufWriter::new(File::create(path)?))),
        None => Box::new(NullRenderer),
    };

    let mut scanner = Scanner::new(
        Arc::new(provider),
        renderer,
        Arc::new(LogNotifier),
        config.pipeline_settings(),
    )
    .with_reference(reference);

    if config.barcode.enabled {
        scanner = scanner.with_detector(Arc::new(
            BarcodeDetector::new(SidecarDecoder).with_formats(config.barcode.formats.clone()),
        ));
    }
    match config.vision_options() {
        Some(options) => {
            scanner = scanner.with_detector(Arc::new(VisionDetector::new(options)));
        }
        None if config.vision.enabled => {
            warn!("vision detector disabled: no API key configured");
        }
        None => {}
    }
    if let Some(store) = store.clone() {
        scanner = scanner.with_store(store);
    }

    let stop = scanner.stop_handle();
    let rt = runtime()?;
    rt.block_on(async {
        if args.reference.is_none() {
            scanner.refresh_reference().await;
        }

        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, stopping");
                stop.stop();
            }
        });

        let frames = scanner.run().await?;
        info!(frames, "scan finished");

        let key = args.session_key.as_deref().unwrap_or_default();
        if args.submit {
            scanner.submit(key).await;
        }
        if args.verify {
            scanner.verify(key).await;
        }
        Ok::<_, ScanfuseError>(frames)
    })
    .map(|frames| {
        let seen = scanner.session().seen_identifiers();
        println!("Frames processed: {frames}");
        println!("Identifiers seen: {}", seen.len());
        for identifier in seen {
            println!("  {identifier}\t{}", scanner.reference().classify(identifier));
        }
    })
}

/// Execute the classify subcommand.
fn run_classify(args: ClassifyArgs) -> Result<(), ScanfuseError> {
    let config = load_config(&args.common, ConfigOverrides::default())?;
    init_tracing(&config.logging)?;

    let token = config.verification.confirmed_token.clone();
    let table = match (&args.reference, store_from(&config)) {
        (Some(path), _) => ReferenceTable::from_json_file(path, &token)?,
        (None, Some(store)) => {
            let entries = runtime()?.block_on(store.fetch_all())?;
            ReferenceTable::with_token(entries, token)
        }
        (None, None) => {
            return Err(ScanfuseError::InvalidArgument(
                "either --reference or a store URL is required".to_string(),
            ))
        }
    };

    match args.output.as_str() {
        "json" => {
            let rows: Vec<serde_json::Value> = args
                .identifiers
                .iter()
                .map(|id| {
                    serde_json::json!({
                        "identifier": id,
                        "classification": table.classify(id),
                        "name": table.lookup(id).and_then(|e| e.display_name.clone()),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        "text" => {
            for id in &args.identifiers {
                println!("{id}\t{}", table.classify(id));
            }
        }
        other => {
            return Err(ScanfuseError::InvalidArgument(format!(
                "'{other}' (supported: text, json)"
            )))
        }
    }
    Ok(())
}

/// Execute the verify subcommand.
fn run_verify(args: VerifyArgs) -> Result<(), ScanfuseError> {
    let config = load_config(&args.common, ConfigOverrides::default())?;
    init_tracing(&config.logging)?;

    let store = store_from(&config).ok_or(error::StoreError::NotConfigured)?;
    let key = args.session_key.trim();
    if key.is_empty() {
        return Err(ScanfuseError::InvalidArgument(
            "session key must not be empty".to_string(),
        ));
    }
    let outcome = runtime()?.block_on(store.verify(key))?;

    if !outcome.message.is_empty() {
        println!("{}", outcome.message);
    }
    if outcome.all_reported() {
        println!("All scanned items for this session are reported or found.");
    } else {
        println!("Non-Reported/Not Found: {}", outcome.non_reported.join(", "));
    }
    Ok(())
}

/// Execute the print-config subcommand.
fn run_print_config(args: CommonArgs) -> Result<(), ScanfuseError> {
    let config = load_config(&args, ConfigOverrides::default())?;
    print!("{}", config.to_toml_redacted()?);
    Ok(())
}
