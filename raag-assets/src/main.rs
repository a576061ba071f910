//! raag-assets - asset acquisition pipeline
//!
//! Downloads the catalog's images and audio into the website's public tree,
//! writes placeholders for whatever cannot be fetched, and reconciles
//! `manifest.json` with disk state.
//!
//! Exit status is 0 when every asset ended with genuine content or a
//! placeholder, 1 on hard failures, interruption or startup errors.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use raag_assets::audio_search::SpotdlClient;
use raag_assets::catalog::{AssetCategory, Catalog};
use raag_assets::config::{resolve_search_credentials, PipelineConfig};
use raag_assets::orchestrator::Orchestrator;
use raag_assets::search::ImageSearchClient;
use raag_assets::transfer::HttpTransfer;
use raag_common::config::{
    load_toml_config, resolve_config_path, resolve_root_folder, LoggingConfig, TomlConfig,
};

const DEFAULT_LOG_FILTER: &str = "raag_assets=info,raag_common=info";

/// Command-line arguments for raag-assets
#[derive(Parser, Debug)]
#[command(name = "raag-assets")]
#[command(about = "Acquire images and audio for the Musical Map of India")]
#[command(version)]
struct Args {
    /// Root folder all asset paths are resolved against
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Catalog TOML to use instead of the built-in one
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Only process these categories (repeatable)
    #[arg(long = "category", value_name = "CATEGORY")]
    categories: Vec<AssetCategory>,

    /// Process at most N selected assets
    #[arg(short, long)]
    limit: Option<usize>,

    /// Report planned work and search quota without downloading anything
    #[arg(long, conflicts_with = "manifest_only")]
    dry_run: bool,

    /// Only reconcile the manifest with disk state
    #[arg(long)]
    manifest_only: bool,

    /// Transfer attempts per asset
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Base backoff delay in milliseconds
    #[arg(long)]
    base_delay_ms: Option<u64>,

    /// Skip the courtesy delay between assets
    #[arg(long)]
    no_delay: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            // Logging may not be up yet
            eprintln!("raag-assets: {:#}", e);
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let config_path = resolve_config_path(args.config.as_deref());
    let toml_config = match &config_path {
        Some(path) => load_toml_config(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => TomlConfig::default(),
    };

    init_tracing(&toml_config.logging)?;

    info!(
        "Starting raag-assets v{} ({} built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("RAAG_GIT_HASH"),
        env!("RAAG_BUILD_TIMESTAMP"),
        env!("RAAG_BUILD_PROFILE")
    );
    if let Some(path) = &config_path {
        info!("Config: {}", path.display());
    }

    let root = resolve_root_folder(args.root.as_deref(), &toml_config);
    info!("Root folder: {}", root.display());

    let catalog = match &args.catalog {
        Some(path) => Catalog::from_file(path)
            .with_context(|| format!("Failed to load catalog {}", path.display()))?,
        None => Catalog::builtin().context("Built-in catalog is invalid")?,
    };
    info!("Catalog: {} assets", catalog.len());

    let config = pipeline_config(&args, root, &toml_config);

    let transfer =
        HttpTransfer::new(&config.user_agent).context("Failed to build HTTP client")?;
    let mut orchestrator = Orchestrator::new(config.clone(), catalog, Box::new(transfer));

    if let Some(credentials) = resolve_search_credentials(&toml_config) {
        let client =
            ImageSearchClient::new(credentials, &config.user_agent, config.request_timeout)
                .context("Failed to build search client")?;
        orchestrator = orchestrator.with_search(Box::new(client));
    }

    if toml_config.audio_search.enabled {
        if let Some(client) = SpotdlClient::detect(&toml_config.audio_search).await {
            orchestrator = orchestrator.with_audio_search(Box::new(client));
        }
    } else {
        info!("Audio search disabled: query-only audio will get placeholders");
    }

    if args.manifest_only {
        let report = orchestrator.reconcile_manifest()?;
        info!(
            "Manifest: {} present, {} placeholders, {} missing",
            report.present, report.placeholders, report.missing
        );
        return Ok(ExitCode::SUCCESS);
    }

    if args.dry_run {
        let estimate = orchestrator.estimate()?;
        for line in estimate.display_lines() {
            info!("{}", line);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let run_id = uuid::Uuid::new_v4();
    let report = orchestrator
        .run(&cancel)
        .instrument(info_span!("run", %run_id))
        .await?;

    info!(
        "{} | checkpoint {}",
        report.stats.display_string(),
        if report.checkpoint_cleared { "cleared" } else { "kept" }
    );
    if let Some(manifest) = &report.manifest {
        info!(
            "Manifest: {} present, {} placeholders, {} missing",
            manifest.present, manifest.placeholders, manifest.missing
        );
    }

    Ok(ExitCode::from(report.exit_code()))
}

/// Apply CLI overrides on top of the TOML settings
fn pipeline_config(args: &Args, root: PathBuf, toml_config: &TomlConfig) -> PipelineConfig {
    let mut settings = toml_config.acquisition.clone();
    if let Some(max_attempts) = args.max_attempts {
        settings.max_attempts = max_attempts;
    }
    if let Some(base_delay_ms) = args.base_delay_ms {
        settings.base_delay_ms = base_delay_ms;
    }
    if args.no_delay {
        settings.inter_asset_delay_ms = 0;
    }

    let mut config =
        PipelineConfig::from_settings(root, &settings, toml_config.search.daily_quota);
    config.categories = args.categories.clone();
    config.limit = args.limit;
    config
}

/// EnvFilter from RUST_LOG, else the TOML level; optional plain-text file layer
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if logging.level.trim().is_empty() || logging.level.eq_ignore_ascii_case("info") {
            EnvFilter::new(DEFAULT_LOG_FILTER)
        } else {
            EnvFilter::new(format!(
                "raag_assets={0},raag_common={0}",
                logging.level.trim()
            ))
        }
    });

    let file_layer = match &logging.file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("Failed to initialize tracing")?;

    Ok(())
}

/// Cancel the run on Ctrl+C (and SIGTERM on unix)
async fn cancel_on_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, stopping after the current asset is abandoned");
        },
        _ = terminate => {
            warn!("Received terminate signal, stopping");
        },
    }
    cancel.cancel();
}
