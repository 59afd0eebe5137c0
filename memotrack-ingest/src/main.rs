//! memotrack - list Voice Memos recordings with file and transcription state
//!
//! Loads the catalog once, cross-references the media folder and prints the
//! sorted view (or JSON with `--json`).

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use clap::Parser;
use memotrack_common::config::{self, MediaRootResolver, TomlConfig};
use memotrack_common::events::EventBus;
use memotrack_ingest::{RefreshOrchestrator, RefreshOutcome, StatusManager, ViewProjection};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for memotrack
#[derive(Parser, Debug)]
#[command(name = "memotrack")]
#[command(about = "Track Voice Memos recordings and their transcription status")]
#[command(version)]
struct Args {
    /// TOML config file (defaults to the platform config location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Media root holding the catalog and recordings
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Catalog database, overriding the one under the media root
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Catalog table name
    #[arg(long)]
    table: Option<String>,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Only list recordings whose title contains this text
    #[arg(short, long)]
    search: Option<String>,

    /// Re-check media files after loading
    #[arg(long)]
    recheck: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let loaded = config::load_or_default(args.config.as_deref());
    let mut toml_config = loaded.config;
    init_tracing(&toml_config)?;

    info!("Starting memotrack v{}", env!("CARGO_PKG_VERSION"));
    match (&loaded.source, &loaded.fallback) {
        (_, Some(reason)) => warn!("{}, using built-in defaults", reason),
        (Some(path), None) => info!("Config: {}", path.display()),
        (None, None) => info!("No config file, using built-in defaults"),
    }

    if let Some(table) = &args.table {
        toml_config.table = table.clone();
    }
    toml_config
        .validate()
        .context("Invalid configuration")?;

    let media_root = MediaRootResolver::new(args.root.clone()).resolve(&toml_config);
    let mut settings = toml_config.into_settings(media_root);
    if let Some(catalog) = &args.catalog {
        settings.catalog_path = catalog.clone();
    }
    info!("Media root: {}", settings.media_root.display());
    info!("Catalog: {}", settings.catalog_path.display());

    let manager = StatusManager::shared(EventBus::new(settings.event_bus_capacity));
    let orchestrator = RefreshOrchestrator::new(settings, manager.clone());

    let report = match orchestrator
        .refresh()
        .await
        .context("Failed to load the catalog")?
    {
        RefreshOutcome::Committed(report) => report,
        RefreshOutcome::Superseded { generation } => {
            bail!("Refresh {} was superseded", generation)
        }
    };

    if args.recheck {
        orchestrator.recheck_files().await;
    }

    let view = ViewProjection::from_entities(&manager.snapshot().await);
    let indices = match &args.search {
        Some(query) => view.search(query),
        None => (0..view.len()).collect(),
    };
    let counts = manager.counts().await;

    if args.json {
        let rows: Vec<_> = indices.iter().filter_map(|&i| view.row(i)).collect();
        let rejected: Vec<String> = report.rejected.iter().map(ToString::to_string).collect();
        let output = serde_json::json!({
            "rows": rows,
            "counts": counts,
            "rejected": rejected,
            "undecodable_rows": report.row_errors.len(),
            "warnings": report.warnings,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    for row in indices.iter().filter_map(|&i| view.row(i)) {
        println!(
            "{:<10} {} {}  {:>6}  {}",
            row.status,
            if row.file_exists { " " } else { "!" },
            row.recorded_at.format("%Y-%m-%d %H:%M"),
            row.duration_label(),
            row.title
        );
    }
    println!(
        "{} recordings ({} new, {} queued, {} processing, {} done, {} error), {} missing files, {} rows rejected",
        counts.total,
        counts.new,
        counts.queued,
        counts.processing,
        counts.done,
        counts.error,
        counts.missing_files,
        report.rejected.len() + report.row_errors.len()
    );

    Ok(())
}

/// RUST_LOG wins over the configured level; a configured file replaces stderr
fn init_tracing(toml_config: &TomlConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&toml_config.logging.level));

    let file_layer = match &toml_config.logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };
    let stderr_layer = if file_layer.is_none() {
        Some(fmt::layer().with_writer(std::io::stderr))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(())
}
