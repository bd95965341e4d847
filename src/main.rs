//! lidc-nodules - LIDC-IDRI nodule annotation tables
//!
//! A CLI tool that turns exported LIDC-IDRI scan documents into a
//! per-reader annotation table, consensus nodule tables and a
//! per-patient case table.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (missing input, malformed export, out-of-range score, etc.)

mod analysis;
mod cli;
mod config;
mod dataset;
mod error;
mod models;
mod report;
mod semantics;
mod source;

use anyhow::{Context, Result};
use cli::Args;
use config::{Config, DEFAULT_CONFIG_FILE};
use dataset::{Dataset, DatasetBuilder};
use report::{BuildSummary, TableLocation};
use source::DirectoryScanSource;
use std::path::Path;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("lidc-nodules v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    if let Err(e) = run_build(&args) {
        error!("Build failed: {:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle --init-config: generate a default .lidc-nodules.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to customize folders, table paths, features and patients.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Build or reload the tables and print the summary.
fn run_build(args: &Args) -> Result<()> {
    // Load configuration
    let mut config = load_config(args)?;
    config.merge_with_args(args);

    let builder = DatasetBuilder::new(&config, args.use_existing);

    let dataset = if builder.can_reuse() {
        // Loaded tables are authoritative; the exports are not read.
        builder.load()?
    } else {
        let raw = &config.folders.raw;
        let source = DirectoryScanSource::open(raw)
            .with_context(|| format!("Failed to open scan exports at {}", raw.display()))?;
        info!(
            "Found {} scans under {}",
            source.len(),
            source.root().display()
        );
        if source.is_empty() {
            warn!("No scan exports found; tables will only have headers");
        }
        builder.build(&source)?
    };

    let tables = table_locations(&builder, &dataset);
    let summary = BuildSummary::new(&dataset, &config.folders.raw, tables);

    if !args.quiet {
        println!("\n{}", report::generate_markdown_summary(&summary));
    }

    if let Some(ref path) = args.report {
        let json = report::generate_json_summary(&summary)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!("Build summary saved to {}", path.display());
    }

    Ok(())
}

/// Output table names, in the order of `TablePaths::outputs`.
const TABLE_NAMES: [&str; 5] = [
    "annotations",
    "nodules",
    "non_nodules",
    "small_nodules",
    "cases",
];

fn table_locations(builder: &DatasetBuilder, dataset: &Dataset) -> Vec<TableLocation> {
    TABLE_NAMES
        .iter()
        .zip(builder.paths().outputs())
        .zip(dataset.row_counts())
        .map(|((name, path), rows)| TableLocation {
            name: name.to_string(),
            path: path.to_path_buf(),
            rows,
        })
        .collect()
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", DEFAULT_CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
