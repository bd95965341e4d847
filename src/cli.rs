//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// Reason recorded for `--exclude ID` when none is given.
pub const DEFAULT_EXCLUDE_REASON: &str = "excluded on command line";

/// lidc-nodules - LIDC-IDRI nodule annotation tables
///
/// Builds per-reader annotation, consensus nodule and per-patient case
/// tables from exported LIDC-IDRI scan documents.
///
/// Examples:
///   lidc-nodules
///   lidc-nodules --source ./exports --include 1,2,3
///   lidc-nodules --exclude LIDC-IDRI-0132="missing slices" --no-small-nodules
///   lidc-nodules --use-existing --report build.json
///   lidc-nodules --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, looks for .lidc-nodules.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory of exported scan documents
    ///
    /// Overrides folders.raw from the config file.
    #[arg(short, long, value_name = "DIR", env = "LIDC_SOURCE")]
    pub source: Option<PathBuf>,

    /// Patients to process (comma-separated)
    ///
    /// Accepts full ids or bare numbers: --include 1,LIDC-IDRI-0002
    #[arg(long, value_name = "IDS", value_delimiter = ',')]
    pub include: Option<Vec<String>>,

    /// Patient to leave out, optionally with a reason (repeatable)
    ///
    /// Example: --exclude LIDC-IDRI-0132="missing slices"
    #[arg(long, value_name = "ID[=REASON]", value_parser = parse_exclusion)]
    pub exclude: Vec<(String, String)>,

    /// Reuse previously written tables when all of them exist
    #[arg(long)]
    pub use_existing: bool,

    /// Skip placeholder rows for scans with only sub-3mm findings
    #[arg(long)]
    pub no_small_nodules: bool,

    /// Skip nodules of patients on the non-nodule reference list
    #[arg(long)]
    pub no_non_nodules: bool,

    /// Write a JSON build summary to this file
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Hide the extraction progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Generate a default .lidc-nodules.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Parse `ID` or `ID=REASON`.
fn parse_exclusion(raw: &str) -> Result<(String, String), String> {
    let (id, reason) = match raw.split_once('=') {
        Some((id, reason)) => (id.trim(), reason.trim()),
        None => (raw.trim(), ""),
    };

    if id.is_empty() {
        return Err(format!("Missing patient id in '{}'", raw));
    }

    let reason = if reason.is_empty() {
        DEFAULT_EXCLUDE_REASON
    } else {
        reason
    };
    Ok((id.to_string(), reason.to_string()))
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref include) = self.include {
            if include.iter().any(|id| id.trim().is_empty()) {
                return Err("Empty patient id in --include".to_string());
            }
        }

        // Validate source directory if provided
        if let Some(ref source) = self.source {
            if !source.exists() {
                return Err(format!(
                    "Source directory does not exist: {}",
                    source.display()
                ));
            }
            if !source.is_dir() {
                return Err(format!(
                    "Source path is not a directory: {}",
                    source.display()
                ));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
