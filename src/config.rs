//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.lidc-nodules.toml` files. The configuration is loaded once at startup
//! and passed by reference to the components that need it.

use crate::source::format_patient_id;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".lidc-nodules.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Data folders.
    #[serde(default)]
    pub folders: FoldersConfig,

    /// Per-table file overrides.
    #[serde(default)]
    pub files: FilesConfig,

    /// Which nodule candidates are recorded.
    #[serde(default)]
    pub features: FeaturesConfig,

    /// Patient selection.
    #[serde(default)]
    pub patients: PatientsConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Show a progress bar during extraction.
    #[serde(default = "default_true")]
    pub progress: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self { progress: true }
    }
}

/// Data folder locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoldersConfig {
    /// Root of the exported scan documents.
    #[serde(default = "default_raw")]
    pub raw: PathBuf,

    /// Reference tables (non-nodule cases, scan metadata).
    #[serde(default = "default_reference")]
    pub reference: PathBuf,

    /// Per-reader annotation table.
    #[serde(default = "default_interim")]
    pub interim: PathBuf,

    /// Consensus and case tables.
    #[serde(rename = "final", default = "default_final")]
    pub final_data: PathBuf,
}

impl Default for FoldersConfig {
    fn default() -> Self {
        Self {
            raw: default_raw(),
            reference: default_reference(),
            interim: default_interim(),
            final_data: default_final(),
        }
    }
}

fn default_raw() -> PathBuf {
    PathBuf::from("data/0_raw/LIDC-IDRI")
}

fn default_reference() -> PathBuf {
    PathBuf::from("data/0_raw/reference")
}

fn default_interim() -> PathBuf {
    PathBuf::from("data/1_interim")
}

fn default_final() -> PathBuf {
    PathBuf::from("data/2_final")
}

/// Explicit table paths. Unset entries are placed in their default folder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilesConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodules: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub non_nodules: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub small_nodules: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cases: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub non_nodule_cases: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PathBuf>,
}

/// Candidate inclusion toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    /// Record a placeholder for scans with only sub-3mm findings.
    #[serde(default = "default_true")]
    pub include_small_nodules: bool,

    /// Record nodules of patients on the non-nodule reference list.
    #[serde(default = "default_true")]
    pub include_non_nodules: bool,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            include_small_nodules: true,
            include_non_nodules: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Patient inclusion list and exclusion map (patient id to reason).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientsConfig {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: BTreeMap<String, String>,
}

/// Fully resolved table locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePaths {
    pub annotations: PathBuf,
    pub nodules: PathBuf,
    pub non_nodules: PathBuf,
    pub small_nodules: PathBuf,
    pub cases: PathBuf,
    pub non_nodule_cases: PathBuf,
    pub metadata: PathBuf,
}

impl TablePaths {
    /// Tables written by a build.
    pub fn outputs(&self) -> [&Path; 5] {
        [
            &self.annotations,
            &self.nodules,
            &self.non_nodules,
            &self.small_nodules,
            &self.cases,
        ]
    }
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref source) = args.source {
            self.folders.raw = source.clone();
        }

        // Patient selection
        if let Some(ref include) = args.include {
            self.patients.include = include.iter().map(|p| format_patient_id(p)).collect();
        }
        for (patient, reason) in &args.exclude {
            self.patients
                .exclude
                .insert(format_patient_id(patient), reason.clone());
        }

        // Feature toggles - flags only ever switch inclusion off
        if args.no_small_nodules {
            self.features.include_small_nodules = false;
        }
        if args.no_non_nodules {
            self.features.include_non_nodules = false;
        }

        // Flags always override
        if args.no_progress || args.quiet {
            self.general.progress = false;
        }
    }

    /// Resolve every table path against the configured folders.
    pub fn table_paths(&self) -> TablePaths {
        let folders = &self.folders;
        let files = &self.files;

        TablePaths {
            annotations: pick(&files.annotations, &folders.interim, "annotations.csv"),
            nodules: pick(&files.nodules, &folders.final_data, "nodules.csv"),
            non_nodules: pick(&files.non_nodules, &folders.final_data, "non_nodules.csv"),
            small_nodules: pick(
                &files.small_nodules,
                &folders.final_data,
                "small_nodules.csv",
            ),
            cases: pick(&files.cases, &folders.final_data, "cases.csv"),
            non_nodule_cases: pick(
                &files.non_nodule_cases,
                &folders.reference,
                "non_nodule_cases.csv",
            ),
            metadata: pick(&files.metadata, &folders.reference, "metadata.csv"),
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

fn pick(explicit: &Option<PathBuf>, folder: &Path, name: &str) -> PathBuf {
    explicit.clone().unwrap_or_else(|| folder.join(name))
}
