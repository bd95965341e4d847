//! Build summary generation.
//!
//! Renders the end-of-run summary as Markdown for the console and as JSON
//! for `--report`.

use crate::dataset::Dataset;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Counts and locations describing one build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSummary {
    /// When the summary was produced.
    pub built_at: DateTime<Utc>,
    /// Root of the scan exports.
    pub source: PathBuf,
    /// True when the tables were reloaded from disk.
    pub from_cache: bool,
    pub scans_processed: usize,
    pub annotations: usize,
    pub nodules: usize,
    pub non_nodules: usize,
    pub small_nodules: usize,
    pub cases: usize,
    /// Consensus nodules diagnosed malignant.
    pub malignant_nodules: usize,
    pub duration_seconds: f64,
    /// Where each table lives.
    pub tables: Vec<TableLocation>,
}

/// A table name and the file it was read from or written to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableLocation {
    pub name: String,
    pub path: PathBuf,
    pub rows: usize,
}

impl BuildSummary {
    /// Summarise `dataset`, read or built from `source`.
    pub fn new(dataset: &Dataset, source: &Path, tables: Vec<TableLocation>) -> Self {
        let malignant_nodules = dataset
            .cases
            .iter()
            .map(|case| case.n_nodules_malignant as usize)
            .sum();

        Self {
            built_at: Utc::now(),
            source: source.to_path_buf(),
            from_cache: dataset.from_cache,
            scans_processed: dataset.scans_processed,
            annotations: dataset.annotations.len(),
            nodules: dataset.nodules.len(),
            non_nodules: dataset.non_nodules.len(),
            small_nodules: dataset.small_nodules.len(),
            cases: dataset.cases.len(),
            malignant_nodules,
            duration_seconds: dataset.duration_seconds,
            tables,
        }
    }
}

/// Generate the Markdown summary.
pub fn generate_markdown_summary(summary: &BuildSummary) -> String {
    let mut output = String::new();

    output.push_str("# LIDC-IDRI Nodule Tables\n\n");
    output.push_str(&generate_metadata_section(summary));
    output.push_str(&generate_counts_section(summary));
    output.push_str(&generate_tables_section(&summary.tables));

    output
}

fn generate_metadata_section(summary: &BuildSummary) -> String {
    let mut section = String::new();

    section.push_str(&format!(
        "- **Built:** {}\n",
        summary.built_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Source:** {}\n", summary.source.display()));
    if summary.from_cache {
        section.push_str("- **Mode:** loaded existing tables\n");
    } else {
        section.push_str(&format!(
            "- **Scans Processed:** {}\n",
            summary.scans_processed
        ));
    }
    section.push_str(&format!(
        "- **Duration:** {:.1}s\n",
        summary.duration_seconds
    ));
    section.push('\n');

    section
}

fn generate_counts_section(summary: &BuildSummary) -> String {
    let mut section = String::new();

    section.push_str("## Records\n\n");
    section.push_str(
        "| Annotations | Nodules | Non-nodules | Small nodules | Cases | Malignant |\n",
    );
    section.push_str("|:---:|:---:|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | {} | {} | {} |\n\n",
        summary.annotations,
        summary.nodules,
        summary.non_nodules,
        summary.small_nodules,
        summary.cases,
        summary.malignant_nodules
    ));

    section
}

fn generate_tables_section(tables: &[TableLocation]) -> String {
    if tables.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Tables\n\n");
    for table in tables {
        section.push_str(&format!(
            "- `{}` ({} rows): {}\n",
            table.name,
            table.rows,
            table.path.display()
        ));
    }
    section.push('\n');

    section
}

/// Generate a JSON summary.
pub fn generate_json_summary(summary: &BuildSummary) -> anyhow::Result<String> {
    serde_json::to_string_pretty(summary).map_err(Into::into)
}
