//! Reference tables shipped alongside the scan exports.

use super::tables::{exists, read_table};
use crate::error::Result;
use crate::models::ScanMetadata;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct NonNoduleCase {
    patient_id: String,
}

/// Patients whose findings are all non-nodules.
///
/// The list is required; a missing file aborts the build.
pub fn load_non_nodule_cases(path: &Path) -> Result<HashSet<String>> {
    let rows: Vec<NonNoduleCase> = read_table(path)?;
    let cases: HashSet<String> = rows.into_iter().map(|row| row.patient_id).collect();

    info!("Loaded {} non-nodule cases", cases.len());
    Ok(cases)
}

/// Scan metadata rows, or none when the table is absent.
pub fn load_scan_metadata(path: &Path) -> Result<Vec<ScanMetadata>> {
    if !exists(path) {
        warn!(
            "Scan metadata not found at {}; case file columns left empty",
            path.display()
        );
        return Ok(Vec::new());
    }

    read_table(path)
}
