//! Scan source backed by a directory of exported scan documents.
//!
//! Each `*.json` file under the root holds one scan together with its
//! annotations already clustered into nodules. Hidden files and directories
//! are skipped.

use super::{NoduleGroup, PatientFilter, Scan, ScanSource};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// On-disk form of one exported scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanExport {
    #[serde(flatten)]
    pub scan: Scan,
    /// Reader annotations grouped per nodule.
    #[serde(default)]
    pub nodules: Vec<NoduleGroup>,
}

/// Scan source reading exported scan documents from disk.
#[derive(Debug, Default)]
pub struct DirectoryScanSource {
    root: PathBuf,
    scans: BTreeMap<u32, ScanExport>,
}

impl DirectoryScanSource {
    /// Load every scan document found under `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        info!("Loading scan exports from {}", root.display());

        if !root.is_dir() {
            return Err(Error::MissingInputFile {
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "scan export directory does not exist",
                ),
                path: root,
            });
        }

        let mut scans = BTreeMap::new();
        let walker = WalkDir::new(&root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

        for entry in walker {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            let path = entry.path();
            if !entry.file_type().is_file() || !is_scan_document(path) {
                continue;
            }

            let export = read_export(path)?;
            debug!(
                "Loaded scan {} for {} ({} nodules)",
                export.scan.id,
                export.scan.patient_id,
                export.nodules.len()
            );
            if let Some(previous) = scans.insert(export.scan.id, export) {
                warn!(
                    "Duplicate export for scan {} ({}); keeping {}",
                    previous.scan.id,
                    previous.scan.patient_id,
                    path.display()
                );
            }
        }

        info!("Found {} scan exports", scans.len());
        Ok(Self { root, scans })
    }

    /// Build a source from exports already in memory.
    #[cfg(test)]
    pub fn from_exports(exports: impl IntoIterator<Item = ScanExport>) -> Self {
        Self {
            root: PathBuf::new(),
            scans: exports.into_iter().map(|e| (e.scan.id, e)).collect(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.scans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scans.is_empty()
    }
}

impl ScanSource for DirectoryScanSource {
    fn query(&self, filter: &PatientFilter) -> Result<Vec<Scan>> {
        Ok(self
            .scans
            .values()
            .filter(|e| filter.matches(&e.scan.patient_id))
            .map(|e| e.scan.clone())
            .collect())
    }

    fn cluster_annotations(&self, scan: &Scan) -> Result<Vec<NoduleGroup>> {
        Ok(self
            .scans
            .get(&scan.id)
            .map(|e| e.nodules.clone())
            .unwrap_or_default())
    }
}

fn read_export(path: &Path) -> Result<ScanExport> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|source| Error::InvalidExport {
        path: path.to_path_buf(),
        source,
    })
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

fn is_scan_document(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}
