//! Delimited table I/O.
//!
//! Tables are UTF-8, comma-separated, with a header row in a fixed column
//! order. Writes go to a temporary file beside the destination and are
//! renamed into place once complete.

use crate::error::{Error, Result};
use crate::models::{AnnotationRecord, CaseRecord, NoduleRecord};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, error};

/// A record type persisted as a table.
pub trait Table: Serialize {
    /// Header row, in serialization order.
    const COLUMNS: &'static [&'static str];
}

impl Table for AnnotationRecord {
    const COLUMNS: &'static [&'static str] = &[
        "patient_id",
        "scan_id",
        "nodule_classification",
        "nodule_id",
        "annotation_no",
        "annotation_id",
        "n_readers",
        "subtlety",
        "internalStructure",
        "calcification",
        "sphericity",
        "margin",
        "lobulation",
        "spiculation",
        "texture",
        "malignancy",
        "Subtlety",
        "InternalStructure",
        "Calcification",
        "Sphericity",
        "Margin",
        "Lobulation",
        "Spiculation",
        "Texture",
        "Malignancy",
        "diameter",
        "volume",
        "surface_area",
        "diagnosis",
        "slice_thickness",
        "slice_spacing",
        "pixel_spacing",
    ];
}

impl Table for NoduleRecord {
    const COLUMNS: &'static [&'static str] = &[
        "patient_id",
        "scan_id",
        "nodule_classification",
        "nodule_id",
        "n_readers",
        "subtlety",
        "internalStructure",
        "calcification",
        "sphericity",
        "margin",
        "lobulation",
        "spiculation",
        "texture",
        "malignancy",
        "Subtlety",
        "InternalStructure",
        "Calcification",
        "Sphericity",
        "Margin",
        "Lobulation",
        "Spiculation",
        "Texture",
        "Malignancy",
        "diameter",
        "volume",
        "surface_area",
        "diagnosis",
    ];
}

impl Table for CaseRecord {
    const COLUMNS: &'static [&'static str] = &[
        "patient_id",
        "total_nodules",
        "n_nodules_lt_3mm",
        "n_nodules_ge_3mm",
        "n_non_nodules_ge_3mm",
        "n_nodules_benign",
        "n_nodules_malignant",
        "filepath",
        "n_images",
        "total_file_size",
    ];
}

/// Read every row of the table at `path`.
///
/// A missing file is logged and returned as [`Error::MissingInputFile`].
pub fn read_table<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path).map_err(|e| {
        error!("Failed to open {}: {}", path.display(), e);
        if e.kind() == ErrorKind::NotFound {
            Error::MissingInputFile {
                path: path.to_path_buf(),
                source: e,
            }
        } else {
            Error::Io(e)
        }
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(file);
    let rows = reader
        .deserialize()
        .collect::<std::result::Result<Vec<T>, csv::Error>>()?;

    debug!("Read {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

/// A table fully written to a temporary file beside its destination.
///
/// Nothing at the destination changes until [`StagedTable::persist`]. A
/// staged table that is dropped removes its temporary file.
#[derive(Debug)]
pub struct StagedTable {
    path: PathBuf,
    rows: usize,
    file: NamedTempFile,
}

impl StagedTable {
    /// Rename the staged file over the destination, replacing any existing file.
    pub fn persist(self) -> Result<()> {
        let StagedTable { path, rows, file } = self;
        file.persist(&path).map_err(|e| Error::Persist {
            path: path.clone(),
            source: e.error,
        })?;

        debug!("Wrote {} rows to {}", rows, path.display());
        Ok(())
    }
}

/// Write `rows` for `path` into a temporary file in the same directory.
///
/// Parent directories are created as needed. The header is written even
/// when there are no rows.
pub fn stage_table<T: Table>(path: &Path, rows: &[T]) -> Result<StagedTable> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut file = NamedTempFile::new_in(dir)?;
    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(&mut file);
        writer.write_record(T::COLUMNS)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
    }
    file.as_file_mut().sync_all()?;

    Ok(StagedTable {
        path: path.to_path_buf(),
        rows: rows.len(),
        file,
    })
}

/// True when a file exists at `path`.
pub fn exists(path: &Path) -> bool {
    path.is_file()
}
