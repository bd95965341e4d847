//! Error types for the dataset pipeline.
//!
//! Extraction, aggregation and table I/O return [`Error`]; the binary edge
//! wraps it in `anyhow` with context.

use crate::semantics::Characteristic;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building the annotation and nodule tables.
#[derive(Error, Debug)]
pub enum Error {
    /// An expected delimited input file is absent.
    #[error("Input file not found: {}", path.display())]
    MissingInputFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An ordinal characteristic code outside its documented closed range.
    #[error("{characteristic} score {code} out of bounds")]
    OutOfRangeScore {
        characteristic: Characteristic,
        code: u8,
    },

    /// A scan export document that cannot be parsed.
    #[error("Invalid scan export {}: {source}", path.display())]
    InvalidExport {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A table could not be moved into its final location.
    #[error("Failed to persist table to {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Delimited table encoding or decoding errors.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// File I/O errors.
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used across the pipeline modules.
pub type Result<T> = std::result::Result<T, Error>;
