//! Table-building stages.
//!
//! The extractor produces the per-reader annotation table, the aggregator
//! reduces it to consensus nodule records, and the case builder summarises
//! those per patient.

pub mod aggregator;
pub mod cases;
pub mod extractor;

pub use aggregator::{aggregate, partition_by_classification};
pub use cases::build_cases;
pub use extractor::{AnnotationExtractor, ExtractionOptions};
