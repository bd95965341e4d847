//! End-of-run reporting.

mod generator;

pub use generator::{generate_json_summary, generate_markdown_summary, BuildSummary, TableLocation};
