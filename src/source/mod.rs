//! Scan sources.
//!
//! The annotation data comes from an external collaborator that can be
//! queried for scans by patient id and that clusters each scan's raw reader
//! annotations into nodules. [`ScanSource`] is that seam; the
//! [`directory`] module provides a source backed by exported scan documents.

pub mod directory;

pub use directory::DirectoryScanSource;

use crate::error::Result;
use crate::models::{ScanGeometry, Scores};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Prefix shared by all LIDC-IDRI patient identifiers.
pub const PATIENT_ID_PREFIX: &str = "LIDC-IDRI-";

/// A CT scan as exposed by the scan source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scan {
    pub id: u32,
    pub patient_id: String,
    #[serde(default)]
    pub slice_thickness: Option<f64>,
    #[serde(default)]
    pub slice_spacing: Option<f64>,
    #[serde(default)]
    pub pixel_spacing: Option<f64>,
}

impl Scan {
    pub fn geometry(&self) -> ScanGeometry {
        ScanGeometry {
            slice_thickness: self.slice_thickness,
            slice_spacing: self.slice_spacing,
            pixel_spacing: self.pixel_spacing,
        }
    }
}

/// One reader's annotation of a nodule candidate.
///
/// Every characteristic score must be present; `0` marks one the reader
/// left unrated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReaderAnnotation {
    pub id: u32,
    pub subtlety: u8,
    pub internal_structure: u8,
    pub calcification: u8,
    pub sphericity: u8,
    pub margin: u8,
    pub lobulation: u8,
    pub spiculation: u8,
    pub texture: u8,
    pub malignancy: u8,
    pub diameter: f64,
    pub volume: f64,
    pub surface_area: f64,
}

impl ReaderAnnotation {
    pub fn scores(&self) -> Scores {
        Scores {
            subtlety: self.subtlety,
            internal_structure: self.internal_structure,
            calcification: self.calcification,
            sphericity: self.sphericity,
            margin: self.margin,
            lobulation: self.lobulation,
            spiculation: self.spiculation,
            texture: self.texture,
            malignancy: self.malignancy,
        }
    }
}

/// Readings clustered as one physical nodule.
pub type NoduleGroup = Vec<ReaderAnnotation>;

/// Queryable source of scans and their clustered annotations.
pub trait ScanSource {
    /// Scans whose patient passes `filter`, in ascending scan-id order.
    ///
    /// A filter that matches nothing yields an empty list.
    fn query(&self, filter: &PatientFilter) -> Result<Vec<Scan>>;

    /// Clusters the scan's annotations into nodule groups.
    fn cluster_annotations(&self, scan: &Scan) -> Result<Vec<NoduleGroup>>;
}

/// Patient inclusion/exclusion applied when querying scans.
///
/// An empty inclusion list admits every patient. Both lists are ANDed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatientFilter {
    include: Vec<String>,
    exclude: BTreeMap<String, String>,
}

impl PatientFilter {
    pub fn new(include: Vec<String>, exclude: BTreeMap<String, String>) -> Self {
        Self { include, exclude }
    }

    pub fn included(&self) -> &[String] {
        &self.include
    }

    /// Excluded patients and the reason each was excluded.
    pub fn excluded(&self) -> &BTreeMap<String, String> {
        &self.exclude
    }

    pub fn matches(&self, patient_id: &str) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|p| p == patient_id);
        included && !self.exclude.contains_key(patient_id)
    }
}

/// Normalizes a patient id to the `LIDC-IDRI-dddd` form.
///
/// Bare numbers are zero-padded to four digits; anything else is returned
/// trimmed and unchanged.
pub fn format_patient_id(id: &str) -> String {
    let id = id.trim();
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
        format!("{}{:0>4}", PATIENT_ID_PREFIX, id)
    } else {
        id.to_string()
    }
}
